//! 音频来源解析 - 流程层
//!
//! 把一个音频来源描述符（本地路径 / 远程 URL / 定位对象）变成转写文本。
//!
//! 远程 URL 在有界超时内完整下载到作用域内的临时文件，临时文件在所有
//! 退出路径上（包括转写失败）都保证删除。任何转写失败都在单元粒度上
//! 被捕获并转换成携带错误文本的哨兵转写值，**不会**作为流水线级异常
//! 向上传播——一个单元的失败不能中断兄弟单元的评测。

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::unit::{AudioSource, ResolvedSource};
use crate::services::asr_service::Transcriber;

/// 音频来源解析器
///
/// 职责：
/// - 规范化来源形状并分派（下载 / 直接转写）
/// - 管理下载的临时资源生命周期
/// - 只处理单个来源，不出现 unit_id
pub struct SourceResolver {
    transcriber: Arc<dyn Transcriber>,
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl SourceResolver {
    /// 创建新的来源解析器
    pub fn new(transcriber: Arc<dyn Transcriber>, fetch_timeout: Duration) -> Self {
        Self {
            transcriber,
            http: reqwest::Client::new(),
            fetch_timeout,
        }
    }

    /// 从配置创建（超时取 `fetch_timeout_secs`）
    pub fn from_config(config: &Config, transcriber: Arc<dyn Transcriber>) -> Self {
        Self::new(transcriber, Duration::from_secs(config.fetch_timeout_secs))
    }

    /// 解析来源为转写文本
    ///
    /// - 定位对象：先抽出 URL 字段
    /// - 远程 URL：有界超时下载到临时文件后转写
    /// - 本地路径：直接交给转写服务
    /// - 其他形状：`UnsupportedKind` 错误
    pub async fn resolve(&self, source: &AudioSource) -> AppResult<String> {
        match source.normalize() {
            ResolvedSource::RemoteUrl(url) => {
                info!("下载远程音频: {}", url);
                let temp = self.download_to_temp(url).await?;
                // temp 在本作用域结束时删除，转写失败也不例外
                self.transcribe_path(temp.path()).await
            }
            ResolvedSource::LocalPath(path) => self.transcribe_path(Path::new(path)).await,
            ResolvedSource::Unsupported => {
                Err(AppError::unsupported_source(source.describe()))
            }
        }
    }

    /// 解析来源，失败时降级为哨兵转写文本
    ///
    /// 哨兵格式 `"ERROR: <描述>"`，供下游在反馈中标注；
    /// 本函数永不报错，单元级失败绝不中断流水线。
    pub async fn resolve_lossy(&self, source: &AudioSource) -> String {
        match self.resolve(source).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("来源 {} 转写失败: {}", source.describe(), e);
                format!("ERROR: {}", e)
            }
        }
    }

    async fn transcribe_path(&self, path: &Path) -> AppResult<String> {
        self.transcriber.transcribe(path).await.map_err(|e| {
            AppError::transcription_failed(
                path.to_string_lossy(),
                std::io::Error::other(e.to_string()),
            )
        })
    }

    /// 把远程音频完整下载到临时文件
    ///
    /// 超时和 HTTP 错误都转换为单元级的 FetchFailed。
    async fn download_to_temp(&self, url: &str) -> AppResult<NamedTempFile> {
        let response = self
            .http
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| AppError::fetch_failed(url, e))?
            .error_for_status()
            .map_err(|e| AppError::fetch_failed(url, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::fetch_failed(url, e))?;

        debug!("下载完成: {} 字节", bytes.len());

        // 保留 URL 的扩展名，转写服务按扩展名识别容器格式
        let mut temp = tempfile::Builder::new()
            .prefix("asr_")
            .suffix(&suffix_from_url(url))
            .tempfile()?;
        temp.write_all(&bytes)?;
        temp.flush()?;

        Ok(temp)
    }
}

/// 从 URL 推断音频文件扩展名（带查询串的 URL 先去掉查询串）
fn suffix_from_url(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or("");
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 4 => format!(".{}", ext),
        _ => ".mp3".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, audio_path: &Path) -> Result<String> {
            Ok(format!("transcript of {}", audio_path.display()))
        }
    }

    struct FailingTranscriber;

    #[async_trait]
    impl Transcriber for FailingTranscriber {
        async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
            anyhow::bail!("decoder exploded")
        }
    }

    fn resolver(transcriber: Arc<dyn Transcriber>) -> SourceResolver {
        SourceResolver::new(transcriber, Duration::from_secs(5))
    }

    #[test]
    fn suffix_preserves_extension_and_drops_query() {
        assert_eq!(suffix_from_url("https://x.com/a/b.wav?sig=1"), ".wav");
        assert_eq!(suffix_from_url("https://x.com/a/b.mp3"), ".mp3");
        assert_eq!(suffix_from_url("https://x.com/stream"), ".mp3");
    }

    #[tokio::test]
    async fn local_path_goes_straight_to_transcriber() {
        let resolver = resolver(Arc::new(EchoTranscriber));
        let source = AudioSource::Raw("audio_files/part_1.mp3".to_string());

        let transcript = resolver.resolve(&source).await.expect("解析不应失败");
        assert!(transcript.contains("part_1.mp3"));
    }

    #[tokio::test]
    async fn blank_source_is_unsupported() {
        let resolver = resolver(Arc::new(EchoTranscriber));
        let source = AudioSource::Locator {
            audio_url: "  ".to_string(),
        };

        let err = resolver.resolve(&source).await.expect_err("应报不支持");
        assert!(matches!(
            err,
            AppError::Source(crate::error::SourceError::UnsupportedKind { .. })
        ));
    }

    #[tokio::test]
    async fn lossy_resolution_degrades_to_sentinel() {
        let resolver = resolver(Arc::new(FailingTranscriber));
        let source = AudioSource::Raw("audio_files/part_1.mp3".to_string());

        let transcript = resolver.resolve_lossy(&source).await;
        assert!(transcript.starts_with("ERROR: "));
        assert!(transcript.contains("转写失败"));
    }
}
