//! 音频转写服务 - 业务能力层
//!
//! 只负责"音频 → 文本"能力，不关心流程
//!
//! 转写协作方是黑盒：尽力返回文本，失败返回错误。通过 `Transcriber`
//! trait 注入，测试用假实现替换，不读任何全局状态。

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;

/// 音频转写能力
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// 转写本地音频文件，返回尽力而为的文本
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// ElevenLabs 云端转写服务
///
/// 职责：
/// - 以 multipart 方式上传单个音频文件
/// - 解析响应中的 `text` 字段
/// - 只处理单个文件，不出现 unit_id
pub struct ElevenLabsAsr {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
}

impl ElevenLabsAsr {
    /// 创建新的转写服务
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.asr_api_key.clone(),
            base_url: config.asr_api_base_url.clone(),
            model_id: config.asr_model_id.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for ElevenLabsAsr {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        info!("使用 ElevenLabs 云端转写: {}", audio_path.display());

        let bytes = tokio::fs::read(audio_path)
            .await
            .with_context(|| format!("无法读取音频文件: {}", audio_path.display()))?;

        debug!("音频大小: {} 字节", bytes.len());

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model_id", self.model_id.clone());

        let url = format!("{}/v1/speech-to-text", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("转写请求失败: {}", url))?
            .error_for_status()
            .context("转写服务返回错误状态")?;

        let body: JsonValue = response.json().await.context("转写响应不是合法JSON")?;

        let text = body
            .get("text")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        debug!("转写完成，文本长度: {} 字符", text.len());
        Ok(text)
    }
}
