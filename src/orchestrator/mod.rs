//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量提交的处理和生命周期管理，是整个系统的"指挥中心"。
//!
//! 1. **应用初始化**：构建 Oracle / 转写 / 评分标准等协作方，注入流程层
//! 2. **批量加载**：扫描并加载所有待处理的提交（`Vec<Submission>`）
//! 3. **逐个处理**：一次提交对应一次流程执行，互不共享状态
//! 4. **全局统计**：汇总所有提交的处理结果
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::App (处理 Vec<Submission>)
//!     ↓
//! workflow (WritingFlow / SpeakingFlow，处理单次提交)
//!     ↓
//! services (能力层：oracle / repair / scoring / aggregate / asr / rubric)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：只做调度和统计，不做具体业务判断
//! 2. **依赖注入**：协作方在这里构建一次，向下传递
//! 3. **请求隔离**：每次提交的 PipelineState 独占，不跨请求共享

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::loaders::load_all_submissions;
use crate::models::submission::Submission;
use crate::models::unit::AudioSource;
use crate::services::asr_service::{ElevenLabsAsr, Transcriber};
use crate::services::llm_service::{LlmService, Oracle};
use crate::services::rubric_service::RubricService;
use crate::utils::logging;
use crate::workflow::source_resolver::SourceResolver;
use crate::workflow::speaking_flow::{format_output, SpeakingFlow};
use crate::workflow::writing_flow::WritingFlow;

/// 应用主结构
pub struct App {
    config: Config,
    writing_flow: WritingFlow,
    speaking_flow: SpeakingFlow,
}

impl App {
    /// 初始化应用
    ///
    /// 协作方（Oracle、转写服务、评分标准）在这里构建一次；
    /// 评分标准加载失败是配置错误，立即失败，不降级。
    pub fn initialize(config: Config) -> AppResult<Self> {
        logging::init_log_file(&config.output_log_file)
            .map_err(|e| crate::error::AppError::Other(e.to_string()))?;

        log_startup(&config);

        let oracle: Arc<dyn Oracle> = Arc::new(LlmService::new(&config));
        let transcriber: Arc<dyn Transcriber> = Arc::new(ElevenLabsAsr::new(&config));

        let rubrics = RubricService::new(&config)?;
        let resolver = SourceResolver::from_config(&config, transcriber);

        let writing_flow = WritingFlow::new(oracle.clone(), rubrics, &config);
        let speaking_flow = SpeakingFlow::new(resolver, oracle);

        Ok(Self {
            config,
            writing_flow,
            speaking_flow,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        info!("\n📁 正在扫描待处理的提交...");
        let submissions = load_all_submissions(&self.config.submission_folder).await?;

        if submissions.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(());
        }

        let mut stats = ProcessingStats {
            total: submissions.len(),
            ..Default::default()
        };

        info!("✓ 找到 {} 个待处理的提交\n", stats.total);

        for (idx, submission) in submissions.iter().enumerate() {
            let label = format!("[提交 {}/{}] {}", idx + 1, stats.total, submission.kind_name());
            info!("{}", "─".repeat(60));
            info!("▶ {}", label);

            match self.process(submission).await {
                Ok(result) => {
                    stats.success += 1;
                    info!("✅ {} 处理成功", label);
                    let line = format!("{}: {}", label, result);
                    if let Err(e) = logging::append_log_file(&self.config.output_log_file, &line) {
                        warn!("写入输出日志失败: {}", e);
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    error!("❌ {} 处理失败: {}", label, e);
                }
            }
        }

        print_final_stats(&stats, &self.config);

        Ok(())
    }

    /// 处理单个提交
    async fn process(&self, submission: &Submission) -> Result<JsonValue> {
        match submission {
            Submission::Writing(writing) => {
                let result = self.writing_flow.run(writing).await?;
                Ok(json!({
                    "band": result.band,
                    "feedback": result.feedback,
                    "improvements": result.improvements,
                }))
            }
            Submission::Speaking(speaking) => {
                let responses: Vec<(String, AudioSource)> = speaking
                    .responses
                    .iter()
                    .map(|(unit_id, source)| (unit_id.clone(), source.clone()))
                    .collect();

                let state = self.speaking_flow.run(&responses).await?;
                Ok(format_output(&speaking.test_id, &speaking.user_id, &state))
            }
        }
    }
}

/// 处理统计
#[derive(Debug, Default)]
struct ProcessingStats {
    success: usize,
    failed: usize,
    total: usize,
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - IELTS 评分流水线");
    info!("📊 模型: {}", config.llm_model_name);
    info!("📂 提交目录: {}", config.submission_folder);
    info!("{}", "=".repeat(60));
}

fn print_final_stats(stats: &ProcessingStats, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", stats.success, stats.total);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", config.output_log_file);
}
