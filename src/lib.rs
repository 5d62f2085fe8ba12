//! # IELTS Scoring
//!
//! 一个用于 IELTS 写作/口语自动评分的 Rust 应用程序：
//! 把自由文本（或音频转写）交给外部 LLM 评分，再把每个单元的结果
//! 合并成一个确定性的 band 分数和反馈。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 评测单元、分数记录、提交文件的 TOML 加载器
//! - `EvaluationUnit` - 单个可评测单元（题目 + 答案 / 转写文本）
//! - `ScoreRecord` / `AggregateRecord` / `FinalResult` - 评分结果
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个单元
//! - `LlmService` - 评分 Oracle 调用能力（实现 `Oracle` trait）
//! - `repair` - 从 Oracle 自由文本中修复出结构化 JSON 的能力
//! - `ScoringService` - 单元评分 + 多任务合并能力
//! - `FeedbackService` - 反馈 / 改进建议生成能力
//! - `RubricService` - band 描述符查询能力
//! - `ElevenLabsAsr` - 音频转写能力（实现 `Transcriber` trait）
//! - `aggregate` - 固定算术的分数聚合（纯同步，无外部依赖）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次提交"的完整处理流程
//! - `SourceResolver` - 音频来源解析（路径 / URL / 定位对象 → 转写文本）
//! - `SpeakingFlow` - 口语流程状态机（转写 → 联合评分 → 降级逐单元评分）
//! - `WritingFlow` - 写作流程（校验 → 评分 → 合并 → 反馈 → 改进建议）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - 批量提交处理器，管理生命周期和统计
//!
//! ## 错误策略
//!
//! 单元级失败（转写失败、Oracle 返回格式错误）被吸收并标注，
//! 绝不中断兄弟单元；只有"完全没有可用结果"才向调用方抛出。

pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::score::{AggregateRecord, FinalResult, ScoreRecord};
pub use models::unit::{AudioSource, EvaluationUnit, TaskKind, TestVariant};
pub use orchestrator::App;
pub use services::{LlmService, Oracle, Transcriber};
pub use workflow::{PipelineState, SourceResolver, SpeakingFlow, WritingFlow};
