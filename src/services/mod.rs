pub mod aggregate;
pub mod asr_service;
pub mod feedback_service;
pub mod llm_service;
pub mod repair;
pub mod rubric_service;
pub mod scoring_service;

pub use aggregate::aggregate_records;
pub use asr_service::{ElevenLabsAsr, Transcriber};
pub use feedback_service::FeedbackService;
pub use llm_service::{LlmService, Oracle};
pub use repair::extract_structured;
pub use rubric_service::RubricService;
pub use scoring_service::ScoringService;
