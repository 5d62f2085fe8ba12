pub mod source_resolver;
pub mod speaking_flow;
pub mod writing_flow;

pub use source_resolver::SourceResolver;
pub use speaking_flow::{format_output, PipelineStage, PipelineState, SpeakingFlow};
pub use writing_flow::WritingFlow;
