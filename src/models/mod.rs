pub mod loaders;
pub mod score;
pub mod submission;
pub mod unit;

pub use loaders::{load_all_submissions, load_submission};
pub use score::{AggregateRecord, FinalResult, ScoreRecord, SPEAKING_CATEGORIES};
pub use submission::{SpeakingSubmission, Submission, WritingSubmission};
pub use unit::{AudioSource, EvaluationUnit, TaskKind, TestVariant};
