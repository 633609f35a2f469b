pub mod comparison;
pub mod config;
pub mod error;
pub mod harness;
pub mod model;
pub mod report;

pub use comparison::{ComparisonOutcome, common_prefix_length};
pub use config::AppConfig;
pub use error::{FailureKind, GenerationError};
pub use harness::{EvaluationReport, Harness, PromptReport};
pub use model::{GenerationRequest, GenerationResult, Generator};
