use std::{path::PathBuf, time::Duration};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("checkpoint not found: {}", .0.display())]
    CheckpointMissing(PathBuf),
    #[error("external process timed out after {0:?}")]
    ExternalProcessTimeout(Duration),
    #[error("external process exited with {status}: {stderr}")]
    ExternalProcessFailure { status: String, stderr: String },
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("generation produced no output")]
    EmptyOutput,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

/// Coarse classification used when reporting why a prompt could not be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CheckpointMissing,
    ExternalProcessTimeout,
    ExternalProcessFailure,
    UnexpectedGenerationFailure,
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::CheckpointMissing(_) => FailureKind::CheckpointMissing,
            GenerationError::ExternalProcessTimeout(_) => FailureKind::ExternalProcessTimeout,
            GenerationError::ExternalProcessFailure { .. } => FailureKind::ExternalProcessFailure,
            GenerationError::BadRequest(_)
            | GenerationError::Tokenizer(_)
            | GenerationError::Inference(_)
            | GenerationError::EmptyOutput
            | GenerationError::Io(_)
            | GenerationError::Other(_) => FailureKind::UnexpectedGenerationFailure,
        }
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::CheckpointMissing => "checkpoint missing",
            FailureKind::ExternalProcessTimeout => "timed out",
            FailureKind::ExternalProcessFailure => "process failed",
            FailureKind::UnexpectedGenerationFailure => "generation failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_failures_share_a_kind() {
        let errors = [
            GenerationError::Tokenizer("bad vocab".into()),
            GenerationError::Inference("shape mismatch".into()),
            GenerationError::EmptyOutput,
            GenerationError::Other("boom".into()),
        ];
        for err in errors {
            assert_eq!(err.kind(), FailureKind::UnexpectedGenerationFailure);
        }
    }

    #[test]
    fn checkpoint_message_names_the_path() {
        let err = GenerationError::CheckpointMissing(PathBuf::from("/tmp/cache/model.pt"));
        assert_eq!(err.kind(), FailureKind::CheckpointMissing);
        assert!(err.to_string().contains("/tmp/cache/model.pt"));
    }
}
