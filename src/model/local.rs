use async_trait::async_trait;
use tokio::task;

use crate::{
    config::AppConfig,
    error::GenerationError,
    model::{
        GenerationRequest, Generator,
        loader::{LocalSettings, generate_in_process},
    },
};

/// The in-process implementation. Tokenizer, model and engine are rebuilt on
/// every call so that no state carries over between prompts.
pub struct LocalGenerator {
    label: String,
    settings: LocalSettings,
}

impl LocalGenerator {
    pub fn new(label: impl Into<String>, settings: LocalSettings) -> Self {
        Self {
            label: label.into(),
            settings,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            "rust",
            LocalSettings {
                checkpoint_path: config.checkpoint_path.clone(),
                tokenizer_path: config.tokenizer_path(),
                device: config.device.clone(),
                eos_token_id: config.eos_token_id,
                block_size: config.model.block_size,
            },
        )
    }
}

#[async_trait]
impl Generator for LocalGenerator {
    fn label(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if !self.settings.checkpoint_path.exists() {
            return Err(GenerationError::CheckpointMissing(
                self.settings.checkpoint_path.clone(),
            ));
        }

        let settings = self.settings.clone();
        let request = request.clone();
        run_blocking(move || generate_in_process(&settings, &request)).await
    }
}

/// Runs CPU-bound generation off the async workers. A panic inside `work`
/// comes back as an error rather than unwinding into the caller.
pub(crate) async fn run_blocking<F>(work: F) -> Result<String, GenerationError>
where
    F: FnOnce() -> Result<String, GenerationError> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|err| GenerationError::Inference(format!("inference task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::FailureKind, model::SamplingParams};

    fn settings_in(dir: &std::path::Path) -> LocalSettings {
        LocalSettings {
            checkpoint_path: dir.join("model.pt"),
            tokenizer_path: dir.join("tokenizer").join("tokenizer.json"),
            device: "cpu".into(),
            eos_token_id: 50_256,
            block_size: 1024,
        }
    }

    #[tokio::test]
    async fn missing_checkpoint_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let generator = LocalGenerator::new("rust", settings_in(dir.path()));
        let request = SamplingParams::default().request_for("Once upon a time");

        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::CheckpointMissing(ref p) if p.ends_with("model.pt")));
    }

    #[tokio::test]
    async fn unreadable_artifacts_are_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.pt"), b"not a checkpoint").unwrap();
        let generator = LocalGenerator::new("rust", settings_in(dir.path()));
        let request = SamplingParams::default().request_for("Hello");

        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Tokenizer(_)));
    }

    #[tokio::test]
    async fn panicking_engine_becomes_an_unexpected_failure() {
        let err = run_blocking(|| panic!("engine blew up")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnexpectedGenerationFailure);
        assert!(err.to_string().contains("inference task failed"));
    }

    #[tokio::test]
    async fn blocking_result_passes_through() {
        let text = run_blocking(|| Ok("Once upon a time there was".into())).await.unwrap();
        assert_eq!(text, "Once upon a time there was");
    }
}
