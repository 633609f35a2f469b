use async_trait::async_trait;

use crate::{error::GenerationError, model::GenerationRequest};

/// A text generation implementation taking part in a comparison run.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Name shown in the console report.
    fn label(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
