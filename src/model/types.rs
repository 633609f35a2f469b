use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, GenerationError};

/// One generation call. Both implementations receive the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 50,
            temperature: 0.8,
            top_p: 0.95,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.max_tokens == 0 {
            return Err(GenerationError::BadRequest(
                "max_tokens must be positive".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GenerationError::BadRequest(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GenerationError::BadRequest(format!(
                "top_p must be within (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }

    pub fn request_for(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

/// Model hyper-parameters handed to the out-of-process implementation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    pub n_kv_head: usize,
    pub block_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 50_257,
            n_embd: 768,
            n_layer: 20,
            n_head: 12,
            n_kv_head: 4,
            block_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationResult {
    Produced { text: String },
    Unavailable { kind: FailureKind, reason: String },
}

impl GenerationResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            GenerationResult::Produced { text } => Some(text),
            GenerationResult::Unavailable { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            GenerationResult::Produced { .. } => None,
            GenerationResult::Unavailable { kind, .. } => Some(*kind),
        }
    }

    /// Character count of the produced text, 0 when unavailable.
    pub fn char_len(&self) -> usize {
        self.text().map_or(0, |text| text.chars().count())
    }
}

impl From<Result<String, GenerationError>> for GenerationResult {
    fn from(result: Result<String, GenerationError>) -> Self {
        let error = match result {
            Ok(text) if !text.is_empty() => return GenerationResult::Produced { text },
            Ok(_) => GenerationError::EmptyOutput,
            Err(err) => err,
        };
        GenerationResult::Unavailable {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_request() {
        let request = SamplingParams::default().request_for("Once upon a time");
        assert_eq!(request.max_tokens, 50);
        assert_eq!(request.temperature, 0.8);
        assert_eq!(request.top_p, 0.95);
        assert_eq!(request.prompt, "Once upon a time");
    }

    #[test]
    fn rejects_out_of_range_sampling() {
        let cases = [
            SamplingParams { max_tokens: 0, ..Default::default() },
            SamplingParams { temperature: 2.5, ..Default::default() },
            SamplingParams { temperature: -0.1, ..Default::default() },
            SamplingParams { top_p: 0.0, ..Default::default() },
            SamplingParams { top_p: 1.01, ..Default::default() },
        ];
        for params in cases {
            assert!(params.validate().is_err(), "{params:?} should be rejected");
        }
        let edge = SamplingParams { temperature: 0.0, top_p: 1.0, max_tokens: 1 };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn empty_output_is_unavailable() {
        let result = GenerationResult::from(Ok(String::new()));
        assert_eq!(result.failure(), Some(FailureKind::UnexpectedGenerationFailure));
        assert_eq!(result.char_len(), 0);
    }

    #[test]
    fn char_len_counts_characters() {
        let result = GenerationResult::from(Ok("héllo".to_string()));
        assert_eq!(result.text(), Some("héllo"));
        assert_eq!(result.char_len(), 5);
    }
}
