use std::path::{Path, PathBuf};

use tokenizers::Tokenizer;

use crate::{error::GenerationError, model::GenerationRequest};

/// Everything the in-process implementation needs to rebuild its engine.
#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub checkpoint_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub device: String,
    pub eos_token_id: i64,
    pub block_size: usize,
}

pub fn load_tokenizer(path: &Path) -> Result<Tokenizer, GenerationError> {
    Tokenizer::from_file(path)
        .map_err(|e| GenerationError::Tokenizer(format!("{}: {e}", path.display())))
}

/// Builds tokenizer, model, device and engine, then runs one generation.
#[cfg(feature = "tch-backend")]
pub fn generate_in_process(
    settings: &LocalSettings,
    request: &GenerationRequest,
) -> Result<String, GenerationError> {
    let tokenizer = load_tokenizer(&settings.tokenizer_path)?;
    let device = engine::select_device(&settings.device);
    tracing::debug!(?device, checkpoint = %settings.checkpoint_path.display(), "loading checkpoint");
    let engine = engine::Engine::from_checkpoint(
        &settings.checkpoint_path,
        tokenizer,
        device,
        settings.eos_token_id,
        settings.block_size,
    )?;
    engine.generate(
        &request.prompt,
        request.max_tokens,
        request.temperature,
        request.top_p,
    )
}

#[cfg(not(feature = "tch-backend"))]
pub fn generate_in_process(
    settings: &LocalSettings,
    _request: &GenerationRequest,
) -> Result<String, GenerationError> {
    load_tokenizer(&settings.tokenizer_path)?;
    Err(GenerationError::Inference(
        "built without the tch-backend feature".into(),
    ))
}

#[cfg(feature = "tch-backend")]
mod engine {
    use std::path::Path;

    use parking_lot::Mutex;
    use tch::{Device, IValue, Kind, Tensor, no_grad};
    use tokenizers::Tokenizer;

    use crate::error::GenerationError;

    pub fn select_device(raw: &str) -> Device {
        let lower = raw.to_lowercase();
        if lower == "auto" {
            Device::cuda_if_available()
        } else if lower.starts_with("cuda") {
            let idx = lower
                .split(':')
                .nth(1)
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(0);
            if tch::Cuda::is_available() {
                Device::Cuda(idx)
            } else {
                Device::Cpu
            }
        } else {
            Device::Cpu
        }
    }

    pub struct Engine {
        tokenizer: Tokenizer,
        device: Device,
        module: Mutex<tch::CModule>,
        eos_token_id: i64,
        block_size: usize,
    }

    impl Engine {
        pub fn from_checkpoint(
            path: &Path,
            tokenizer: Tokenizer,
            device: Device,
            eos_token_id: i64,
            block_size: usize,
        ) -> Result<Self, GenerationError> {
            let mut module = tch::CModule::load_on_device(path, device)
                .map_err(|e| GenerationError::Inference(e.to_string()))?;
            module.set_eval();
            Ok(Self {
                tokenizer,
                device,
                module: Mutex::new(module),
                eos_token_id,
                block_size: block_size.max(1),
            })
        }

        /// Returns the prompt followed by the sampled continuation.
        pub fn generate(
            &self,
            prompt: &str,
            max_tokens: usize,
            temperature: f64,
            top_p: f64,
        ) -> Result<String, GenerationError> {
            if prompt.is_empty() {
                return Err(GenerationError::BadRequest("prompt must not be empty".into()));
            }

            let encoding = self
                .tokenizer
                .encode(prompt, false)
                .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;
            let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
            if ids.is_empty() {
                return Err(GenerationError::BadRequest(
                    "prompt encodes to zero tokens".into(),
                ));
            }
            let prompt_len = ids.len();

            no_grad(|| {
                let module = self.module.lock();
                for _ in 0..max_tokens {
                    let start = ids.len().saturating_sub(self.block_size);
                    let window = &ids[start..];
                    let input = Tensor::from_slice(window)
                        .reshape([1, window.len() as i64])
                        .to(self.device);

                    let output = module
                        .forward_is(&[IValue::Tensor(input)])
                        .map_err(|e| GenerationError::Inference(e.to_string()))?;
                    let logits = extract_logits(output)?;

                    // [1, seq, vocab] -> [vocab]
                    let last = logits.select(1, -1).squeeze().to_kind(Kind::Float);
                    let next = sample_next(&last, temperature, top_p);
                    ids.push(next);
                    if next == self.eos_token_id {
                        break;
                    }
                }
                Ok::<(), GenerationError>(())
            })?;

            let generated: Vec<u32> = ids[prompt_len..]
                .iter()
                .filter(|&&id| id != self.eos_token_id)
                .map(|&id| id as u32)
                .collect();
            let completion = self
                .tokenizer
                .decode(&generated, true)
                .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;

            Ok(format!("{prompt}{completion}"))
        }
    }

    fn extract_logits(output: IValue) -> Result<Tensor, GenerationError> {
        match output {
            IValue::Tensor(t) => Ok(t),
            IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                IValue::Tensor(t) => Ok(t.shallow_clone()),
                _ => Err(GenerationError::Inference(
                    "expected tensor as first tuple element".into(),
                )),
            },
            _ => Err(GenerationError::Inference(
                "unexpected model output format".into(),
            )),
        }
    }

    /// Temperature scaling followed by nucleus sampling; greedy at temperature 0.
    pub(super) fn sample_next(logits: &Tensor, temperature: f64, top_p: f64) -> i64 {
        if temperature <= 0.0 {
            return logits.argmax(0, false).int64_value(&[]);
        }
        let probs = (logits / temperature).softmax(-1, Kind::Float);
        let (sorted, indices) = probs.sort(-1, true);
        let cumulative = sorted.cumsum(-1, Kind::Float);
        // keep the smallest head whose mass reaches top_p; the first token always survives
        let outside = (&cumulative - &sorted).gt(top_p);
        let kept = sorted.masked_fill(&outside, 0.0);
        let choice = kept.multinomial(1, false);
        indices.gather(-1, &choice, false).int64_value(&[0])
    }

}
