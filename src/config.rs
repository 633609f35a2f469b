use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;

use crate::model::{ModelConfig, SamplingParams};

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub checkpoint_path: PathBuf,
    pub tokenizer_dir: PathBuf,
    pub sampling: SamplingParams,
    pub model: ModelConfig,
    pub device: String,
    pub eos_token_id: i64,
    pub remote_program: String,
    pub remote_label: String,
    pub remote_script: Option<PathBuf>,
    pub remote_workdir: Option<PathBuf>,
    pub remote_timeout: Duration,
    pub prompts_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let cache_dir = match env::var("NANOCHAT_CACHE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_cache_dir()?,
        };
        let checkpoint_path = env::var("CHECKPOINT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| cache_dir.join("model.pt"));
        let tokenizer_dir = env::var("TOKENIZER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| cache_dir.join("tokenizer"));

        let defaults = SamplingParams::default();
        let sampling = SamplingParams {
            max_tokens: parse_var("MAX_TOKENS").unwrap_or(defaults.max_tokens),
            temperature: parse_var("TEMPERATURE").unwrap_or(defaults.temperature),
            top_p: parse_var("TOP_P").unwrap_or(defaults.top_p),
        };
        sampling
            .validate()
            .context("invalid sampling parameters")?;

        let device = env::var("DEVICE").unwrap_or_else(|_| "auto".into());
        let eos_token_id = parse_var("EOS_TOKEN_ID").unwrap_or(50_256);

        let remote_program = env::var("REMOTE_PROGRAM").unwrap_or_else(|_| "ruby".into());
        let remote_label = env::var("REMOTE_LABEL").unwrap_or_else(|_| "ruby".into());
        let remote_script = env::var("REMOTE_SCRIPT").ok().map(PathBuf::from);
        let remote_workdir = env::var("REMOTE_WORKDIR").ok().map(PathBuf::from);
        let remote_timeout = parse_timeout(env::var("REMOTE_TIMEOUT_SECS").ok().as_deref());

        let prompts_path = env::var("PROMPTS_PATH").ok().map(PathBuf::from);
        let report_path = env::var("REPORT_PATH").ok().map(PathBuf::from);

        Ok(Self {
            checkpoint_path,
            tokenizer_dir,
            sampling,
            model: ModelConfig::default(),
            device,
            eos_token_id,
            remote_program,
            remote_label,
            remote_script,
            remote_workdir,
            remote_timeout,
            prompts_path,
            report_path,
        })
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.tokenizer_dir.join("tokenizer.json")
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Seconds as a float; anything unparsable, non-positive or unrepresentable means 60s.
fn parse_timeout(raw: Option<&str>) -> Duration {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_REMOTE_TIMEOUT)
}

fn default_cache_dir() -> anyhow::Result<PathBuf> {
    let home = env::var("HOME").context("HOME is not set and NANOCHAT_CACHE_DIR is missing")?;
    Ok(PathBuf::from(home).join(".cache").join("nanochat"))
}
