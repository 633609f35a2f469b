use std::{fs, io::Write, path::Path};

use anyhow::{Context, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    comparison::ComparisonOutcome,
    config::AppConfig,
    error::FailureKind,
    model::{
        GenerationRequest, GenerationResult, Generator, LocalGenerator, RemoteGenerator,
        SamplingParams,
    },
    report::Reporter,
};

/// Everything observed for one prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptReport {
    pub index: usize,
    pub prompt: String,
    pub a: GenerationResult,
    pub b: GenerationResult,
    /// Present only when both sides produced text.
    pub outcome: Option<ComparisonOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPrompt {
    pub index: usize,
    pub prompt: String,
    pub a_failure: Option<FailureKind>,
    pub b_failure: Option<FailureKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub compared: usize,
    pub agreed: usize,
    pub skipped: Vec<SkippedPrompt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub a_label: String,
    pub b_label: String,
    pub samples: Vec<PromptReport>,
    pub summary: RunSummary,
}

/// Runs the same requests through two implementations and compares them.
pub struct Harness {
    a: Box<dyn Generator>,
    b: Box<dyn Generator>,
    sampling: SamplingParams,
}

impl Harness {
    pub fn new(a: Box<dyn Generator>, b: Box<dyn Generator>, sampling: SamplingParams) -> Self {
        Self { a, b, sampling }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Box::new(LocalGenerator::from_config(config)),
            Box::new(RemoteGenerator::from_config(config)),
            config.sampling,
        )
    }

    pub fn labels(&self) -> (&str, &str) {
        (self.a.label(), self.b.label())
    }

    /// Lazily compares `prompts` in order. Each call starts a fresh pass.
    pub fn compare<'a>(&'a self, prompts: &'a [String]) -> Comparisons<'a> {
        Comparisons {
            harness: self,
            prompts,
            position: 0,
        }
    }

    async fn compare_one(&self, index: usize, prompt: &str) -> PromptReport {
        let request = self.sampling.request_for(prompt);

        let a = invoke(self.a.as_ref(), &request).await;
        let b = invoke(self.b.as_ref(), &request).await;

        let outcome = match (a.text(), b.text()) {
            (Some(a), Some(b)) => Some(ComparisonOutcome::new(prompt, a, b)),
            _ => None,
        };

        PromptReport {
            index,
            prompt: prompt.to_string(),
            a,
            b,
            outcome,
        }
    }
}

/// Finite sequence of per-prompt reports, produced on demand.
pub struct Comparisons<'a> {
    harness: &'a Harness,
    prompts: &'a [String],
    position: usize,
}

impl Comparisons<'_> {
    pub fn total(&self) -> usize {
        self.prompts.len()
    }

    pub async fn next_report(&mut self) -> Option<PromptReport> {
        let prompt = self.prompts.get(self.position)?;
        let index = self.position;
        self.position += 1;
        Some(self.harness.compare_one(index, prompt).await)
    }
}

async fn invoke(generator: &dyn Generator, request: &GenerationRequest) -> GenerationResult {
    let result = GenerationResult::from(generator.generate(request).await);
    if let GenerationResult::Unavailable { kind, reason } = &result {
        warn!(label = generator.label(), ?kind, %reason, "generation unavailable");
    }
    result
}

/// Full pass over `prompts`, reporting each comparison as it completes.
pub async fn run_comparison<W: Write>(
    harness: &Harness,
    prompts: &[String],
    reporter: &mut Reporter<W>,
) -> anyhow::Result<EvaluationReport> {
    let mut comparisons = harness.compare(prompts);
    reporter.header(comparisons.total())?;

    let mut samples = Vec::with_capacity(comparisons.total());
    while let Some(report) = comparisons.next_report().await {
        info!(
            index = report.index,
            agreement = report.outcome.map(|o| o.agreement),
            "prompt compared"
        );
        reporter.prompt(&report, comparisons.total())?;
        samples.push(report);
    }

    let summary = summarize(&samples);
    reporter.summary(&summary)?;

    let (a_label, b_label) = harness.labels();
    Ok(EvaluationReport {
        a_label: a_label.to_string(),
        b_label: b_label.to_string(),
        samples,
        summary,
    })
}

pub fn summarize(reports: &[PromptReport]) -> RunSummary {
    let compared = reports.iter().filter(|r| r.outcome.is_some()).count();
    let agreed = reports
        .iter()
        .filter_map(|r| r.outcome)
        .filter(|o| o.agreement)
        .count();
    let skipped = reports
        .iter()
        .filter(|r| r.outcome.is_none())
        .map(|r| SkippedPrompt {
            index: r.index,
            prompt: r.prompt.clone(),
            a_failure: r.a.failure(),
            b_failure: r.b.failure(),
        })
        .collect();

    RunSummary {
        attempted: reports.len(),
        compared,
        agreed,
        skipped,
    }
}

pub fn default_prompts() -> Vec<String> {
    vec![
        "Once upon a time".to_string(),
        "The meaning of life is".to_string(),
        "Hello, how are you?".to_string(),
    ]
}

/// Reads a JSON array of prompts; items are strings or objects with a `prompt` field.
pub fn load_prompts_from_path(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading prompts file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid prompts file {}", path.display()))?;

    let serde_json::Value::Array(items) = value else {
        bail!("prompts file must be a JSON array");
    };
    if items.is_empty() {
        bail!("prompts file contains no prompts");
    }

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let prompt = match &item {
                serde_json::Value::String(s) => Some(s.as_str()),
                other => other.get("prompt").and_then(|v| v.as_str()),
            };
            prompt
                .map(str::to_string)
                .with_context(|| format!("prompt item {idx} is neither a string nor has a string 'prompt'"))
        })
        .collect()
}
