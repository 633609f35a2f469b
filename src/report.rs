use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use anyhow::Context;

use crate::{
    harness::{EvaluationReport, PromptReport, RunSummary},
    model::GenerationResult,
};

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// Human-readable console report. The format carries no stability guarantee.
pub struct Reporter<W: Write> {
    out: W,
    a_label: String,
    b_label: String,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, a_label: impl Into<String>, b_label: impl Into<String>) -> Self {
        Self {
            out,
            a_label: a_label.into(),
            b_label: b_label.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn header(&mut self, total: usize) -> io::Result<()> {
        writeln!(
            self.out,
            "{} vs {} comparison ({total} prompts)",
            self.a_label, self.b_label
        )?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out)
    }

    pub fn prompt(&mut self, report: &PromptReport, total: usize) -> io::Result<()> {
        writeln!(self.out, "Test {}/{total}: {:?}", report.index + 1, report.prompt)?;
        writeln!(self.out, "{THIN_RULE}")?;

        write_output(&mut self.out, &self.a_label, &report.a)?;
        write_output(&mut self.out, &self.b_label, &report.b)?;

        match report.outcome {
            Some(outcome) if outcome.agreement => writeln!(
                self.out,
                "Outputs share common prefix ({} chars)",
                outcome.common_prefix_length
            )?,
            Some(_) => writeln!(self.out, "Outputs diverge immediately")?,
            None => writeln!(self.out, "Analysis skipped: both outputs are required")?,
        }
        writeln!(self.out, "  {} length: {} chars", self.a_label, report.a.char_len())?;
        writeln!(self.out, "  {} length: {} chars", self.b_label, report.b.char_len())?;

        writeln!(self.out)?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out)
    }

    pub fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(
            self.out,
            "Summary: {} attempted, {} compared, {} agreeing",
            summary.attempted, summary.compared, summary.agreed
        )?;
        for skipped in &summary.skipped {
            let a = skipped.a_failure.map_or("ok", |k| k.as_str());
            let b = skipped.b_failure.map_or("ok", |k| k.as_str());
            writeln!(
                self.out,
                "  skipped {}: {:?} ({}: {a}, {}: {b})",
                skipped.index + 1,
                skipped.prompt,
                self.a_label,
                self.b_label
            )?;
        }
        self.out.flush()
    }
}

fn write_output<W: Write>(out: &mut W, label: &str, result: &GenerationResult) -> io::Result<()> {
    writeln!(out, "{label} output:")?;
    match result {
        GenerationResult::Produced { text } => writeln!(out, "  {text}")?,
        GenerationResult::Unavailable { kind, reason } => {
            writeln!(out, "  (failed: {}) {reason}", kind.as_str())?
        }
    }
    writeln!(out)
}

pub fn write_json_report(path: &Path, report: &EvaluationReport) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(report).context("serializing report")?;
    fs::write(path, body).with_context(|| format!("writing report to {}", path.display()))
}
