//! Per-run diagnostics collector.
//!
//! RULE: stages never propagate their internal failures as Rust errors.
//! They convert them to diagnostics and keep going; the one exception is
//! the Identity Merger producing zero identities, which is fatal and makes
//! the orchestrator abort the run.
//!
//! The sink is append-only within a run and starts empty on every run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable name of the stage that reported this entry.
    pub stage: String,
    pub severity: Severity,
    pub message: String,
}

/// The single per-run accumulator every stage reports into.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{stage}] {message}");
        self.entries.push(Diagnostic {
            stage: stage.to_string(),
            severity: Severity::Warning,
            message,
        });
    }

    pub fn fatal(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        log::error!("[{stage}] {message}");
        self.entries.push(Diagnostic {
            stage: stage.to_string(),
            severity: Severity::Fatal,
            message,
        });
    }

    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.entries
    }
}
