//! Stage pipeline results.
//!
//! A `StageResult` is the immutable report a domain's stage pipeline hands
//! back to the orchestrator: one outcome per internal stage plus a
//! synthesized summary. A retry produces a brand-new `StageResult` that
//! replaces the previous one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aggregate result of one stage pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Domain that produced this result
    pub domain: String,

    /// Which attempt produced this result (1-indexed)
    pub attempt: u32,

    /// Per-stage outcomes, in execution order
    pub stages: Vec<StageOutcome>,

    /// Synthesized summary of the whole pipeline run
    pub summary: String,
}

impl StageResult {
    /// Whether every internal stage succeeded
    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(|s| s.success)
    }

    /// Outcome of the final stage, if any stage ran
    pub fn final_stage(&self) -> Option<&StageOutcome> {
        self.stages.last()
    }

    /// Output of the final stage, or the summary for an empty pipeline
    pub fn final_output(&self) -> &str {
        self.final_stage()
            .map(|s| s.output.as_str())
            .unwrap_or(&self.summary)
    }
}

/// Outcome of a single stage within a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name (unique within the pipeline)
    pub stage: String,

    /// Whether the stage's worker returned successfully
    pub success: bool,

    /// Worker output, or a bracketed failure note on failure
    pub output: String,

    /// How the stage failed (if it did)
    pub failure: Option<FailureKind>,

    /// Wall-clock duration of the worker call in milliseconds
    pub duration_ms: u64,
}

impl StageOutcome {
    /// Record a successful stage
    pub fn succeeded(stage: impl Into<String>, output: String, duration_ms: u64) -> Self {
        Self {
            stage: stage.into(),
            success: true,
            output,
            failure: None,
            duration_ms,
        }
    }

    /// Record a failed stage; the output is a bracketed note so later
    /// stages still receive a hand-off
    pub fn failed(stage: impl Into<String>, kind: FailureKind, duration_ms: u64) -> Self {
        let stage = stage.into();
        let output = format!("[stage '{}' produced no output: {}]", stage, kind);
        Self {
            stage,
            success: false,
            output,
            failure: Some(kind),
            duration_ms,
        }
    }
}

/// How a worker invocation failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureKind {
    /// The worker returned an error
    #[error("worker failed: {0}")]
    Worker(String),

    /// The in-flight worker call was cancelled
    #[error("worker call cancelled")]
    Cancelled,

    /// The worker call exceeded its stage timeout
    #[error("worker timed out after {0}ms")]
    TimedOut(u64),
}
