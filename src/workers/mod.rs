//! Worker invocation boundary.
//!
//! Workers are the opaque units that do the actual reasoning work at each
//! pipeline stage. The orchestration core only sees this interface: a
//! role-tagged context in, a reply or a typed error out.

pub mod command;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::CommandWorker;
pub use scripted::ScriptedWorker;

/// Role tag for a context entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering context as text
    pub fn label(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry of the conversational context handed to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
}

impl ContextEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Reply from a worker invocation
#[derive(Debug, Clone)]
pub struct WorkerReply {
    /// Free text or serialized structured data
    pub content: String,
}

impl WorkerReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Typed failure of a worker invocation.
///
/// Cancellation is distinct from ordinary failure so the pipeline can
/// record it as its own degraded-outcome kind.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("worker '{worker}' failed: {reason}")]
    Failed { worker: String, reason: String },

    #[error("worker '{worker}' call was cancelled")]
    Cancelled { worker: String },

    #[error("worker '{worker}' produced invalid output: {reason}")]
    InvalidOutput { worker: String, reason: String },
}

/// An opaque unit of work.
///
/// Invocations may be asynchronous and may fail; the orchestrator awaits
/// each one before proceeding. Implementations must be safe to share
/// across independent runs (they receive all per-run state as input).
#[async_trait]
pub trait Worker: Send + Sync {
    /// Human-readable worker name
    fn name(&self) -> &str;

    /// Perform one unit of work against the given context
    async fn invoke(&self, context: &[ContextEntry]) -> Result<WorkerReply, WorkerError>;
}

/// Render a context as role-tagged text, the wire form piped to
/// subprocess-backed workers.
pub fn render_context(context: &[ContextEntry]) -> String {
    let mut out = String::new();
    for entry in context {
        out.push_str(&format!("[{}]\n{}\n\n", entry.role.label(), entry.content));
    }
    out
}
