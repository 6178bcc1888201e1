//! Event types for the event-sourced run supervisor.
//!
//! Every transition the orchestrator makes is recorded as an immutable
//! event in an append-only log. The log doubles as the human-readable
//! trace of the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a hand-off excerpt embedded in an event message.
pub const EXCERPT_LEN: usize = 120;

/// A single entry in the append-only event log.
///
/// Events are the source of truth for run state. The current state of any
/// run can be reconstructed by replaying its events in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Domain this event concerns (if applicable)
    pub domain: Option<String>,

    /// Pipeline stage within the domain (if applicable)
    pub stage: Option<String>,

    /// Type of event
    pub kind: EventKind,

    /// Human-readable entry (NO secrets)
    pub message: String,

    /// Time taken in milliseconds (for completed stages)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        domain: Option<String>,
        stage: Option<String>,
        kind: EventKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            domain,
            stage,
            kind,
            message: message.into(),
            duration_ms: None,
            error: None,
        }
    }

    /// Attach duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events that occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new run has started
    RunStarted,

    /// A domain's stage pipeline has been dispatched
    DomainStarted,

    /// A pipeline stage has started execution
    StageStarted,

    /// A pipeline stage completed successfully
    StageCompleted,

    /// A pipeline stage failed, was cancelled or timed out
    StageFailed,

    /// A domain's stage pipeline returned (possibly degraded)
    DomainCompleted,

    /// Evaluation of a domain's result has begun
    EvaluationStarted,

    /// The evaluator approved a domain's result
    DomainApproved,

    /// A re-run of the same domain was scheduled
    RetryScheduled,

    /// The evaluator's judgment did not parse to a known verdict
    VerdictUnparsed,

    /// The run finished with every domain approved
    RunSucceeded,

    /// The run terminated in failure
    RunFailed,
}

impl EventKind {
    /// Whether this kind ends the run
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::RunSucceeded | Self::RunFailed)
    }
}

/// Produce a single-line, length-bounded excerpt of hand-off content for
/// embedding in log messages.
pub fn excerpt(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let line = line.trim();

    if line.chars().count() <= EXCERPT_LEN {
        return line.to_string();
    }

    let cut: String = line.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("testcase".to_string()),
            Some("search".to_string()),
            EventKind::StageStarted,
            "Stage 'search' started",
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.kind, EventKind::StageStarted);
        assert_eq!(parsed.domain.as_deref(), Some("testcase"));
        assert_eq!(parsed.stage.as_deref(), Some("search"));
    }

    #[test]
    fn test_event_with_duration_and_error() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("testcase".to_string()),
            Some("design".to_string()),
            EventKind::StageFailed,
            "Stage 'design' failed",
        )
        .with_duration(1500)
        .with_error("connection timeout");

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("connection timeout"));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(EventKind::RunSucceeded.is_terminal());
        assert!(EventKind::RunFailed.is_terminal());
        assert!(!EventKind::RetryScheduled.is_terminal());
        assert!(!EventKind::DomainApproved.is_terminal());
    }

    #[test]
    fn test_excerpt_bounds_length() {
        let long = "x".repeat(500);
        let e = excerpt(&long);
        assert_eq!(e.chars().count(), EXCERPT_LEN + 3);
        assert!(e.ends_with("..."));
    }

    #[test]
    fn test_excerpt_takes_first_nonempty_line() {
        let text = "\n\n  first real line\nsecond line";
        assert_eq!(excerpt(text), "first real line");
    }

    #[test]
    fn test_excerpt_short_text_unchanged() {
        assert_eq!(excerpt("short"), "short");
        assert_eq!(excerpt(""), "");
    }
}
