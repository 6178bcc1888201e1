//! Run state and reconstruction from events.
//!
//! A `Run` is the single mutable aggregate for one supervised execution:
//! the append-only event log, the routing target, per-domain retry
//! counters, the latest per-domain results and the eventual final output.
//! It is owned exclusively by the orchestrator for the run's lifetime.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventKind};
use super::stage::StageResult;

/// A supervised multi-domain run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Name of the plan being executed
    pub plan_name: String,

    /// Original user request
    pub request: String,

    /// The next step the state machine will execute
    pub target: Target,

    /// Current status of the run
    pub status: RunStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state (if it has)
    pub completed_at: Option<DateTime<Utc>>,

    /// Retry counter per domain (incremented only on a RETRY transition)
    pub retry_counts: HashMap<String, u32>,

    /// Latest result per domain (overwritten on every re-run)
    pub domain_results: HashMap<String, StageResult>,

    /// Terminal artifact; set exactly once, on a terminal transition
    pub final_output: Option<String>,

    /// Append-only event log, in append order
    pub events: Vec<Event>,
}

impl Run {
    /// Create a new run for a plan
    pub fn new(id: Uuid, plan_name: String, request: String) -> Self {
        Self {
            id,
            plan_name,
            request,
            target: Target::Start,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            retry_counts: HashMap::new(),
            domain_results: HashMap::new(),
            final_output: None,
            events: Vec::new(),
        }
    }

    /// Reconstruct run state from a replayed event sequence.
    ///
    /// The request text and per-domain results are persisted as separate
    /// snapshots by the checkpoint store; the caller fills them in after
    /// reconstruction.
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first = events.first()?;

        let mut run = Self::new(first.run_id, String::new(), String::new());
        run.started_at = first.timestamp;

        for event in events {
            run.apply_event(event);
            run.events.push(event.clone());
        }

        Some(run)
    }

    /// Apply a single event to the routing/counter state.
    ///
    /// Log entries are appended separately; this only updates the derived
    /// fields, so live execution and replay go through the same code path.
    pub fn apply_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::RunStarted => {
                self.status = RunStatus::Running;
                self.started_at = event.timestamp;
            }
            EventKind::DomainStarted => {
                if let Some(ref domain) = event.domain {
                    self.target = Target::RunDomain(domain.clone());
                }
            }
            EventKind::DomainCompleted => {
                if let Some(ref domain) = event.domain {
                    self.target = Target::Evaluate(domain.clone());
                }
            }
            EventKind::DomainApproved => {
                if let Some(ref domain) = event.domain {
                    self.target = Target::Advance(domain.clone());
                }
            }
            EventKind::RetryScheduled => {
                if let Some(ref domain) = event.domain {
                    *self.retry_counts.entry(domain.clone()).or_insert(0) += 1;
                    self.target = Target::RunDomain(domain.clone());
                }
            }
            EventKind::RunSucceeded => {
                self.status = RunStatus::Succeeded;
                self.final_output = Some(event.message.clone());
                self.completed_at = Some(event.timestamp);
                self.target = Target::Done;
            }
            EventKind::RunFailed => {
                self.status = RunStatus::Failed {
                    domain: event.domain.clone(),
                };
                self.final_output = Some(event.message.clone());
                self.completed_at = Some(event.timestamp);
                self.target = Target::Done;
            }
            // Stage-level and evaluation bookkeeping events carry trace
            // detail only; they do not move the routing target.
            EventKind::StageStarted
            | EventKind::StageCompleted
            | EventKind::StageFailed
            | EventKind::EvaluationStarted
            | EventKind::VerdictUnparsed => {}
        }
    }

    /// Append an event to the log and apply it
    pub fn record(&mut self, event: Event) {
        self.apply_event(&event);
        self.events.push(event);
    }

    /// Current retry count for a domain
    pub fn retry_count(&self, domain: &str) -> u32 {
        self.retry_counts.get(domain).copied().unwrap_or(0)
    }

    /// Which attempt the next run of `domain` would be (1-indexed)
    pub fn attempt(&self, domain: &str) -> u32 {
        self.retry_count(domain) + 1
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running)
    }

    /// Check if the run has reached a terminal state
    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    /// Number of times a domain's pipeline was dispatched
    pub fn executions(&self, domain: &str) -> usize {
        self.events
            .iter()
            .filter(|e| {
                e.kind == EventKind::DomainStarted && e.domain.as_deref() == Some(domain)
            })
            .count()
    }
}

/// The next step the state machine will execute.
///
/// `Advance` is the routing marker between an approval and the dispatch of
/// the following domain: only the orchestrator knows the configured order,
/// so the aggregate records "approved, not yet routed" and the orchestrator
/// resolves it to the next domain or to terminal success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step", content = "domain")]
pub enum Target {
    /// Before the first transition
    Start,

    /// Run the named domain's stage pipeline
    RunDomain(String),

    /// Evaluate the named domain's latest result
    Evaluate(String),

    /// The named domain was approved; route to its successor
    Advance(String),

    /// Terminal sentinel
    Done,
}

/// Status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    /// Currently executing
    Running,

    /// Every domain was approved
    Succeeded,

    /// Terminated in failure (the offending domain, when known)
    Failed { domain: Option<String> },
}
