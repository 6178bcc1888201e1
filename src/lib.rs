//! steward - Event-sourced hierarchical run supervisor
//!
//! A supervisory engine that drives a user request through an ordered
//! sequence of domains, each implemented by a fixed pipeline of opaque
//! workers, with an evaluation gate and a bounded retry budget between
//! domains.
//!
//! # Architecture
//!
//! The system is built around event sourcing:
//! - All state changes are recorded as immutable events
//! - Current routing state is derived by replaying events
//! - Interrupted runs can be resumed from the last recorded target
//!
//! # Modules
//!
//! - `core`: Orchestration logic (Orchestrator, StagePipeline, evaluation,
//!   CheckpointStore)
//! - `domain`: Data structures (Event, Run, StageResult, Verdict)
//! - `workers`: The worker seam (subprocess and scripted implementations)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Execute a plan
//! echo "automate COMMONR-198" | steward run codegen --stdin
//!
//! # Check run status
//! steward status <run-id>
//!
//! # Resume an interrupted run
//! steward resume <run-id>
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod workers;

// Re-export main types at crate root for convenience
pub use core::{CheckpointStore, Evaluator, Orchestrator, RunPlan, StagePipeline, WorkerEvaluator};
pub use domain::{Event, EventKind, Run, RunStatus, StageResult, Target, Verdict};
pub use workers::{CommandWorker, ContextEntry, ScriptedWorker, Worker, WorkerError, WorkerReply};
