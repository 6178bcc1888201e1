//! Domain types: events, run state, stage results, verdicts.

pub mod events;
pub mod run;
pub mod stage;
pub mod verdict;

pub use events::{excerpt, Event, EventKind, EXCERPT_LEN};
pub use run::{Run, RunStatus, Target};
pub use stage::{FailureKind, StageOutcome, StageResult};
pub use verdict::Verdict;
