//! Run orchestration: plans, pipelines, evaluation and checkpoints.

pub mod checkpoint;
pub mod evaluator;
pub mod orchestrator;
pub mod pipeline;
pub mod plan;

pub use checkpoint::{fingerprint, CheckpointStore, RunHeader};
pub use evaluator::{decide, Action, Decision, Evaluator, ReviewRequest, WorkerEvaluator};
pub use orchestrator::{DomainRuntime, Orchestrator};
pub use pipeline::{PipelineInput, PipelineRun, StageBinding, StagePipeline};
pub use plan::{DomainSpec, EvaluatorSpec, RunPlan, StageSpec};
