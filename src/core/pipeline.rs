//! Stage pipeline execution (the domain supervisor).
//!
//! A `StagePipeline` runs a fixed ordered list of workers, threading each
//! stage's output into the next stage's context, and assembles an
//! immutable `StageResult`. Worker failures, cancellations and timeouts
//! are captured as degraded per-stage outcomes; the pipeline never aborts
//! early and never propagates a raw error past its boundary. The outer
//! orchestrator decides what a degraded result means.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{excerpt, Event, EventKind, FailureKind, StageOutcome, StageResult};
use crate::workers::{CommandWorker, ContextEntry, Worker, WorkerError};

use super::plan::{DomainSpec, RunPlan};

/// One worker stage bound into a pipeline
pub struct StageBinding {
    /// Stage name (unique within the pipeline)
    pub name: String,

    /// The worker performing this stage's work
    pub worker: Arc<dyn Worker>,

    /// Instruction prepended to the stage's context
    pub instruction: Option<String>,

    /// Timeout for the worker call
    pub timeout: Duration,
}

/// Input slice handed to a pipeline invocation.
///
/// Pipelines never see the orchestrator's run state directly; everything
/// they need arrives here and everything they produce flows back through
/// the returned `PipelineRun`.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    /// The run this invocation belongs to
    pub run_id: Uuid,

    /// Original user request
    pub request: String,

    /// Summaries of previously approved domains, in pipeline order
    pub prior_results: Vec<(String, String)>,

    /// Which attempt of this domain this is (1-indexed)
    pub attempt: u32,
}

/// Result of one pipeline invocation: the immutable stage result plus the
/// trace events the orchestrator splices into the run's event log.
pub struct PipelineRun {
    pub result: StageResult,
    pub trace: Vec<Event>,
}

/// Fixed linear sequence of worker stages implementing one domain
pub struct StagePipeline {
    domain: String,
    stages: Vec<StageBinding>,
}

impl StagePipeline {
    /// Create a pipeline from pre-bound stages
    pub fn new(domain: impl Into<String>, stages: Vec<StageBinding>) -> Self {
        Self {
            domain: domain.into(),
            stages,
        }
    }

    /// Build a pipeline from a plan's domain spec, binding each stage to a
    /// subprocess worker
    pub fn from_spec(spec: &DomainSpec, plan: &RunPlan) -> Self {
        let stages = spec
            .stages
            .iter()
            .map(|stage| StageBinding {
                name: stage.name.clone(),
                worker: Arc::new(CommandWorker::new(
                    stage.name.clone(),
                    stage.command.clone(),
                    stage.args.clone(),
                )),
                instruction: stage.instruction.clone(),
                timeout: stage.timeout(plan),
            })
            .collect();

        Self::new(spec.name.clone(), stages)
    }

    /// Domain this pipeline implements
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run all stages and return the aggregate result.
    ///
    /// Strictly sequential; the only loopback mechanism is the top-level
    /// re-invocation of the whole pipeline.
    pub async fn run(&self, input: &PipelineInput) -> PipelineRun {
        let mut outcomes: Vec<StageOutcome> = Vec::new();
        let mut trace: Vec<Event> = Vec::new();

        for binding in &self.stages {
            trace.push(Event::new(
                input.run_id,
                Some(self.domain.clone()),
                Some(binding.name.clone()),
                EventKind::StageStarted,
                format!(
                    "Stage '{}' started (attempt {})",
                    binding.name, input.attempt
                ),
            ));

            let context = self.build_context(input, binding, &outcomes);
            let started = Instant::now();

            let invocation =
                tokio::time::timeout(binding.timeout, binding.worker.invoke(&context)).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match invocation {
                Ok(Ok(reply)) => {
                    debug!(domain = %self.domain, stage = %binding.name, "Stage completed");

                    trace.push(
                        Event::new(
                            input.run_id,
                            Some(self.domain.clone()),
                            Some(binding.name.clone()),
                            EventKind::StageCompleted,
                            format!(
                                "Stage '{}' completed; hand-off: {}",
                                binding.name,
                                excerpt(&reply.content)
                            ),
                        )
                        .with_duration(duration_ms),
                    );

                    outcomes.push(StageOutcome::succeeded(
                        &binding.name,
                        reply.content,
                        duration_ms,
                    ));
                }
                Ok(Err(err)) => {
                    warn!(domain = %self.domain, stage = %binding.name, error = %err, "Stage failed");

                    let kind = failure_kind(err);
                    trace.push(
                        Event::new(
                            input.run_id,
                            Some(self.domain.clone()),
                            Some(binding.name.clone()),
                            EventKind::StageFailed,
                            format!("Stage '{}' failed", binding.name),
                        )
                        .with_duration(duration_ms)
                        .with_error(kind.to_string()),
                    );

                    outcomes.push(StageOutcome::failed(&binding.name, kind, duration_ms));
                }
                Err(_elapsed) => {
                    warn!(domain = %self.domain, stage = %binding.name, timeout_ms = binding.timeout.as_millis() as u64, "Stage timed out");

                    let kind = FailureKind::TimedOut(binding.timeout.as_millis() as u64);
                    trace.push(
                        Event::new(
                            input.run_id,
                            Some(self.domain.clone()),
                            Some(binding.name.clone()),
                            EventKind::StageFailed,
                            format!("Stage '{}' timed out", binding.name),
                        )
                        .with_duration(duration_ms)
                        .with_error(kind.to_string()),
                    );

                    outcomes.push(StageOutcome::failed(&binding.name, kind, duration_ms));
                }
            }
        }

        let summary = self.synthesize_summary(input.attempt, &outcomes);
        let result = StageResult {
            domain: self.domain.clone(),
            attempt: input.attempt,
            stages: outcomes,
            summary,
        };

        PipelineRun { result, trace }
    }

    /// Assemble the context for one stage: instruction, original request,
    /// prior domains' summaries, then the hand-offs from earlier stages.
    fn build_context(
        &self,
        input: &PipelineInput,
        binding: &StageBinding,
        prior_stages: &[StageOutcome],
    ) -> Vec<ContextEntry> {
        let mut context = Vec::new();

        if let Some(ref instruction) = binding.instruction {
            context.push(ContextEntry::system(instruction.clone()));
        }

        context.push(ContextEntry::user(input.request.clone()));

        for (domain, summary) in &input.prior_results {
            context.push(ContextEntry::user(format!(
                "Results from the '{}' domain:\n{}",
                domain, summary
            )));
        }

        for outcome in prior_stages {
            context.push(ContextEntry::assistant(format!(
                "[stage: {}]\n{}",
                outcome.stage, outcome.output
            )));
        }

        context
    }

    /// Build the summary string the evaluator will judge: per-stage status
    /// markers plus the final hand-off content.
    fn synthesize_summary(&self, attempt: u32, outcomes: &[StageOutcome]) -> String {
        let succeeded = outcomes.iter().filter(|o| o.success).count();

        let mut summary = format!(
            "Domain '{}' attempt {}: {}/{} stages succeeded.\n",
            self.domain,
            attempt,
            succeeded,
            outcomes.len()
        );

        for outcome in outcomes {
            match &outcome.failure {
                None => summary.push_str(&format!("- {}: ok\n", outcome.stage)),
                Some(kind) => summary.push_str(&format!("- {}: {}\n", outcome.stage, kind)),
            }
        }

        if let Some(last) = outcomes.last() {
            summary.push_str("\nFinal hand-off:\n");
            summary.push_str(&last.output);
        }

        summary
    }
}

fn failure_kind(err: WorkerError) -> FailureKind {
    match err {
        WorkerError::Cancelled { .. } => FailureKind::Cancelled,
        other => FailureKind::Worker(other.to_string()),
    }
}
