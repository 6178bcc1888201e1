//! Top-level run orchestrator.
//!
//! The orchestrator owns the run for its whole lifetime and drives the
//! routing loop: dispatch a domain's pipeline, evaluate its result, then
//! advance, retry or terminate. It is the only component that knows the
//! configured domain order, holds the retry budget, appends to the event
//! log and persists checkpoints. Domains never talk to each other; every
//! hand-off flows through here.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{excerpt, Event, EventKind, Run, Target, Verdict};
use crate::workers::CommandWorker;

use super::checkpoint::CheckpointStore;
use super::evaluator::{decide, Action, Evaluator, ReviewRequest, WorkerEvaluator};
use super::pipeline::{PipelineInput, StagePipeline};
use super::plan::RunPlan;

/// One domain as the orchestrator sees it: its pipeline plus the review
/// criteria handed to the evaluator
pub struct DomainRuntime {
    pub name: String,
    pub pipeline: StagePipeline,
    pub criteria: Vec<String>,
}

/// Drives runs through the domain sequence under the evaluation gate
pub struct Orchestrator {
    plan_name: String,
    domains: Vec<DomainRuntime>,
    evaluator: Arc<dyn Evaluator>,
    max_retries: u32,
    checkpoint_base: Option<PathBuf>,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl Orchestrator {
    /// Create an orchestrator from pre-built domain runtimes.
    ///
    /// Fails fast on an empty or ambiguous domain sequence; a run must
    /// never enter its first transition with a malformed plan.
    pub fn new(
        plan_name: impl Into<String>,
        domains: Vec<DomainRuntime>,
        evaluator: Arc<dyn Evaluator>,
        max_retries: u32,
    ) -> Result<Self> {
        if domains.is_empty() {
            anyhow::bail!("Orchestrator requires at least one domain");
        }

        if max_retries == 0 {
            anyhow::bail!("max_retries must be positive");
        }

        let mut seen = Vec::new();
        for domain in &domains {
            if seen.contains(&domain.name.as_str()) {
                anyhow::bail!("Duplicate domain name '{}'", domain.name);
            }
            seen.push(domain.name.as_str());
        }

        Ok(Self {
            plan_name: plan_name.into(),
            domains,
            evaluator,
            max_retries,
            checkpoint_base: None,
            event_tx: None,
        })
    }

    /// Build an orchestrator from a validated plan, binding every stage
    /// and the evaluator to subprocess workers
    pub fn from_plan(plan: &RunPlan) -> Result<Self> {
        plan.validate()?;

        let domains = plan
            .domains
            .iter()
            .map(|spec| DomainRuntime {
                name: spec.name.clone(),
                pipeline: StagePipeline::from_spec(spec, plan),
                criteria: spec.review_criteria.clone(),
            })
            .collect();

        let judge = Arc::new(CommandWorker::new(
            "evaluator",
            plan.evaluator.command.clone(),
            plan.evaluator.args.clone(),
        ));
        let evaluator = Arc::new(
            WorkerEvaluator::new(judge).with_approve_threshold(plan.evaluator.approve_threshold),
        );

        Self::new(plan.name.clone(), domains, evaluator, plan.max_retries)
    }

    /// Persist checkpoints (event log + result snapshots) under `base`
    pub fn with_checkpoint_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.checkpoint_base = Some(base.into());
        self
    }

    /// Stream every appended event to a channel as it happens
    pub fn with_event_stream(mut self, tx: mpsc::UnboundedSender<Event>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Ordered domain names
    pub fn domain_names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }

    /// Execute a new run to a terminal state
    #[instrument(skip(self, request), fields(plan = %self.plan_name))]
    pub async fn run(&self, request: &str) -> Result<Run> {
        let run_id = Uuid::new_v4();
        let mut run = Run::new(run_id, self.plan_name.clone(), request.to_string());

        let store = match &self.checkpoint_base {
            Some(base) => {
                let store = CheckpointStore::open_in(base, run_id).await?;
                store.save_header(&self.plan_name, request).await?;
                Some(store)
            }
            None => None,
        };

        info!(run_id = %run_id, "Run starting");
        self.append(
            &mut run,
            &store,
            Event::new(
                run_id,
                None,
                None,
                EventKind::RunStarted,
                format!("Run of plan '{}' started", self.plan_name),
            ),
        )
        .await?;

        self.drive(&mut run, &store).await?;
        Ok(run)
    }

    /// Resume a checkpointed run from its last recorded target.
    ///
    /// Replaying the event log rebuilds the routing state; a run that
    /// already reached a terminal state is returned unchanged.
    #[instrument(skip(self), fields(plan = %self.plan_name))]
    pub async fn resume(&self, run_id: Uuid) -> Result<Run> {
        let base = self
            .checkpoint_base
            .as_ref()
            .context("Resume requires a checkpoint directory")?;

        let store = CheckpointStore::open_in(base, run_id).await?;
        let mut run = store
            .load_run()
            .await?
            .with_context(|| format!("No checkpoint found for run {}", run_id))?;

        if run.is_finished() {
            info!(run_id = %run_id, "Run already finished; nothing to resume");
            return Ok(run);
        }

        info!(run_id = %run_id, target = ?run.target, "Resuming run");
        let store = Some(store);
        self.drive(&mut run, &store).await?;
        Ok(run)
    }

    /// The routing loop: execute the current target until the run is done
    async fn drive(&self, run: &mut Run, store: &Option<CheckpointStore>) -> Result<()> {
        loop {
            match run.target.clone() {
                Target::Start => {
                    let first = self.domains[0].name.clone();
                    self.dispatch_domain(run, store, &first).await?;
                }
                Target::RunDomain(domain) => {
                    self.execute_domain(run, store, &domain).await?;
                }
                Target::Evaluate(domain) => {
                    self.evaluate_domain(run, store, &domain).await?;
                }
                Target::Advance(approved) => match self.next_domain(&approved) {
                    Some(next) => {
                        let next = next.to_string();
                        self.dispatch_domain(run, store, &next).await?;
                    }
                    None => {
                        let report = self.success_report(run);
                        self.append(
                            run,
                            store,
                            Event::new(run.id, None, None, EventKind::RunSucceeded, report),
                        )
                        .await?;
                    }
                },
                Target::Done => break,
            }
        }

        Ok(())
    }

    /// Record the dispatch of a domain; the event moves the target
    async fn dispatch_domain(
        &self,
        run: &mut Run,
        store: &Option<CheckpointStore>,
        domain: &str,
    ) -> Result<()> {
        let attempt = run.attempt(domain);
        self.append(
            run,
            store,
            Event::new(
                run.id,
                Some(domain.to_string()),
                None,
                EventKind::DomainStarted,
                format!("Domain '{}' dispatched (attempt {})", domain, attempt),
            ),
        )
        .await
    }

    /// Run a domain's pipeline, splice its trace into the log, snapshot
    /// the result and hand the run to evaluation
    async fn execute_domain(
        &self,
        run: &mut Run,
        store: &Option<CheckpointStore>,
        domain: &str,
    ) -> Result<()> {
        let runtime = self.runtime(domain)?;
        let attempt = run.attempt(domain);

        let input = PipelineInput {
            run_id: run.id,
            request: run.request.clone(),
            prior_results: self.prior_results(run, domain),
            attempt,
        };

        let pipeline_run = runtime.pipeline.run(&input).await;
        for event in pipeline_run.trace {
            self.append(run, store, event).await?;
        }

        let result = pipeline_run.result;
        if let Some(store) = store {
            store.save_result(&result).await?;
        }

        self.append(
            run,
            store,
            Event::new(
                run.id,
                Some(domain.to_string()),
                None,
                EventKind::DomainCompleted,
                format!(
                    "Domain '{}' attempt {} returned: {}",
                    domain,
                    attempt,
                    excerpt(&result.summary)
                ),
            ),
        )
        .await?;

        // Latest attempt wins; earlier results for this domain are gone
        run.domain_results.insert(domain.to_string(), result);
        Ok(())
    }

    /// Evaluate a domain's latest result and apply the retry policy
    async fn evaluate_domain(
        &self,
        run: &mut Run,
        store: &Option<CheckpointStore>,
        domain: &str,
    ) -> Result<()> {
        let runtime = self.runtime(domain)?;
        let result = run
            .domain_results
            .get(domain)
            .with_context(|| format!("No result recorded for domain '{}'", domain))?
            .clone();

        let retry_count = run.retry_count(domain);

        self.append(
            run,
            store,
            Event::new(
                run.id,
                Some(domain.to_string()),
                None,
                EventKind::EvaluationStarted,
                format!(
                    "Evaluating domain '{}' (retry count {}/{})",
                    domain, retry_count, self.max_retries
                ),
            ),
        )
        .await?;

        let review = ReviewRequest {
            domain,
            request: &run.request,
            result: &result,
            criteria: &runtime.criteria,
            retry_count,
            max_retries: self.max_retries,
        };

        // An evaluator error is treated exactly like an unparseable
        // judgment: it can delay approval but never grant it. The error
        // text is never fed to the verdict parser.
        let (judgment, verdict) = match self.evaluator.review(&review).await {
            Ok(text) => {
                let verdict = Verdict::parse(&text);
                (text, verdict)
            }
            Err(err) => {
                warn!(domain = %domain, error = %err, "Evaluator call failed");
                (format!("[evaluator call failed: {}]", err), None)
            }
        };
        let decision = decide(verdict, retry_count, self.max_retries);

        if decision.ambiguous {
            self.append(
                run,
                store,
                Event::new(
                    run.id,
                    Some(domain.to_string()),
                    None,
                    EventKind::VerdictUnparsed,
                    format!("No verdict token in judgment: {}", excerpt(&judgment)),
                ),
            )
            .await?;
        }

        match decision.action {
            Action::Advance => {
                debug!(domain = %domain, "Domain approved");
                self.append(
                    run,
                    store,
                    Event::new(
                        run.id,
                        Some(domain.to_string()),
                        None,
                        EventKind::DomainApproved,
                        format!("Domain '{}' approved: {}", domain, excerpt(&judgment)),
                    ),
                )
                .await?;
            }
            Action::Retry => {
                // The RetryScheduled event increments the counter when
                // applied, so the message reflects the consumed retry.
                self.append(
                    run,
                    store,
                    Event::new(
                        run.id,
                        Some(domain.to_string()),
                        None,
                        EventKind::RetryScheduled,
                        format!(
                            "Domain '{}' retry {}/{}: {}",
                            domain,
                            retry_count + 1,
                            self.max_retries,
                            excerpt(&judgment)
                        ),
                    ),
                )
                .await?;

                // A re-run is dispatched like any other run of the domain,
                // so the log carries one dispatch entry per attempt
                self.dispatch_domain(run, store, domain).await?;
            }
            Action::Fail => {
                let reason = if decision.budget_exhausted {
                    format!(
                        "retry budget exhausted ({}/{} retries used)",
                        retry_count, self.max_retries
                    )
                } else {
                    "the result was judged unrecoverable".to_string()
                };

                let report = format!(
                    "Run failed in domain '{}': {}.\n\nJudgment:\n{}\n\nLast attempt:\n{}",
                    domain, reason, judgment, result.summary
                );

                self.append(
                    run,
                    store,
                    Event::new(
                        run.id,
                        Some(domain.to_string()),
                        None,
                        EventKind::RunFailed,
                        report,
                    ),
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Append an event: persist it, stream it, then apply it to the run
    async fn append(
        &self,
        run: &mut Run,
        store: &Option<CheckpointStore>,
        event: Event,
    ) -> Result<()> {
        if let Some(store) = store {
            store.append(&event).await?;
        }
        if let Some(tx) = &self.event_tx {
            // A dropped receiver must never abort the run
            let _ = tx.send(event.clone());
        }

        debug!(kind = ?event.kind, message = %event.message, "Event recorded");
        run.record(event);
        Ok(())
    }

    fn runtime(&self, domain: &str) -> Result<&DomainRuntime> {
        self.domains
            .iter()
            .find(|d| d.name == domain)
            .with_context(|| format!("Unknown domain '{}'", domain))
    }

    /// The domain after `approved` in the configured order, if any
    fn next_domain(&self, approved: &str) -> Option<&str> {
        let index = self.domains.iter().position(|d| d.name == approved)?;
        self.domains.get(index + 1).map(|d| d.name.as_str())
    }

    /// Summaries of domains ahead of `current` in the configured order,
    /// used as the hand-off context for the next pipeline
    fn prior_results(&self, run: &Run, current: &str) -> Vec<(String, String)> {
        self.domains
            .iter()
            .take_while(|d| d.name != current)
            .filter_map(|d| {
                run.domain_results
                    .get(&d.name)
                    .map(|r| (d.name.clone(), r.summary.clone()))
            })
            .collect()
    }

    /// Terminal success report: every approved domain's summary in order
    fn success_report(&self, run: &Run) -> String {
        let mut report = format!("Run of plan '{}' succeeded.\n", self.plan_name);

        for domain in &self.domains {
            if let Some(result) = run.domain_results.get(&domain.name) {
                report.push_str(&format!("\n## Domain '{}'\n{}\n", domain.name, result.summary));
            }
        }

        report
    }
}
