//! Degraded Pipeline Integration Tests
//!
//! Worker failures inside a stage pipeline must never crash the run: the
//! pipeline continues through its remaining stages, the degraded result
//! reaches the evaluator, and the evaluation gate decides what happens.

use std::sync::Arc;
use std::time::Duration;

use steward::core::{DomainRuntime, Orchestrator, StageBinding, StagePipeline, WorkerEvaluator};
use steward::domain::{EventKind, FailureKind, RunStatus};
use steward::workers::{ScriptedWorker, WorkerError};
use steward::Evaluator;

fn binding(name: &str, worker: ScriptedWorker) -> StageBinding {
    StageBinding {
        name: name.to_string(),
        worker: Arc::new(worker),
        instruction: None,
        timeout: Duration::from_secs(5),
    }
}

fn judge(replies: Vec<&str>) -> Arc<dyn Evaluator> {
    let script = replies.into_iter().map(|r| Ok(r.to_string())).collect();
    Arc::new(WorkerEvaluator::new(Arc::new(ScriptedWorker::new(
        "judge", script,
    ))))
}

#[tokio::test]
async fn test_failed_stage_still_reaches_evaluation() {
    let runtime = DomainRuntime {
        name: "resource".to_string(),
        pipeline: StagePipeline::new(
            "resource",
            vec![
                binding(
                    "find",
                    ScriptedWorker::failing(
                        "find",
                        WorkerError::Failed {
                            worker: "find".to_string(),
                            reason: "backend unavailable".to_string(),
                        },
                    ),
                ),
                binding("search", ScriptedWorker::always("search", "partial results")),
            ],
        ),
        criteria: Vec::new(),
    };

    let orchestrator =
        Orchestrator::new("plan", vec![runtime], judge(vec!["APPROVED"]), 2).unwrap();

    let run = orchestrator.run("req").await.unwrap();

    // The evaluation still happened and could approve the degraded result
    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run
        .events
        .iter()
        .any(|e| e.kind == EventKind::EvaluationStarted));
    assert!(run.events.iter().any(|e| e.kind == EventKind::StageFailed));

    let result = &run.domain_results["resource"];
    assert_eq!(result.stages.len(), 2);
    assert!(!result.stages[0].success);
    assert!(result.stages[1].success);
    assert!(result.summary.contains("1/2 stages succeeded"));
}

#[tokio::test]
async fn test_fully_degraded_domain_can_be_failed_by_the_gate() {
    let runtime = DomainRuntime {
        name: "resource".to_string(),
        pipeline: StagePipeline::new(
            "resource",
            vec![binding(
                "find",
                ScriptedWorker::failing(
                    "find",
                    WorkerError::Failed {
                        worker: "find".to_string(),
                        reason: "boom".to_string(),
                    },
                ),
            )],
        ),
        criteria: Vec::new(),
    };

    let orchestrator = Orchestrator::new("plan", vec![runtime], judge(vec!["FAILED"]), 2).unwrap();

    let run = orchestrator.run("req").await.unwrap();

    assert_eq!(
        run.status,
        RunStatus::Failed {
            domain: Some("resource".to_string())
        }
    );

    // The degraded stage output carries a bracketed failure note that the
    // failure report surfaces
    let output = run.final_output.unwrap();
    assert!(output.contains("produced no output"));
}

#[tokio::test]
async fn test_cancelled_worker_records_distinct_failure_kind() {
    let runtime = DomainRuntime {
        name: "generate".to_string(),
        pipeline: StagePipeline::new(
            "generate",
            vec![binding(
                "generate",
                ScriptedWorker::failing(
                    "generate",
                    WorkerError::Cancelled {
                        worker: "generate".to_string(),
                    },
                ),
            )],
        ),
        criteria: Vec::new(),
    };

    let orchestrator =
        Orchestrator::new("plan", vec![runtime], judge(vec!["RETRY"]), 1).unwrap();

    let run = orchestrator.run("req").await.unwrap();

    let result = &run.domain_results["generate"];
    assert_eq!(result.stages[0].failure, Some(FailureKind::Cancelled));
    // RETRY with a 1-retry budget: one re-run, then coerced to failure
    assert_eq!(run.executions("generate"), 2);
    assert!(run.is_finished());
}

#[tokio::test]
async fn test_retry_after_degraded_attempt_can_recover() {
    // First attempt fails, the re-run succeeds
    let flaky = ScriptedWorker::new(
        "find",
        vec![
            Err(WorkerError::Failed {
                worker: "find".to_string(),
                reason: "transient".to_string(),
            }),
            Ok("found handlers".to_string()),
        ],
    );

    let runtime = DomainRuntime {
        name: "resource".to_string(),
        pipeline: StagePipeline::new("resource", vec![binding("find", flaky)]),
        criteria: Vec::new(),
    };

    let orchestrator = Orchestrator::new(
        "plan",
        vec![runtime],
        judge(vec!["RETRY: nothing found", "APPROVED"]),
        2,
    )
    .unwrap();

    let run = orchestrator.run("req").await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.executions("resource"), 2);

    // Latest attempt wins in the recorded results
    let result = &run.domain_results["resource"];
    assert_eq!(result.attempt, 2);
    assert!(result.is_clean());
    assert_eq!(result.final_output(), "found handlers");
}
