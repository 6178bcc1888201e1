//! Checkpoint and Resume Integration Tests
//!
//! A checkpointed run leaves an append-only event log plus result
//! snapshots on disk; replaying them reconstructs the exact routing
//! state, and resume continues from the last recorded target without
//! re-running approved domains.

use std::sync::Arc;
use std::time::Duration;

use steward::core::{
    CheckpointStore, DomainRuntime, Orchestrator, StageBinding, StagePipeline, WorkerEvaluator,
};
use steward::domain::{Event, EventKind, RunStatus, Target};
use steward::workers::ScriptedWorker;
use steward::Evaluator;
use tempfile::TempDir;
use uuid::Uuid;

fn domain(name: &str, output: &str) -> DomainRuntime {
    DomainRuntime {
        name: name.to_string(),
        pipeline: StagePipeline::new(
            name,
            vec![StageBinding {
                name: format!("{}-stage", name),
                worker: Arc::new(ScriptedWorker::always(name, output)),
                instruction: None,
                timeout: Duration::from_secs(5),
            }],
        ),
        criteria: Vec::new(),
    }
}

fn judge(replies: Vec<&str>) -> Arc<dyn Evaluator> {
    let script = replies.into_iter().map(|r| Ok(r.to_string())).collect();
    Arc::new(WorkerEvaluator::new(Arc::new(ScriptedWorker::new(
        "judge", script,
    ))))
}

#[tokio::test]
async fn test_replay_reconstructs_finished_run() {
    let temp = TempDir::new().unwrap();

    let orchestrator = Orchestrator::new(
        "codegen",
        vec![domain("testcase", "cases"), domain("generate", "code")],
        judge(vec!["RETRY: thin", "APPROVED", "APPROVED"]),
        2,
    )
    .unwrap()
    .with_checkpoint_base(temp.path());

    let live = orchestrator.run("automate COMMONR-198").await.unwrap();
    assert_eq!(live.status, RunStatus::Succeeded);

    let store = CheckpointStore::open_in(temp.path(), live.id).await.unwrap();
    let replayed = store.load_run().await.unwrap().unwrap();

    assert_eq!(replayed.id, live.id);
    assert_eq!(replayed.plan_name, "codegen");
    assert_eq!(replayed.request, "automate COMMONR-198");
    assert_eq!(replayed.status, live.status);
    assert_eq!(replayed.target, Target::Done);
    assert_eq!(replayed.retry_count("testcase"), 1);
    assert_eq!(replayed.final_output, live.final_output);
    assert_eq!(replayed.events.len(), live.events.len());

    // Result snapshots reflect the latest attempt per domain
    assert_eq!(replayed.domain_results["testcase"].attempt, 2);
    assert_eq!(replayed.domain_results["generate"].attempt, 1);
}

#[tokio::test]
async fn test_event_log_is_append_only_and_ordered() {
    let temp = TempDir::new().unwrap();

    let orchestrator = Orchestrator::new(
        "codegen",
        vec![domain("testcase", "cases")],
        judge(vec!["APPROVED"]),
        2,
    )
    .unwrap()
    .with_checkpoint_base(temp.path());

    let run = orchestrator.run("req").await.unwrap();

    let store = CheckpointStore::open_in(temp.path(), run.id).await.unwrap();
    let events = store.replay().await.unwrap();

    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::RunStarted,
            EventKind::DomainStarted,
            EventKind::StageStarted,
            EventKind::StageCompleted,
            EventKind::DomainCompleted,
            EventKind::EvaluationStarted,
            EventKind::DomainApproved,
            EventKind::RunSucceeded,
        ]
    );

    // Timestamps never go backwards
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[tokio::test]
async fn test_resume_continues_from_approved_domain() {
    let temp = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();

    // Hand-build a checkpoint for a run interrupted right after the
    // first domain's approval, before the next dispatch was recorded.
    let store = CheckpointStore::open_in(temp.path(), run_id).await.unwrap();
    store.save_header("codegen", "automate COMMONR-198").await.unwrap();

    let testcase_result = {
        let pipeline = StagePipeline::new(
            "testcase",
            vec![StageBinding {
                name: "testcase-stage".to_string(),
                worker: Arc::new(ScriptedWorker::always("testcase", "found 3 cases")),
                instruction: None,
                timeout: Duration::from_secs(5),
            }],
        );
        let input = steward::core::PipelineInput {
            run_id,
            request: "automate COMMONR-198".to_string(),
            prior_results: Vec::new(),
            attempt: 1,
        };
        pipeline.run(&input).await.result
    };
    store.save_result(&testcase_result).await.unwrap();

    for event in [
        Event::new(run_id, None, None, EventKind::RunStarted, "started"),
        Event::new(
            run_id,
            Some("testcase".to_string()),
            None,
            EventKind::DomainStarted,
            "dispatched",
        ),
        Event::new(
            run_id,
            Some("testcase".to_string()),
            None,
            EventKind::DomainCompleted,
            "returned",
        ),
        Event::new(
            run_id,
            Some("testcase".to_string()),
            None,
            EventKind::DomainApproved,
            "approved",
        ),
    ] {
        store.append(&event).await.unwrap();
    }

    let orchestrator = Orchestrator::new(
        "codegen",
        vec![domain("testcase", "cases"), domain("generate", "code")],
        judge(vec!["APPROVED"]),
        2,
    )
    .unwrap()
    .with_checkpoint_base(temp.path());

    let run = orchestrator.resume(run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    // The approved domain was not re-run
    assert_eq!(run.executions("testcase"), 1);
    assert_eq!(run.executions("generate"), 1);

    // The approved domain's snapshot fed the final report
    let output = run.final_output.unwrap();
    assert!(output.contains("## Domain 'testcase'"));
    assert!(output.contains("found 3 cases"));
}

#[tokio::test]
async fn test_resume_of_finished_run_is_a_no_op() {
    let temp = TempDir::new().unwrap();

    let orchestrator = Orchestrator::new(
        "codegen",
        vec![domain("testcase", "cases")],
        judge(vec!["APPROVED"]),
        2,
    )
    .unwrap()
    .with_checkpoint_base(temp.path());

    let first = orchestrator.run("req").await.unwrap();
    let resumed = orchestrator.resume(first.id).await.unwrap();

    assert_eq!(resumed.status, first.status);
    assert_eq!(resumed.events.len(), first.events.len());

    // No new events were appended on disk
    let store = CheckpointStore::open_in(temp.path(), first.id).await.unwrap();
    assert_eq!(store.replay().await.unwrap().len(), first.events.len());
}

#[tokio::test]
async fn test_resume_without_checkpoint_fails() {
    let temp = TempDir::new().unwrap();

    let orchestrator = Orchestrator::new(
        "codegen",
        vec![domain("testcase", "cases")],
        judge(vec!["APPROVED"]),
        2,
    )
    .unwrap()
    .with_checkpoint_base(temp.path());

    let err = orchestrator.resume(Uuid::new_v4()).await.unwrap_err();
    assert!(err.to_string().contains("No checkpoint"));
}

#[tokio::test]
async fn test_live_event_stream_matches_recorded_log() {
    let temp = TempDir::new().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let orchestrator = Orchestrator::new(
        "codegen",
        vec![domain("testcase", "cases")],
        judge(vec!["APPROVED"]),
        2,
    )
    .unwrap()
    .with_checkpoint_base(temp.path())
    .with_event_stream(tx);

    let run = orchestrator.run("req").await.unwrap();

    let mut streamed: Vec<Event> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        streamed.push(event);
    }

    assert_eq!(streamed.len(), run.events.len());
    for (streamed, recorded) in streamed.iter().zip(run.events.iter()) {
        assert_eq!(streamed.id, recorded.id);
        assert_eq!(streamed.kind, recorded.kind);
    }
}
