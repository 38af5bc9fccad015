use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use pagekeeper_workflow::{
    DefaultWorkflowEngine, Step, StepAction, StepInput, WorkflowDefinition, WorkflowEngine,
    WorkflowError, WorkflowPolicy,
};

fn recording_step(name: &str, log: Arc<parking_lot::Mutex<Vec<String>>>) -> Step {
    let label = name.to_string();
    Step::new(
        name,
        StepAction::from_fn(move |_| {
            log.lock().push(label.clone());
            Ok(Value::Null)
        }),
    )
}

fn sleeping_step(name: &str, millis: u64, done: Arc<AtomicBool>) -> Step {
    Step::new(
        name,
        StepAction::from_async(move |_| {
            let done = Arc::clone(&done);
            async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                done.store(true, Ordering::SeqCst);
                Ok(json!(millis))
            }
        }),
    )
}

#[tokio::test]
async fn steps_run_in_declaration_order() {
    let engine = DefaultWorkflowEngine::default();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let def = WorkflowDefinition::new("Ordered", "three steps")
        .step(recording_step("first", log.clone()))
        .step(recording_step("second", log.clone()))
        .step(recording_step("third", log.clone()));
    engine.add_workflow("ordered", def);

    let report = engine.start_workflow("ordered", None).await.unwrap();
    assert!(report.success);
    assert_eq!(report.step_names(), vec!["first", "second", "third"]);
    assert_eq!(*log.lock(), vec!["first", "second", "third"]);

    let status = engine.status();
    assert!(!status.running);
    assert_eq!(status.step_index, 0);
    assert_eq!(status.workflows, vec!["ordered".to_string()]);

    let history = engine.history();
    assert_eq!(history[0].run_count, 1);
    assert!(history[0].last_run.is_some());
}

#[tokio::test(start_paused = true)]
async fn slow_step_times_out_and_aborts_the_run() {
    let engine = DefaultWorkflowEngine::default();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let never = Arc::new(AtomicBool::new(false));
    let def = WorkflowDefinition::new("Slow", "times out")
        .step(sleeping_step("hang", 60_000, never.clone()).with_timeout_ms(100))
        .step(recording_step("after", log.clone()));
    engine.add_workflow("slow", def);

    let err = engine.start_workflow("slow", None).await.unwrap_err();
    assert_eq!(
        err,
        WorkflowError::StepTimeout {
            step: "hang".into(),
            timeout_ms: 100
        }
    );
    assert!(log.lock().is_empty());
    assert!(!engine.status().running);
}

#[tokio::test(start_paused = true)]
async fn unset_timeout_uses_engine_default() {
    let engine = DefaultWorkflowEngine::new(WorkflowPolicy {
        default_step_timeout_ms: 250,
        ..WorkflowPolicy::default()
    });
    let flag = Arc::new(AtomicBool::new(false));
    engine.add_workflow(
        "slow",
        WorkflowDefinition::new("Slow", "").step(sleeping_step("wait", 1_000, flag)),
    );
    assert!(matches!(
        engine.start_workflow("slow", None).await,
        Err(WorkflowError::StepTimeout { timeout_ms: 250, .. })
    ));
}

#[tokio::test]
async fn failing_step_reports_reason_and_stops() {
    let engine = DefaultWorkflowEngine::default();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let def = WorkflowDefinition::new("Broken", "")
        .step(Step::new(
            "explode",
            StepAction::from_fn(|_| anyhow::bail!("form not found")),
        ))
        .step(recording_step("never", log.clone()));
    engine.add_workflow("broken", def);

    let err = engine.start_workflow("broken", None).await.unwrap_err();
    assert_eq!(
        err,
        WorkflowError::StepFailed {
            step: "explode".into(),
            reason: "form not found".into()
        }
    );
    assert_eq!(err.step(), Some("explode"));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn unknown_workflow_is_rejected_without_side_effects() {
    let engine = DefaultWorkflowEngine::default();
    engine.add_workflow("known", WorkflowDefinition::new("Known", ""));
    assert_eq!(
        engine.start_workflow("missing", None).await.unwrap_err(),
        WorkflowError::NotFound("missing".into())
    );
    assert_eq!(engine.history()[0].run_count, 0);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_running() {
    let engine = Arc::new(DefaultWorkflowEngine::default());
    let done = Arc::new(AtomicBool::new(false));
    engine.add_workflow(
        "slow",
        WorkflowDefinition::new("Slow", "").step(sleeping_step("wait", 500, done.clone())),
    );

    let runner = Arc::clone(&engine);
    let run = tokio::spawn(async move { runner.start_workflow("slow", None).await });
    tokio::task::yield_now().await;

    let status = engine.status();
    assert!(status.running);
    assert_eq!(status.current_workflow.as_deref(), Some("Slow"));
    assert_eq!(status.total_steps, 1);
    assert_eq!(
        engine.start_workflow("slow", None).await.unwrap_err(),
        WorkflowError::AlreadyRunning
    );

    assert!(run.await.unwrap().is_ok());
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(engine.history()[0].run_count, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_is_advisory_by_default() {
    let engine = Arc::new(DefaultWorkflowEngine::default());
    let first_done = Arc::new(AtomicBool::new(false));
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    engine.add_workflow(
        "two",
        WorkflowDefinition::new("Two", "")
            .step(sleeping_step("wait", 200, first_done.clone()))
            .step(recording_step("second", log.clone())),
    );
    engine.add_workflow("other", WorkflowDefinition::new("Other", ""));

    let runner = Arc::clone(&engine);
    let run = tokio::spawn(async move { runner.start_workflow("two", None).await });
    tokio::task::yield_now().await;

    assert!(engine.stop_workflow());
    assert!(!engine.status().running);
    assert!(!engine.stop_workflow());
    // Run state is already clear, so another workflow may start.
    assert!(engine.start_workflow("other", None).await.is_ok());

    assert_eq!(run.await.unwrap().unwrap_err(), WorkflowError::Stopped);
    assert!(first_done.load(Ordering::SeqCst));
    assert!(log.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_during_final_step_ends_run_as_stopped() {
    let engine = Arc::new(DefaultWorkflowEngine::default());
    let done = Arc::new(AtomicBool::new(false));
    engine.add_workflow(
        "single",
        WorkflowDefinition::new("Single", "").step(sleeping_step("wait", 100, done.clone())),
    );

    let runner = Arc::clone(&engine);
    let run = tokio::spawn(async move { runner.start_workflow("single", None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(engine.stop_workflow());

    assert_eq!(run.await.unwrap().unwrap_err(), WorkflowError::Stopped);
    // The advisory stop lets the step itself finish.
    assert!(done.load(Ordering::SeqCst));
    assert!(!engine.status().running);
}

#[tokio::test(start_paused = true)]
async fn hard_cancellation_aborts_the_in_flight_step() {
    let engine = Arc::new(DefaultWorkflowEngine::new(WorkflowPolicy {
        cancel_in_flight_on_stop: true,
        ..WorkflowPolicy::default()
    }));
    let done = Arc::new(AtomicBool::new(false));
    engine.add_workflow(
        "slow",
        WorkflowDefinition::new("Slow", "").step(sleeping_step("wait", 5_000, done.clone())),
    );

    let runner = Arc::clone(&engine);
    let run = tokio::spawn(async move { runner.start_workflow("slow", None).await });
    tokio::task::yield_now().await;
    assert!(engine.stop_workflow());

    assert_eq!(run.await.unwrap().unwrap_err(), WorkflowError::Stopped);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!done.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn step_sees_cancellation_token_on_stop() {
    let engine = Arc::new(DefaultWorkflowEngine::new(WorkflowPolicy {
        cancel_in_flight_on_stop: true,
        ..WorkflowPolicy::default()
    }));
    let observed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&observed);
    engine.add_workflow(
        "watch",
        WorkflowDefinition::new("Watch", "").step(Step::new(
            "wait_for_cancel",
            StepAction::from_async(move |input: StepInput| {
                let seen = Arc::clone(&seen);
                async move {
                    input.cancel.cancelled().await;
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        )),
    );
    let runner = Arc::clone(&engine);
    let run = tokio::spawn(async move { runner.start_workflow("watch", None).await });
    tokio::task::yield_now().await;
    engine.stop_workflow();
    assert_eq!(run.await.unwrap().unwrap_err(), WorkflowError::Stopped);
}

#[tokio::test(start_paused = true)]
async fn pause_blocks_before_next_step_when_enabled() {
    let engine = Arc::new(DefaultWorkflowEngine::new(WorkflowPolicy {
        pause_checkpoints: true,
        ..WorkflowPolicy::default()
    }));
    let first = Arc::new(AtomicBool::new(false));
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    engine.add_workflow(
        "two",
        WorkflowDefinition::new("Two", "")
            .step(sleeping_step("wait", 100, first.clone()))
            .step(recording_step("second", log.clone())),
    );

    let runner = Arc::clone(&engine);
    let run = tokio::spawn(async move { runner.start_workflow("two", None).await });
    tokio::task::yield_now().await;
    assert!(engine.pause_workflow());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(first.load(Ordering::SeqCst));
    assert!(log.lock().is_empty());
    assert!(engine.status().running);

    assert!(engine.resume_workflow());
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.step_names(), vec!["wait", "second"]);
}

#[tokio::test]
async fn pause_is_a_no_op_without_checkpoints() {
    let engine = DefaultWorkflowEngine::default();
    assert!(!engine.pause_workflow());
    assert!(!engine.resume_workflow());
}

#[tokio::test]
async fn re_registering_replaces_definition_in_place() {
    let engine = DefaultWorkflowEngine::default();
    engine.add_workflow("a", WorkflowDefinition::new("A", ""));
    engine.add_workflow("b", WorkflowDefinition::new("B", ""));
    engine.add_workflow("a", WorkflowDefinition::new("A2", "replacement"));

    let names: Vec<String> = engine.history().into_iter().map(|h| h.name).collect();
    assert_eq!(names, vec!["A2", "B"]);
    assert_eq!(engine.definition("a").unwrap().description, "replacement");
    assert!(engine.definition("zzz").is_none());
}

#[tokio::test]
async fn failed_second_step_resets_state_and_counts_one_run() {
    let engine = DefaultWorkflowEngine::default();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    engine.add_workflow(
        "w1",
        WorkflowDefinition::new("w1", "")
            .step(Step::new("s1", StepAction::from_fn(|_| Ok(json!(1)))).with_timeout_ms(1_000))
            .step(
                Step::new("s2", StepAction::from_fn(|_| anyhow::bail!("boom")))
                    .with_timeout_ms(1_000),
            )
            .step(Step::new(
                "s3",
                StepAction::from_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
            )),
    );

    let err = engine.start_workflow("w1", None).await.unwrap_err();
    assert_eq!(err.step(), Some("s2"));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let status = engine.status();
    assert!(status.current_workflow.is_none());
    assert!(!status.running);
    let history = engine.history();
    assert_eq!(history[0].id, "w1");
    assert_eq!(history[0].run_count, 1);
}
