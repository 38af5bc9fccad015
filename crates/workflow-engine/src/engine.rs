//! Workflow engine implementation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pagekeeper_core_types::AutomationTask;

use crate::errors::WorkflowError;
use crate::policy::WorkflowPolicy;
use crate::types::*;

/// Runs registered workflows one at a time.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Registers `definition` under `id`, replacing any previous entry.
    fn add_workflow(&self, id: &str, definition: WorkflowDefinition);

    /// Runs every step in order, stopping at the first failure.
    async fn start_workflow(
        &self,
        id: &str,
        task: Option<Arc<AutomationTask>>,
    ) -> Result<WorkflowReport, WorkflowError>;

    /// Clears run state and asks the run to stop before its next step.
    fn stop_workflow(&self) -> bool;

    fn pause_workflow(&self) -> bool;

    fn resume_workflow(&self) -> bool;

    fn status(&self) -> WorkflowStatus;

    fn history(&self) -> Vec<WorkflowHistoryEntry>;

    fn definition(&self, id: &str) -> Option<WorkflowInfo>;

    fn workflows(&self) -> Vec<WorkflowInfo>;
}

struct RunState {
    workflow_id: String,
    workflow_name: String,
    step_index: usize,
    total_steps: usize,
    generation: u64,
    stop: CancellationToken,
}

#[derive(Default)]
struct EngineState {
    workflows: Vec<Workflow>,
    run: Option<RunState>,
    generation: u64,
}

/// Default workflow engine implementation
pub struct DefaultWorkflowEngine {
    policy: WorkflowPolicy,
    state: Mutex<EngineState>,
    paused: watch::Sender<bool>,
}

impl DefaultWorkflowEngine {
    pub fn new(policy: WorkflowPolicy) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            policy,
            state: Mutex::new(EngineState::default()),
            paused,
        }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// Single-flight admission. Checks and claims the engine under one lock.
    fn admit(&self, id: &str) -> Result<(WorkflowDefinition, u64, CancellationToken), WorkflowError> {
        let mut state = self.state.lock();
        if state.run.is_some() {
            return Err(WorkflowError::AlreadyRunning);
        }
        let workflow = state
            .workflows
            .iter_mut()
            .find(|wf| wf.id == id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        workflow.run_count += 1;
        workflow.last_run = Some(Utc::now());
        let definition = workflow.definition.clone();

        state.generation += 1;
        let generation = state.generation;
        let stop = CancellationToken::new();
        state.run = Some(RunState {
            workflow_id: id.to_string(),
            workflow_name: definition.name.clone(),
            step_index: 0,
            total_steps: definition.steps.len(),
            generation,
            stop: stop.clone(),
        });
        Ok((definition, generation, stop))
    }

    fn set_step_index(&self, generation: u64, index: usize) {
        if let Some(run) = self.state.lock().run.as_mut() {
            if run.generation == generation {
                run.step_index = index;
            }
        }
    }

    /// Releases the engine unless a stop already did.
    fn finish_run(&self, generation: u64) {
        let mut state = self.state.lock();
        if state
            .run
            .as_ref()
            .is_some_and(|run| run.generation == generation)
        {
            state.run = None;
            self.paused.send_replace(false);
        }
    }

    async fn run_steps(
        &self,
        definition: &WorkflowDefinition,
        task: Option<Arc<AutomationTask>>,
        generation: u64,
        stop: &CancellationToken,
        report: &mut WorkflowReport,
    ) -> Result<(), WorkflowError> {
        let total = definition.steps.len();
        for (index, step) in definition.steps.iter().enumerate() {
            if self.policy.pause_checkpoints {
                self.wait_while_paused(stop).await;
            }
            if stop.is_cancelled() {
                info!(step = %step.name, "workflow stopped before step");
                return Err(WorkflowError::Stopped);
            }
            self.set_step_index(generation, index);
            info!("Executing step {}/{}: {}", index + 1, total, step.name);

            let mut result = StepResult::new(step.name.clone());
            match self.execute_step(step, task.clone(), stop).await {
                Ok(output) => {
                    debug!(step = %step.name, "step completed");
                    result = result.with_output(output);
                    report.push_step(result.finish());
                }
                Err(err) => {
                    warn!(step = %step.name, error = %err, "step failed");
                    result = result.with_error(err.to_string());
                    report.push_step(result.finish());
                    return Err(err);
                }
            }
        }
        // A stop that landed during the last step still ends the run as stopped.
        if stop.is_cancelled() {
            info!(workflow = %definition.name, "workflow stopped during final step");
            return Err(WorkflowError::Stopped);
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &Step,
        task: Option<Arc<AutomationTask>>,
        stop: &CancellationToken,
    ) -> Result<serde_json::Value, WorkflowError> {
        let timeout_ms = step.timeout_ms.unwrap_or(self.policy.default_step_timeout_ms);
        let hard_cancel = self.policy.cancel_in_flight_on_stop;
        let cancel = if hard_cancel {
            stop.child_token()
        } else {
            CancellationToken::new()
        };
        let input = StepInput {
            task,
            cancel: cancel.clone(),
        };
        let action = step.action.clone();
        let mut handle = tokio::spawn(async move { action.call(input).await });

        let joined = if hard_cancel {
            tokio::select! {
                joined = timeout(Duration::from_millis(timeout_ms), &mut handle) => joined,
                _ = stop.cancelled() => {
                    handle.abort();
                    debug!(step = %step.name, "in-flight step aborted by stop");
                    return Err(WorkflowError::Stopped);
                }
            }
        } else {
            timeout(Duration::from_millis(timeout_ms), &mut handle).await
        };

        match joined {
            Err(_elapsed) => {
                // The spawned action is left to finish on its own; its result is dropped.
                cancel.cancel();
                Err(WorkflowError::StepTimeout {
                    step: step.name.clone(),
                    timeout_ms,
                })
            }
            Ok(Err(join_err)) => Err(WorkflowError::StepFailed {
                step: step.name.clone(),
                reason: join_err.to_string(),
            }),
            Ok(Ok(Err(err))) => Err(WorkflowError::StepFailed {
                step: step.name.clone(),
                reason: format!("{err:#}"),
            }),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }

    async fn wait_while_paused(&self, stop: &CancellationToken) {
        let mut paused = self.paused.subscribe();
        loop {
            if !*paused.borrow_and_update() {
                return;
            }
            debug!("workflow paused at checkpoint");
            tokio::select! {
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = stop.cancelled() => return,
            }
        }
    }
}

impl Default for DefaultWorkflowEngine {
    fn default() -> Self {
        Self::new(WorkflowPolicy::default())
    }
}

#[async_trait]
impl WorkflowEngine for DefaultWorkflowEngine {
    fn add_workflow(&self, id: &str, definition: WorkflowDefinition) {
        let mut state = self.state.lock();
        let workflow = Workflow::new(id, definition);
        match state.workflows.iter_mut().find(|wf| wf.id == id) {
            Some(existing) => {
                debug!(workflow = %id, "workflow replaced");
                *existing = workflow;
            }
            None => {
                debug!(workflow = %id, "workflow registered");
                state.workflows.push(workflow);
            }
        }
    }

    async fn start_workflow(
        &self,
        id: &str,
        task: Option<Arc<AutomationTask>>,
    ) -> Result<WorkflowReport, WorkflowError> {
        let (definition, generation, stop) = match self.admit(id) {
            Ok(admitted) => admitted,
            Err(err) => {
                warn!(workflow = %id, error = %err, "workflow rejected");
                return Err(err);
            }
        };
        info!(workflow = %id, steps = definition.steps.len(), "Starting workflow");

        let mut report = WorkflowReport::new(id.to_string(), definition.name.clone());
        let outcome = self
            .run_steps(&definition, task, generation, &stop, &mut report)
            .await;
        self.finish_run(generation);

        match outcome {
            Ok(()) => {
                let report = report.with_success().finish();
                info!(workflow = %id, latency_ms = report.latency_ms, "Workflow completed");
                Ok(report)
            }
            Err(err) => {
                warn!(workflow = %id, error = %err, "Workflow failed");
                Err(err)
            }
        }
    }

    fn stop_workflow(&self) -> bool {
        let run = self.state.lock().run.take();
        match run {
            Some(run) => {
                info!(workflow = %run.workflow_id, step = run.step_index, "Stopping workflow");
                run.stop.cancel();
                self.paused.send_replace(false);
                true
            }
            None => {
                warn!("no workflow is currently running");
                false
            }
        }
    }

    fn pause_workflow(&self) -> bool {
        if self.state.lock().run.is_none() {
            warn!("no workflow is currently running");
            return false;
        }
        if !self.policy.pause_checkpoints {
            debug!("pause requested but checkpoints are disabled");
            return false;
        }
        info!("Pausing workflow");
        self.paused.send_replace(true);
        true
    }

    fn resume_workflow(&self) -> bool {
        if !self.policy.pause_checkpoints {
            debug!("resume requested but checkpoints are disabled");
            return false;
        }
        let was_paused = self.paused.send_replace(false);
        if was_paused {
            info!("Resuming workflow");
        }
        was_paused
    }

    fn status(&self) -> WorkflowStatus {
        let state = self.state.lock();
        let workflows = state.workflows.iter().map(|wf| wf.id.clone()).collect();
        match &state.run {
            Some(run) => WorkflowStatus {
                running: true,
                current_workflow: Some(run.workflow_name.clone()),
                step_index: run.step_index,
                total_steps: run.total_steps,
                workflows,
            },
            None => WorkflowStatus {
                workflows,
                ..WorkflowStatus::default()
            },
        }
    }

    fn history(&self) -> Vec<WorkflowHistoryEntry> {
        self.state
            .lock()
            .workflows
            .iter()
            .map(|wf| WorkflowHistoryEntry {
                id: wf.id.clone(),
                name: wf.definition.name.clone(),
                last_run: wf.last_run,
                run_count: wf.run_count,
            })
            .collect()
    }

    fn definition(&self, id: &str) -> Option<WorkflowInfo> {
        self.state
            .lock()
            .workflows
            .iter()
            .find(|wf| wf.id == id)
            .map(|wf| wf.info(self.policy.default_step_timeout_ms))
    }

    fn workflows(&self) -> Vec<WorkflowInfo> {
        self.state
            .lock()
            .workflows
            .iter()
            .map(|wf| wf.info(self.policy.default_step_timeout_ms))
            .collect()
    }
}
