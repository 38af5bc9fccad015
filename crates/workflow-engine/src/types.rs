//! Workflow definitions, run reports and status views

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use pagekeeper_core_types::AutomationTask;

/// Input handed to every step action.
#[derive(Clone, Debug)]
pub struct StepInput {
    /// Payload the run was started with.
    pub task: Option<Arc<AutomationTask>>,
    /// Fires on timeout, and on stop when hard cancellation is enabled.
    pub cancel: CancellationToken,
}

type ActionFn = dyn Fn(StepInput) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// Unit of work behind a step. Cheap to clone.
#[derive(Clone)]
pub struct StepAction(Arc<ActionFn>);

impl StepAction {
    /// Wraps a synchronous closure. It runs on the step's own task.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(StepInput) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |input: StepInput| {
            let f = Arc::clone(&f);
            async move { f(input) }.boxed()
        }))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(StepInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self(Arc::new(move |input: StepInput| f(input).boxed()))
    }

    pub fn call(&self, input: StepInput) -> BoxFuture<'static, anyhow::Result<Value>> {
        (self.0)(input)
    }
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StepAction")
    }
}

#[derive(Clone, Debug)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    /// Falls back to the engine default when unset.
    pub timeout_ms: Option<u64>,
}

impl Step {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// What callers register. Statistics live on the registered [`Workflow`].
#[derive(Clone, Debug)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Clone, Debug)]
pub struct Workflow {
    pub id: String,
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

impl Workflow {
    pub fn new(id: impl Into<String>, definition: WorkflowDefinition) -> Self {
        Self {
            id: id.into(),
            definition,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
        }
    }

    pub fn info(&self, default_timeout_ms: u64) -> WorkflowInfo {
        WorkflowInfo {
            id: self.id.clone(),
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            steps: self
                .definition
                .steps
                .iter()
                .map(|step| StepInfo {
                    name: step.name.clone(),
                    timeout_ms: step.timeout_ms.unwrap_or(default_timeout_ms),
                })
                .collect(),
            created_at: self.created_at,
            last_run: self.last_run,
            run_count: self.run_count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    pub name: String,
    pub timeout_ms: u64,
}

/// Serializable description of a registered workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<StepInfo>,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

/// Step execution result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(step: String) -> Self {
        let now = Utc::now();
        Self {
            step,
            success: false,
            output: Value::Null,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
            error: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.success = true;
        self.output = output;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.success = false;
        self.error = Some(error);
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow_id: String,
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub steps: Vec<StepResult>,
}

impl WorkflowReport {
    pub fn new(workflow_id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            name,
            success: false,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
            steps: Vec::new(),
        }
    }

    pub fn with_success(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn push_step(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step.as_str()).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub running: bool,
    pub current_workflow: Option<String>,
    pub step_index: usize,
    pub total_steps: usize,
    pub workflows: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub id: String,
    pub name: String,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sync_and_async_actions_share_one_call_shape() {
        let sync = StepAction::from_fn(|_| Ok(json!(1)));
        let asynchronous = StepAction::from_async(|input: StepInput| async move {
            Ok(json!(input.task.is_none()))
        });
        let input = StepInput {
            task: None,
            cancel: CancellationToken::new(),
        };
        assert_eq!(sync.call(input.clone()).await.unwrap(), json!(1));
        assert_eq!(asynchronous.call(input).await.unwrap(), json!(true));
    }

    #[test]
    fn info_resolves_default_timeouts() {
        let def = WorkflowDefinition::new("Demo", "two steps")
            .step(Step::new("a", StepAction::from_fn(|_| Ok(Value::Null))).with_timeout_ms(50))
            .step(Step::new("b", StepAction::from_fn(|_| Ok(Value::Null))));
        let info = Workflow::new("demo", def).info(10_000);
        let timeouts: Vec<u64> = info.steps.iter().map(|s| s.timeout_ms).collect();
        assert_eq!(timeouts, vec![50, 10_000]);
        assert_eq!(info.run_count, 0);
    }
}
