//! Orchestrator error types

use thiserror::Error;

use pagekeeper_layout::LayoutError;
use pagekeeper_preserver::PreserveError;
use pagekeeper_workflow::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AutomationError {
    /// A component handle was not supplied at construction.
    #[error("orchestrator not ready: missing {0}")]
    NotReady(&'static str),

    #[error("an automation session is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Preserve(#[from] PreserveError),

    #[error("quick task failed: {0}")]
    QuickTask(String),
}

impl AutomationError {
    /// True for failures raised by a workflow step, as opposed to setup errors.
    pub fn is_workflow_failure(&self) -> bool {
        matches!(
            self,
            AutomationError::Workflow(
                WorkflowError::StepFailed { .. }
                    | WorkflowError::StepTimeout { .. }
                    | WorkflowError::Stopped
            )
        )
    }
}
