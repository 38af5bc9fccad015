//! Workflow execution error types

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// Another run holds the engine
    #[error("a workflow is already running")]
    AlreadyRunning,

    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("step {step} timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    #[error("step {step} failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// The run was stopped before it could finish
    #[error("workflow stopped")]
    Stopped,
}

impl WorkflowError {
    /// Name of the step that ended the run, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            WorkflowError::StepTimeout { step, .. } | WorkflowError::StepFailed { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}
