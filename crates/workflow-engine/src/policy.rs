use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowPolicy {
    /// Applied to steps registered without an explicit timeout.
    pub default_step_timeout_ms: u64,
    /// Abort the in-flight step when the run is stopped.
    pub cancel_in_flight_on_stop: bool,
    /// Honour pause/resume between steps.
    pub pause_checkpoints: bool,
    /// Fail `validate_layout_integrity` when critical elements are missing.
    pub strict_integrity: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 10_000,
            cancel_in_flight_on_stop: false,
            pause_checkpoints: false,
            strict_integrity: false,
        }
    }
}
