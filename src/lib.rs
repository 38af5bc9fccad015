//! pagekeeper library
//!
//! The automation orchestrator, configuration and component wiring. The
//! individual components live in the workspace crates and are re-exported
//! here for integration tests and embedders.

pub mod app;
pub mod config;
pub mod errors;
pub mod orchestrator;

pub use app::{demo_page, AppContext, Collaborators};
pub use config::{resolve_config_path, AutomationSettings, Config, ConfigError, DemoPage};
pub use errors::AutomationError;
pub use orchestrator::{
    workflow_for, AutomationCommand, AutomationEvent, AutomationOrchestrator, AutomationReport,
    AutomationStatus, DetailedStatus, OrchestratorBuilder, QuickTaskOptions,
};

pub use pagekeeper_core_types as core_types;
pub use pagekeeper_layout as layout;
pub use pagekeeper_page_port as page_port;
pub use pagekeeper_preserver as preserver;
pub use pagekeeper_workflow as workflow;
