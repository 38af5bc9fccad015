//! Workflow engine
//!
//! Named workflows are ordered lists of timed steps. The engine runs one
//! workflow at a time, step by step, and aborts on the first failure. The
//! default catalog wires the portal's built-in workflows to the layout
//! controller, the page and the sync/cache collaborators.

pub mod catalog;
pub mod collaborators;
pub mod engine;
pub mod errors;
pub mod policy;
pub mod types;

pub use catalog::{
    DefaultCatalog, CROSS_DEVICE_SYNC, MOBILE_FIRST_DEVELOPMENT, PWA_MAINTENANCE,
    UI_LAYOUT_PRESERVATION,
};
pub use collaborators::{
    AgentTaskRunner, CacheProvider, DataSync, EchoTaskRunner, LocalDataSync, StaticCacheProvider,
    SyncMessage,
};
pub use engine::{DefaultWorkflowEngine, WorkflowEngine};
pub use errors::WorkflowError;
pub use policy::WorkflowPolicy;
pub use types::{
    Step, StepAction, StepInfo, StepInput, StepResult, Workflow, WorkflowDefinition,
    WorkflowHistoryEntry, WorkflowInfo, WorkflowReport, WorkflowStatus,
};
