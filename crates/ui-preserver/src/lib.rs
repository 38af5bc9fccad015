//! UI state preservation: restorable backups, protected-element tagging and
//! advisory mutation watching.

pub mod errors;
pub mod history;
pub mod model;
pub mod policy;
pub mod preserver;
pub mod watch;

pub use errors::PreserveError;
pub use history::BackupRing;
pub use model::{
    ElementCapture, OriginContent, PreserveWarning, PreserverStatus, StyleCapture, UiBackup,
    WarningKind, ORIGINAL_CONTENT_ATTR, PROTECTED_ATTR, PROTECTED_CLASS,
};
pub use policy::{MutationPolicy, PreserverPolicy};
pub use preserver::{PreserveResult, UiPreserver};
