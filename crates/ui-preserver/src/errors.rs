use thiserror::Error;

use pagekeeper_page_port::{PageError, SelectorError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreserveError {
    #[error("no UI backup available to restore")]
    RestoreUnavailable,
    #[error(transparent)]
    InvalidSelector(#[from] SelectorError),
    #[error("page write failed: {0}")]
    Page(#[from] PageError),
}
