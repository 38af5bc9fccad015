use thiserror::Error;

use pagekeeper_page_port::PageError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("no layout backup available to restore")]
    RestoreUnavailable,
    #[error("page write failed: {0}")]
    Page(#[from] PageError),
}
