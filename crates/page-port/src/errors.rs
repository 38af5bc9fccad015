use thiserror::Error;

use crate::model::NodeId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} is detached from the document")]
    Detached(NodeId),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
