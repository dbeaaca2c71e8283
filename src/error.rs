//! Engine error taxonomy shared by every tree and collaborator call.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Lookup or removal target does not exist. An expected outcome, never logged as a failure.
    #[error("Not found")]
    NotFound,

    /// Duplicate insert. Callers collapse this into a successful no-op.
    #[error("Key already exists")]
    ExistingKey,

    #[error("Allocation failed while growing a topic tree structure")]
    AllocateError,

    #[error("Store generation full")]
    StoreGenerationFull,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Retained message timestamp superseded by a newer one")]
    OldTimestamp,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cluster error: {0}")]
    Cluster(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
