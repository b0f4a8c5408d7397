use thiserror::Error;

use tapback_db::DbError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Snapshot could not be taken or read. Not retried.
    #[error(transparent)]
    Io(#[from] DbError),

    /// The request cannot be routed safely, e.g. a group chat without a
    /// composite identifier.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("message dispatch failed: {0}")]
    Dispatch(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
