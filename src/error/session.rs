use std::time::Duration;

use thiserror::Error;

use crate::error::storage::StorageError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to perform service handshake and model invocation: {0}")]
    Handshake(String),
    #[error("model did not load within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("failed to start async runtime: {0}")]
    Runtime(String),
    #[error("a response is still streaming")]
    Busy,
}
