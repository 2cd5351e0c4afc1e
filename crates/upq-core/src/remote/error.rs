//! Remote call error type, kept separate from `UploadError` so the retry
//! policy can classify it before it is attached to a path and range.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),

    /// Response had an unexpected status.
    #[error("HTTP {status}: {body}")]
    Http { status: u32, body: String },

    /// Response body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Remote answered in a way the upload protocol doesn't allow.
    #[error("protocol: {0}")]
    Protocol(String),

    /// Blocking request task panicked or was cancelled.
    #[error("request task failed: {0}")]
    Task(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u32> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
