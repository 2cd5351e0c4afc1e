//! Error types for uploads, the session store, and the work queue.

use std::path::PathBuf;
use thiserror::Error;

use crate::ranges::ByteRange;
use crate::remote::RemoteError;

/// Failure of a single transfer target. The worker turns every variant except
/// `PathMissing` and `RemoteConflict` into a job-level failure.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Source vanished before or during the attempt. Retrying cannot help.
    #[error("source path does not exist: {}", .0.display())]
    PathMissing(PathBuf),

    /// The remote already holds an object with this name. Treated as done.
    #[error("remote object already exists: {remote_path}")]
    RemoteConflict { remote_path: String },

    #[error("failed to create upload session for {remote_path}: {source}")]
    SessionCreateFailed {
        remote_path: String,
        #[source]
        source: RemoteError,
    },

    #[error("transfer of {} failed at {range}: {source}", path.display())]
    TransferError {
        path: PathBuf,
        range: ByteRange,
        #[source]
        source: RemoteError,
    },

    /// Shutdown was requested between chunks; the session stays resumable.
    #[error("transfer of {} interrupted at offset {offset}", path.display())]
    TransferInterrupted { path: PathBuf, offset: u64 },

    /// Local I/O on the source file failed.
    #[error("read {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl UploadError {
    /// True when the outcome means "nothing left to upload for this target".
    pub fn is_skip(&self) -> bool {
        matches!(self, UploadError::RemoteConflict { .. })
    }
}

/// Session store failures (Redis hash, SQLite, or descriptor encoding).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("descriptor encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Work queue failures.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to connect to redis at '{url}': {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}
