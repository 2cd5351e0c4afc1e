//! Remote drive protocol: upload sessions, status probes, and chunk PUTs.
//!
//! `RemoteStore` is the seam between the upload session manager and the
//! network; `GraphRemote` speaks the drive's HTTP API through libcurl.

mod error;
mod graph;
pub(crate) mod http;

pub use error::RemoteError;
pub use graph::GraphRemote;
pub use http::HttpOptions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ranges::{ByteRange, PendingRange};
use crate::session::UploadSession;

/// Result of asking the remote for a new upload session.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(UploadSession),
    /// An object with this name already exists (conflict behavior "fail").
    AlreadyExists,
}

/// Result of a single-request upload (used for zero-length files).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallUpload {
    Created,
    AlreadyExists,
}

/// Session state reported by a status probe or an accepted chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    #[serde(rename = "expirationDateTime", default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_expected_ranges: Option<Vec<PendingRange>>,
}

/// Remote's answer to a chunk PUT.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkAck {
    /// More bytes expected; carries the refreshed session state.
    Accepted(SessionStatus),
    /// The object was finalized by this chunk.
    Completed,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Request a new upload session for `remote_path` (absolute, including the file name).
    async fn create_session(&self, token: &str, remote_path: &str)
        -> Result<CreateOutcome, RemoteError>;

    /// Probe an existing session for its expiration and pending ranges.
    async fn session_status(&self, upload_url: &str) -> Result<SessionStatus, RemoteError>;

    /// Send one chunk. `body.len()` must equal `range.len()`.
    async fn put_chunk(
        &self,
        token: &str,
        upload_url: &str,
        range: ByteRange,
        total: u64,
        body: Vec<u8>,
    ) -> Result<ChunkAck, RemoteError>;

    /// Create an empty object at `remote_path`, failing on name conflict.
    async fn upload_empty(&self, token: &str, remote_path: &str)
        -> Result<SmallUpload, RemoteError>;
}
