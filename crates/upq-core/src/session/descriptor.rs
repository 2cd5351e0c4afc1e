//! Upload session descriptor as stored and as returned by the remote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ranges::{self, ByteRange, PendingRange};
use crate::remote::SessionStatus;

/// In-flight upload session for one source file.
///
/// Serialized with the remote's field names (`uploadUrl`,
/// `expirationDateTime`, `nextExpectedRanges`) so the create-session response
/// can be stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    #[serde(
        rename = "expirationDateTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,
    /// Ranges the remote still expects, ascending. `None` when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_expected_ranges: Option<Vec<PendingRange>>,
}

impl UploadSession {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            upload_url: upload_url.into(),
            expiration: None,
            next_expected_ranges: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }

    /// Refresh expiration and pending ranges from a status probe.
    pub fn apply_status(&mut self, status: SessionStatus) {
        if status.expiration.is_some() {
            self.expiration = status.expiration;
        }
        if status.next_expected_ranges.is_some() {
            self.next_expected_ranges = status.next_expected_ranges;
        }
    }

    /// Record an accepted chunk. Uses the remote's reported ranges when
    /// present, otherwise marks everything after `range` as pending.
    pub fn record_chunk(&mut self, range: ByteRange, status: SessionStatus) {
        let reported = status.next_expected_ranges.is_some();
        self.apply_status(status);
        if !reported {
            self.next_expected_ranges = Some(vec![PendingRange::open(range.end + 1)]);
        }
    }

    /// Byte offset to resume from; `None` when the remote expects nothing more.
    pub fn resume_offset(&self) -> Option<u64> {
        ranges::resume_offset(self.next_expected_ranges.as_deref())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
