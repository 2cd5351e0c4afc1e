//! In-process `RemoteStore` that records every call.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use upq_core::control::Shutdown;
use upq_core::ranges::{ByteRange, PendingRange};
use upq_core::remote::{
    ChunkAck, CreateOutcome, RemoteError, RemoteStore, SessionStatus, SmallUpload,
};
use upq_core::session::UploadSession;

#[derive(Debug, Clone, PartialEq)]
pub struct PutCall {
    pub upload_url: String,
    pub range: ByteRange,
    pub total: u64,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct FakeRemote {
    /// Remote paths that already exist.
    pub existing: Mutex<HashSet<String>>,
    /// Answer to status probes; `None` fails the probe.
    pub status: Mutex<Option<SessionStatus>>,
    /// Request shutdown once this many chunk PUTs have completed.
    pub shutdown_after_puts: Mutex<Option<(usize, Shutdown)>>,
    /// Chunk PUTs starting at this offset fail with HTTP 500.
    pub fail_put_at: Mutex<Option<u64>>,
    pub creates: Mutex<Vec<String>>,
    pub probes: Mutex<Vec<String>>,
    pub puts: Mutex<Vec<PutCall>>,
    pub empties: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, remote_path: &str) -> Self {
        self.existing.lock().unwrap().insert(remote_path.to_string());
        self
    }

    pub fn with_status(self, status: SessionStatus) -> Self {
        *self.status.lock().unwrap() = Some(status);
        self
    }

    pub fn shutdown_after(self, puts: usize, shutdown: Shutdown) -> Self {
        *self.shutdown_after_puts.lock().unwrap() = Some((puts, shutdown));
        self
    }

    pub fn failing_at(self, offset: u64) -> Self {
        *self.fail_put_at.lock().unwrap() = Some(offset);
        self
    }

    pub fn put_ranges(&self) -> Vec<ByteRange> {
        self.puts.lock().unwrap().iter().map(|p| p.range).collect()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    /// Bytes received, concatenated in PUT order.
    pub fn received(&self) -> Vec<u8> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.body.iter().copied())
            .collect()
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }
}

pub fn upload_url_for(remote_path: &str) -> String {
    format!("https://up.example{}", remote_path)
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn create_session(
        &self,
        _token: &str,
        remote_path: &str,
    ) -> Result<CreateOutcome, RemoteError> {
        self.creates.lock().unwrap().push(remote_path.to_string());
        if self.existing.lock().unwrap().contains(remote_path) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Ok(CreateOutcome::Created(UploadSession {
            upload_url: upload_url_for(remote_path),
            expiration: Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()),
            next_expected_ranges: Some(vec![PendingRange::open(0)]),
        }))
    }

    async fn session_status(&self, upload_url: &str) -> Result<SessionStatus, RemoteError> {
        self.probes.lock().unwrap().push(upload_url.to_string());
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RemoteError::Http {
                status: 404,
                body: "itemNotFound".into(),
            })
    }

    async fn put_chunk(
        &self,
        _token: &str,
        upload_url: &str,
        range: ByteRange,
        total: u64,
        body: Vec<u8>,
    ) -> Result<ChunkAck, RemoteError> {
        if *self.fail_put_at.lock().unwrap() == Some(range.start) {
            return Err(RemoteError::Http {
                status: 500,
                body: "boom".into(),
            });
        }
        let done = {
            let mut puts = self.puts.lock().unwrap();
            puts.push(PutCall {
                upload_url: upload_url.to_string(),
                range,
                total,
                body,
            });
            puts.len()
        };
        if let Some((n, shutdown)) = &*self.shutdown_after_puts.lock().unwrap() {
            if done >= *n {
                shutdown.request();
            }
        }
        if range.is_last(total) {
            Ok(ChunkAck::Completed)
        } else {
            Ok(ChunkAck::Accepted(SessionStatus {
                expiration: None,
                next_expected_ranges: Some(vec![PendingRange::open(range.end + 1)]),
            }))
        }
    }

    async fn upload_empty(&self, _token: &str, remote_path: &str) -> Result<SmallUpload, RemoteError> {
        self.empties.lock().unwrap().push(remote_path.to_string());
        if self.existing.lock().unwrap().contains(remote_path) {
            Ok(SmallUpload::AlreadyExists)
        } else {
            Ok(SmallUpload::Created)
        }
    }
}
