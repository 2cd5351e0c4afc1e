//! Upload session manager: resume or create a session for one source file,
//! drive it to completion chunk by chunk, and keep the session store's
//! descriptor in step with what the remote has acknowledged.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::control::Shutdown;
use crate::error::{StoreError, UploadError};
use crate::progress::{ProgressStats, ProgressTracker};
use crate::ranges::{plan_chunks, ByteRange};
use crate::remote::{ChunkAck, CreateOutcome, RemoteError, RemoteStore, SmallUpload};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::session::{SessionStore, UploadSession};
use crate::transfer::{ChunkTransfer, SourceFile};

/// What a successful `upload` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub remote_path: String,
    pub total_bytes: u64,
    /// Bytes sent by this call (less than `total_bytes` after a resume).
    pub bytes_sent: u64,
    pub resumed: bool,
}

pub struct Uploader {
    store: Arc<dyn SessionStore>,
    remote: Arc<dyn RemoteStore>,
    transfer: ChunkTransfer,
    chunk_size: u64,
    retry: RetryPolicy,
    shutdown: Shutdown,
    progress: Option<mpsc::Sender<ProgressStats>>,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn SessionStore>,
        remote: Arc<dyn RemoteStore>,
        chunk_size: u64,
        retry: RetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            transfer: ChunkTransfer::new(remote.clone(), retry, shutdown.clone()),
            store,
            remote,
            chunk_size: chunk_size.max(1),
            retry,
            shutdown,
            progress: None,
        }
    }

    /// Send a snapshot to `tx` after every accepted chunk.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressStats>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Upload `source` into `remote_dir` under its own file name.
    ///
    /// `Err(RemoteConflict)` means the remote already has the object; callers
    /// treat it like success. On any other error the stored descriptor is left
    /// in place so a later attempt can resume.
    pub async fn upload(
        &self,
        token: &str,
        source: &Path,
        remote_dir: &str,
    ) -> Result<UploadReport, UploadError> {
        let key = source.to_string_lossy().into_owned();
        let remote_path = remote_path_for(remote_dir, source)?;
        let mut file = SourceFile::open(source).await?;
        let total = file.len();

        if file.is_empty() {
            return self.upload_empty(token, &key, remote_path).await;
        }

        let (mut session, resumed) = match self.resume(&key).await? {
            Some(s) => (s, true),
            None => (self.create(token, &key, &remote_path).await?, false),
        };

        let Some(offset) = session.resume_offset() else {
            tracing::info!(path = %key, "remote expects no more bytes; session complete");
            self.store.delete(&key).await?;
            return Ok(UploadReport {
                remote_path,
                total_bytes: total,
                bytes_sent: 0,
                resumed,
            });
        };
        if offset >= total {
            // Descriptor belongs to a different (larger) version of the file.
            self.store.delete(&key).await?;
            return Err(UploadError::TransferError {
                path: source.to_path_buf(),
                range: ByteRange { start: offset, end: offset },
                source: RemoteError::Protocol(format!(
                    "resume offset {} is past the end of the {}-byte file",
                    offset, total
                )),
            });
        }

        self.store.set(&key, &session).await?;
        if resumed {
            tracing::info!(path = %key, offset, total, "resuming upload session");
        }

        let plan = plan_chunks(offset, total, self.chunk_size);
        let mut progress = ProgressTracker::new(
            source.to_path_buf(),
            offset,
            total,
            plan.remaining(),
            self.progress.clone(),
        );

        for range in plan {
            if self.shutdown.is_requested() {
                return Err(UploadError::TransferInterrupted {
                    path: source.to_path_buf(),
                    offset: range.start,
                });
            }
            let ack = self
                .transfer
                .transmit(token, &session, &mut file, range, total, &mut progress)
                .await?;
            match ack {
                ChunkAck::Accepted(_) if range.is_last(total) => {
                    return Err(UploadError::TransferError {
                        path: source.to_path_buf(),
                        range,
                        source: RemoteError::Protocol(
                            "final chunk accepted but object not finalized".into(),
                        ),
                    });
                }
                ChunkAck::Accepted(status) => {
                    session.record_chunk(range, status);
                    self.store.set(&key, &session).await?;
                }
                ChunkAck::Completed if !range.is_last(total) => {
                    return Err(UploadError::TransferError {
                        path: source.to_path_buf(),
                        range,
                        source: RemoteError::Protocol(format!(
                            "object finalized before the last byte ({} of {})",
                            range.end + 1,
                            total
                        )),
                    });
                }
                ChunkAck::Completed => {
                    self.store.delete(&key).await?;
                    return Ok(UploadReport {
                        remote_path,
                        total_bytes: total,
                        bytes_sent: total - offset,
                        resumed,
                    });
                }
            }
        }

        // chunk_size >= 1 and offset < total, so the plan always reaches the last byte.
        Err(UploadError::TransferError {
            path: source.to_path_buf(),
            range: ByteRange { start: offset, end: total - 1 },
            source: RemoteError::Protocol("chunk plan ended before end of file".into()),
        })
    }

    /// Stored descriptor refreshed by a status probe. Any probe failure, an
    /// already-expired descriptor, or one that no longer decodes degrades to
    /// "no session".
    async fn resume(&self, key: &str) -> Result<Option<UploadSession>, UploadError> {
        let mut session = match self.store.get(key).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(path = %key, error = %e, "discarding undecodable upload session");
                self.store.delete(key).await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if session.is_expired(Utc::now()) {
            tracing::info!(path = %key, "stored upload session expired; creating a new one");
            return Ok(None);
        }
        match self.remote.session_status(&session.upload_url).await {
            Ok(status) => {
                session.apply_status(status);
                Ok(Some(session))
            }
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "cannot resume upload session; creating a new one");
                Ok(None)
            }
        }
    }

    async fn create(
        &self,
        token: &str,
        key: &str,
        remote_path: &str,
    ) -> Result<UploadSession, UploadError> {
        let remote = &self.remote;
        let outcome = run_with_retry(&self.retry, &self.shutdown, move || async move {
            remote.create_session(token, remote_path).await
        })
        .await
        .map_err(|source| UploadError::SessionCreateFailed {
            remote_path: remote_path.to_string(),
            source,
        })?;
        match outcome {
            CreateOutcome::Created(session) => {
                tracing::debug!(path = %key, remote_path, "created upload session");
                Ok(session)
            }
            CreateOutcome::AlreadyExists => {
                // A descriptor left from an earlier attempt is now meaningless.
                self.store.delete(key).await?;
                Err(UploadError::RemoteConflict {
                    remote_path: remote_path.to_string(),
                })
            }
        }
    }

    /// Zero-byte files cannot be sent through an upload session.
    async fn upload_empty(
        &self,
        token: &str,
        key: &str,
        remote_path: String,
    ) -> Result<UploadReport, UploadError> {
        let remote = &self.remote;
        let rp = remote_path.as_str();
        let outcome = run_with_retry(&self.retry, &self.shutdown, move || async move {
            remote.upload_empty(token, rp).await
        })
        .await
        .map_err(|source| UploadError::SessionCreateFailed {
            remote_path: remote_path.clone(),
            source,
        })?;
        self.store.delete(key).await?;
        match outcome {
            SmallUpload::Created => Ok(UploadReport {
                remote_path,
                total_bytes: 0,
                bytes_sent: 0,
                resumed: false,
            }),
            SmallUpload::AlreadyExists => Err(UploadError::RemoteConflict { remote_path }),
        }
    }
}

/// `remote_dir/<file name of source>`, always absolute with single separators.
pub fn remote_path_for(remote_dir: &str, source: &Path) -> Result<String, UploadError> {
    let name = source
        .file_name()
        .ok_or_else(|| UploadError::PathMissing(source.to_path_buf()))?
        .to_string_lossy();
    let dir = remote_dir.trim_end_matches('/');
    if dir.starts_with('/') || dir.is_empty() {
        Ok(format!("{}/{}", dir, name))
    } else {
        Ok(format!("/{}/{}", dir, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn remote_path_joins_cleanly() {
        let src = PathBuf::from("/data/report.pdf");
        assert_eq!(remote_path_for("/upload/", &src).unwrap(), "/upload/report.pdf");
        assert_eq!(remote_path_for("/upload/photos", &src).unwrap(), "/upload/photos/report.pdf");
        assert_eq!(remote_path_for("/", &src).unwrap(), "/report.pdf");
        assert_eq!(remote_path_for("", &src).unwrap(), "/report.pdf");
        assert_eq!(remote_path_for("upload", &src).unwrap(), "/upload/report.pdf");
    }

    #[test]
    fn remote_path_needs_file_name() {
        assert!(remote_path_for("/upload", Path::new("/")).is_err());
    }
}
