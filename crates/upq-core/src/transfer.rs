//! Chunk transfer: read one byte range of the source file and PUT it to the
//! session's upload URL, retrying transient failures in place.
//!
//! Only the current chunk is held in memory.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::control::Shutdown;
use crate::error::UploadError;
use crate::progress::ProgressTracker;
use crate::ranges::ByteRange;
use crate::remote::{ChunkAck, RemoteStore};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::session::UploadSession;

/// Open source file plus the length observed when it was opened.
pub struct SourceFile {
    path: PathBuf,
    file: tokio::fs::File,
    len: u64,
}

impl SourceFile {
    /// Missing files map to `PathMissing`; other I/O errors to `SourceRead`.
    pub async fn open(path: &Path) -> Result<Self, UploadError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| io_error(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| io_error(path, e))?
            .len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read exactly `range.len()` bytes at `range.start`. A file that shrank
    /// underneath us fails with `UnexpectedEof` instead of sending short data.
    pub async fn read_range(&mut self, range: ByteRange) -> Result<Vec<u8>, UploadError> {
        if range.end >= self.len {
            return Err(UploadError::SourceRead {
                path: self.path.clone(),
                source: std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("range {} past end of {}-byte file", range, self.len),
                ),
            });
        }
        let mut buf = vec![0u8; range.len() as usize];
        self.file
            .seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| io_error(&self.path, e))?;
        self.file
            .read_exact(&mut buf)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        Ok(buf)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> UploadError {
    if e.kind() == ErrorKind::NotFound {
        UploadError::PathMissing(path.to_path_buf())
    } else {
        UploadError::SourceRead {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

/// Sends chunks for one upload session.
pub struct ChunkTransfer {
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl ChunkTransfer {
    pub fn new(remote: Arc<dyn RemoteStore>, retry: RetryPolicy, shutdown: Shutdown) -> Self {
        Self {
            remote,
            retry,
            shutdown,
        }
    }

    /// Transmit `range` of `source` to `session`, then report it to `progress`.
    pub async fn transmit(
        &self,
        token: &str,
        session: &UploadSession,
        source: &mut SourceFile,
        range: ByteRange,
        total: u64,
        progress: &mut ProgressTracker,
    ) -> Result<ChunkAck, UploadError> {
        let body = source.read_range(range).await?;
        tracing::debug!(path = %source.path().display(), %range, total, "put chunk");

        let remote = &self.remote;
        let upload_url = session.upload_url.as_str();
        let body = &body;
        let ack = run_with_retry(&self.retry, &self.shutdown, move || async move {
            remote
                .put_chunk(token, upload_url, range, total, body.clone())
                .await
        })
        .await
        .map_err(|source_err| UploadError::TransferError {
            path: source.path().to_path_buf(),
            range,
            source: source_err,
        })?;

        progress.record(range);
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[tokio::test]
    async fn reads_exact_range() {
        let f = fixture(b"0123456789");
        let mut src = SourceFile::open(f.path()).await.unwrap();
        assert_eq!(src.len(), 10);
        assert_eq!(src.read_range(ByteRange { start: 3, end: 5 }).await.unwrap(), b"345");
        assert_eq!(src.read_range(ByteRange { start: 9, end: 9 }).await.unwrap(), b"9");
        assert_eq!(src.read_range(ByteRange { start: 0, end: 1 }).await.unwrap(), b"01");
    }

    #[tokio::test]
    async fn refuses_to_read_past_eof() {
        let f = fixture(b"abc");
        let mut src = SourceFile::open(f.path()).await.unwrap();
        let err = src.read_range(ByteRange { start: 2, end: 3 }).await.unwrap_err();
        assert!(matches!(err, UploadError::SourceRead { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_source_is_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceFile::open(&dir.path().join("gone.bin")).await.err().unwrap();
        assert!(matches!(err, UploadError::PathMissing(_)));
    }
}
