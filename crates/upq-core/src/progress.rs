//! Progress snapshots for one file upload (bytes done, ETA, rate).
//!
//! Sent after every accepted chunk; consumers compute rate and ETA from the
//! snapshot. Bytes acknowledged before this run started (a resumed session)
//! count toward `bytes_done` but not toward the rate.

use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::ranges::ByteRange;

#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub path: PathBuf,
    /// Bytes the remote has acknowledged.
    pub bytes_done: u64,
    /// Bytes already acknowledged when this run resumed the session.
    pub bytes_resumed: u64,
    pub total_bytes: u64,
    /// Seconds since this run started sending the file.
    pub elapsed_secs: f64,
    pub chunks_done: u64,
    /// Chunks this run sends (not counting ones done before a resume).
    pub chunk_count: u64,
}

impl ProgressStats {
    /// Upload rate of this run in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done.saturating_sub(self.bytes_resumed) as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the rate is still 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Builds a snapshot per accepted chunk and hands it to the observer.
///
/// Uses `try_send`: a full or closed channel drops the snapshot rather than
/// stalling the upload.
pub struct ProgressTracker {
    stats: ProgressStats,
    started: Instant,
    tx: Option<mpsc::Sender<ProgressStats>>,
}

impl ProgressTracker {
    pub fn new(
        path: PathBuf,
        resume_offset: u64,
        total_bytes: u64,
        chunk_count: u64,
        tx: Option<mpsc::Sender<ProgressStats>>,
    ) -> Self {
        Self {
            stats: ProgressStats {
                path,
                bytes_done: resume_offset,
                bytes_resumed: resume_offset,
                total_bytes,
                elapsed_secs: 0.0,
                chunks_done: 0,
                chunk_count,
            },
            started: Instant::now(),
            tx,
        }
    }

    pub fn record(&mut self, range: ByteRange) {
        self.stats.bytes_done = range.end + 1;
        self.stats.chunks_done += 1;
        self.stats.elapsed_secs = self.started.elapsed().as_secs_f64();
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(self.stats.clone());
        }
    }

    pub fn stats(&self) -> &ProgressStats {
        &self.stats
    }
}
