//! Queue-backed job worker.
//!
//! One job at a time: pop a path, expand it into transfer targets, upload
//! each through the [`Uploader`], then remove the source on full success
//! (recording the path on the success queue when one is configured) or push
//! the unmodified path onto the failure queue. The loop only stops at a
//! job boundary once shutdown has been requested.

mod expand;

pub use expand::{
    expand, remote_dir, ExpandError, ExpandedJob, IgnoreSet, JobKind, TransferTarget,
};

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use crate::control::Shutdown;
use crate::credentials::CredentialProvider;
use crate::error::UploadError;
use crate::queue::JobQueue;
use crate::uploader::Uploader;

/// Keys and knobs the worker loop needs.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub queue: String,
    pub failure_queue: String,
    /// Completed job paths are appended here when set.
    pub success_queue: Option<String>,
    pub rootpath: String,
    pub ignore: IgnoreSet,
    pub pop_timeout: Duration,
}

impl From<&crate::config::UpqConfig> for WorkerSettings {
    fn from(cfg: &crate::config::UpqConfig) -> Self {
        Self {
            queue: cfg.queue.clone(),
            failure_queue: cfg.failure_queue.clone(),
            success_queue: cfg.success_queue.clone(),
            rootpath: cfg.rootpath.clone(),
            ignore: cfg.ignore_set(),
            pop_timeout: cfg.pop_timeout(),
        }
    }
}

/// How one dequeued job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every target is on the remote (uploaded or already present).
    Completed {
        uploaded: usize,
        skipped: usize,
        bytes_sent: u64,
    },
    /// The source path no longer exists; nothing to retry.
    Dropped,
    /// The unmodified path was handed to the failure queue.
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_dropped: u64,
    pub files_uploaded: u64,
    pub files_skipped: u64,
    pub bytes_sent: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed {
                uploaded,
                skipped,
                bytes_sent,
            } => {
                self.jobs_completed += 1;
                self.files_uploaded += *uploaded as u64;
                self.files_skipped += *skipped as u64;
                self.bytes_sent += bytes_sent;
            }
            JobOutcome::Dropped => self.jobs_dropped += 1,
            JobOutcome::Failed { .. } => self.jobs_failed += 1,
        }
    }
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    credentials: Arc<dyn CredentialProvider>,
    uploader: Uploader,
    settings: WorkerSettings,
    shutdown: Shutdown,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        credentials: Arc<dyn CredentialProvider>,
        uploader: Uploader,
        settings: WorkerSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            queue,
            credentials,
            uploader,
            settings,
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Drain the work queue until shutdown is requested.
    pub async fn run(&mut self) -> WorkerStats {
        tracing::info!(
            queue = %self.settings.queue,
            failure_queue = %self.settings.failure_queue,
            "worker started"
        );
        while !self.shutdown.is_requested() {
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "failed to pop job");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        tracing::info!(stats = ?self.stats, "worker stopped");
        self.stats.clone()
    }

    /// One idle wait plus, if a job arrived, its full processing.
    /// `Ok(None)` when the wait timed out.
    pub async fn run_once(&mut self) -> Result<Option<JobOutcome>, crate::error::QueueError> {
        let Some(job) = self
            .queue
            .pop(&self.settings.queue, self.settings.pop_timeout)
            .await?
        else {
            return Ok(None);
        };
        let outcome = self.handle_job(&job).await;
        self.stats.record(&outcome);
        Ok(Some(outcome))
    }

    /// Process one job path. Never returns an error: failures end up on the
    /// failure queue and are reported through the outcome.
    pub async fn handle_job(&mut self, job: &str) -> JobOutcome {
        let outcome = match self.process(job).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::error!(path = job, error = %reason, "job failed");
                self.push_failed(job).await;
                JobOutcome::Failed { reason }
            }
        };
        if let JobOutcome::Completed { uploaded, skipped, bytes_sent } = &outcome {
            tracing::info!(path = job, uploaded, skipped, bytes_sent, "job completed");
            self.push_succeeded(job).await;
        }
        outcome
    }

    async fn process(&mut self, job: &str) -> Result<JobOutcome, String> {
        let path = Path::new(job).to_path_buf();
        let ignore = self.settings.ignore.clone();
        let expanded = tokio::task::spawn_blocking(move || expand(&path, &ignore))
            .await
            .map_err(|e| format!("expand task: {}", e))?;
        let expanded = match expanded {
            Ok(x) => x,
            Err(ExpandError::Missing(p)) => {
                tracing::warn!(path = %p.display(), "source path is gone; dropping job");
                return Ok(JobOutcome::Dropped);
            }
            Err(e) => return Err(e.to_string()),
        };

        let mut uploaded = 0usize;
        let mut skipped = 0usize;
        let mut bytes_sent = 0u64;
        for target in &expanded.targets {
            if self.shutdown.is_requested() {
                return Err(format!(
                    "shutdown requested before {}",
                    target.source.display()
                ));
            }
            // Per target: a long directory job can outlive a single token.
            let token = self
                .credentials
                .access_token()
                .await
                .map_err(|e| format!("access token: {:#}", e))?;
            let dir = remote_dir(&self.settings.rootpath, &target.destination);
            match self.uploader.upload(&token, &target.source, &dir).await {
                Ok(report) => {
                    tracing::info!(
                        path = %target.source.display(),
                        remote = %report.remote_path,
                        bytes = report.bytes_sent,
                        resumed = report.resumed,
                        "uploaded"
                    );
                    uploaded += 1;
                    bytes_sent += report.bytes_sent;
                }
                Err(e) if e.is_skip() => {
                    tracing::info!(path = %target.source.display(), "{}; skipping", e);
                    skipped += 1;
                }
                Err(UploadError::PathMissing(p)) if expanded.kind == JobKind::File => {
                    tracing::warn!(path = %p.display(), "source vanished before upload; dropping job");
                    return Ok(JobOutcome::Dropped);
                }
                Err(UploadError::PathMissing(p)) => {
                    tracing::warn!(path = %p.display(), "file vanished from directory job; skipping");
                    skipped += 1;
                }
                Err(e) => return Err(e.to_string()),
            }
        }

        finalize(&expanded).await;
        Ok(JobOutcome::Completed {
            uploaded,
            skipped,
            bytes_sent,
        })
    }

    async fn push_succeeded(&self, job: &str) {
        let Some(key) = &self.settings.success_queue else {
            return;
        };
        if let Err(e) = self.queue.push(key, job).await {
            tracing::warn!(path = job, success_queue = %key, error = %e, "could not record completed job");
        }
    }

    async fn push_failed(&self, job: &str) {
        if let Err(e) = self.queue.push(&self.settings.failure_queue, job).await {
            tracing::error!(
                path = job,
                failure_queue = %self.settings.failure_queue,
                error = %e,
                "could not push job to failure queue"
            );
        }
    }
}

/// Remove the source once every target is on the remote. A directory job
/// removes the uploaded files, then every directory left empty; ignored
/// files keep their directories alive.
async fn finalize(job: &ExpandedJob) {
    let job = job.clone();
    let res = tokio::task::spawn_blocking(move || match job.kind {
        JobKind::File => remove_file(&job.root),
        JobKind::Directory => {
            for t in &job.targets {
                remove_file(&t.source)?;
            }
            prune_empty_dirs(&job.root);
            Ok(())
        }
    })
    .await;
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to remove uploaded source"),
        Err(e) => tracing::warn!(error = %e, "source cleanup task failed"),
    }
}

fn remove_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn prune_empty_dirs(root: &Path) {
    for entry in WalkDir::new(root)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_dir() {
            // Fails (and is ignored) for directories that still hold files.
            let _ = std::fs::remove_dir(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn stats_accumulate() {
        let mut s = WorkerStats::default();
        s.record(&JobOutcome::Completed {
            uploaded: 2,
            skipped: 1,
            bytes_sent: 10,
        });
        s.record(&JobOutcome::Dropped);
        s.record(&JobOutcome::Failed {
            reason: "x".into(),
        });
        assert_eq!(s.jobs_completed, 1);
        assert_eq!(s.files_uploaded, 2);
        assert_eq!(s.files_skipped, 1);
        assert_eq!(s.bytes_sent, 10);
        assert_eq!(s.jobs_dropped, 1);
        assert_eq!(s.jobs_failed, 1);
    }

    #[test]
    fn prune_keeps_dirs_with_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("job");
        fs::create_dir_all(root.join("empty/deeper")).unwrap();
        fs::create_dir_all(root.join("kept")).unwrap();
        fs::write(root.join("kept/page.html"), b"x").unwrap();

        prune_empty_dirs(&root);
        assert!(!root.join("empty").exists());
        assert!(root.join("kept/page.html").exists());
        assert!(root.exists());
    }

    #[test]
    fn prune_removes_fully_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("job");
        fs::create_dir_all(root.join("a/b")).unwrap();
        prune_empty_dirs(&root);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn finalize_file_job_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("a.bin");
        fs::write(&f, b"x").unwrap();
        let job = expand(&f, &IgnoreSet::default()).unwrap();
        finalize(&job).await;
        assert!(!f.exists());
        assert!(dir.path().exists());
    }
}
