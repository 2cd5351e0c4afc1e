//! Process-wide cooperative shutdown.
//!
//! A single flag, initially clear, set by the first SIGINT/SIGTERM. The worker
//! checks it between jobs and before each target; the upload session loop
//! checks it before each chunk. Nothing ever clears it, and an in-flight
//! chunk PUT is never aborted by it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable handle to the shutdown flag. Pass it explicitly to every
/// component that has a cancellation point.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns true only for the call that performed the
    /// transition, so callers can log it exactly once.
    pub fn request(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested. Safe to race against a
    /// timer with `tokio::select!`.
    pub async fn requested(&self) {
        loop {
            // Register before checking the flag so a concurrent request is not missed.
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Route SIGINT and SIGTERM to this flag. Can only be installed once per process.
    pub fn install_signal_handler(&self) -> anyhow::Result<()> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            if shutdown.request() {
                tracing::warn!("received termination signal, finishing current chunk before shutdown");
            } else {
                tracing::debug!("termination signal received again; shutdown already in progress");
            }
        })?;
        Ok(())
    }
}
