//! `upq enqueue` – push absolute paths onto the work queue.

use anyhow::{Context, Result};
use std::path::PathBuf;
use upq_core::config::UpqConfig;
use upq_core::queue::JobQueue;

use super::connect_queue;

pub async fn run_enqueue(cfg: &UpqConfig, paths: &[PathBuf]) -> Result<()> {
    // Resolve every path before pushing anything so a typo doesn't enqueue half a batch.
    let absolute = paths
        .iter()
        .map(|p| std::fs::canonicalize(p).with_context(|| format!("resolve {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let queue = connect_queue(cfg).await?;
    for path in &absolute {
        let value = path.to_string_lossy();
        queue.push(&cfg.queue, &value).await?;
        tracing::info!(path = %value, queue = %cfg.queue, "enqueued");
        println!("queued {}", value);
    }
    Ok(())
}
