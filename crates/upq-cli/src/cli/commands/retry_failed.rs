//! `upq retry-failed` – re-submit every job on the failure queue.

use anyhow::Result;
use upq_core::config::UpqConfig;
use upq_core::queue::JobQueue;

use super::connect_queue;

pub async fn run_retry_failed(cfg: &UpqConfig) -> Result<()> {
    let queue = connect_queue(cfg).await?;
    let moved = queue.drain_into(&cfg.failure_queue, &cfg.queue).await?;
    if moved == 0 {
        println!("Failure queue {} is empty.", cfg.failure_queue);
    } else {
        tracing::info!(moved, from = %cfg.failure_queue, to = %cfg.queue, "re-queued failed jobs");
        println!("Moved {} job(s) from {} to {}.", moved, cfg.failure_queue, cfg.queue);
    }
    Ok(())
}
