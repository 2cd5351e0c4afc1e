//! `upq status` – queue lengths and in-flight upload sessions.

use anyhow::Result;
use upq_core::config::UpqConfig;
use upq_core::queue::JobQueue;

use super::{connect_queue, open_session_store};

pub async fn run_status(cfg: &UpqConfig) -> Result<()> {
    let queue = connect_queue(cfg).await?;
    let pending = queue.len(&cfg.queue).await?;
    let failed = queue.len(&cfg.failure_queue).await?;
    println!("{:<10} {:<16} {}", "QUEUE", "KEY", "JOBS");
    println!("{:<10} {:<16} {}", "work", cfg.queue, pending);
    println!("{:<10} {:<16} {}", "failed", cfg.failure_queue, failed);
    if let Some(key) = &cfg.success_queue {
        let done = queue.len(key).await?;
        println!("{:<10} {:<16} {}", "success", key, done);
    }

    let store = open_session_store(cfg).await?;
    let paths = store.list().await?;
    if paths.is_empty() {
        println!("No upload sessions in progress.");
        return Ok(());
    }
    println!();
    println!("{:<12} {}", "RESUME AT", "PATH");
    for p in paths {
        let offset = match store.get(&p).await? {
            Some(s) => s
                .resume_offset()
                .map(|o| o.to_string())
                .unwrap_or_else(|| "done".to_string()),
            None => "-".to_string(),
        };
        println!("{:<12} {}", offset, p);
    }
    Ok(())
}
