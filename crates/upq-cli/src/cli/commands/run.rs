//! `upq run` – drain the work queue until a termination signal arrives.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use upq_core::config::UpqConfig;
use upq_core::control::Shutdown;
use upq_core::credentials::SessionFileCredentials;
use upq_core::progress::ProgressStats;
use upq_core::remote::GraphRemote;
use upq_core::uploader::Uploader;
use upq_core::worker::{Worker, WorkerSettings};

use super::{connect_queue, open_session_store};

pub async fn run_worker(cfg: &UpqConfig) -> Result<()> {
    let shutdown = Shutdown::new();
    shutdown
        .install_signal_handler()
        .context("install signal handler")?;

    let queue = connect_queue(cfg).await?;
    let store = open_session_store(cfg).await?;
    let remote = GraphRemote::new(&cfg.api_base_url, cfg.http_options())
        .with_context(|| format!("invalid api_base_url {:?}", cfg.api_base_url))?;
    let credentials = SessionFileCredentials::new(cfg.credentials_path()?, cfg.http_options());
    tracing::debug!(path = %credentials.path().display(), "using credential file");

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressStats>(16);
    const PROGRESS_INTERVAL_MS: u64 = 500;
    let progress_handle = tokio::spawn(async move {
        let mut last_print = Instant::now();
        while let Some(stats) = progress_rx.recv().await {
            let now = Instant::now();
            if now.duration_since(last_print).as_millis() as u64 >= PROGRESS_INTERVAL_MS
                || stats.bytes_done >= stats.total_bytes
            {
                let done_mib = stats.bytes_done as f64 / 1_048_576.0;
                let total_mib = stats.total_bytes as f64 / 1_048_576.0;
                let pct = stats.fraction() * 100.0;
                let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
                let eta = stats
                    .eta_secs()
                    .map(|s| format!("{:.0}s", s))
                    .unwrap_or_else(|| "?".to_string());
                let name = stats
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!(
                    "\r  {}  {:.1} / {:.1} MiB ({:.1}%)  chunk {}/{}  {:.2} MiB/s  ETA {}  ",
                    name,
                    done_mib,
                    total_mib,
                    pct,
                    stats.chunks_done,
                    stats.chunk_count,
                    rate_mib,
                    eta
                );
                last_print = now;
            }
        }
    });

    let uploader = Uploader::new(
        store,
        Arc::new(remote),
        cfg.chunk_size,
        cfg.retry_policy(),
        shutdown.clone(),
    )
    .with_progress(progress_tx);
    let mut worker = Worker::new(
        Arc::new(queue),
        Arc::new(credentials),
        uploader,
        WorkerSettings::from(cfg),
        shutdown,
    );

    let stats = worker.run().await;
    // Dropping the worker closes the progress channel.
    drop(worker);
    let _ = progress_handle.await;

    println!(
        "jobs: {} completed, {} failed, {} dropped; files: {} uploaded, {} already present; {:.1} MiB sent",
        stats.jobs_completed,
        stats.jobs_failed,
        stats.jobs_dropped,
        stats.files_uploaded,
        stats.files_skipped,
        stats.bytes_sent as f64 / 1_048_576.0
    );
    Ok(())
}
