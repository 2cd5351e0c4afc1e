//! CLI command handlers, one per file.

mod enqueue;
mod retry_failed;
mod run;
mod status;

pub use enqueue::run_enqueue;
pub use retry_failed::run_retry_failed;
pub use run::run_worker;
pub use status::run_status;

use anyhow::{Context, Result};
use std::sync::Arc;
use upq_core::config::UpqConfig;
use upq_core::queue::RedisQueue;
use upq_core::session::{RedisSessionStore, SessionStore, SqliteSessionStore};

/// Work/failure queue connection. Unreachable Redis is fatal.
async fn connect_queue(cfg: &UpqConfig) -> Result<RedisQueue> {
    RedisQueue::connect(&cfg.url)
        .await
        .with_context(|| format!("connect to queue at {}", cfg.url))
}

/// SQLite file when `session_store` is set, otherwise the Redis hash.
async fn open_session_store(cfg: &UpqConfig) -> Result<Arc<dyn SessionStore>> {
    match &cfg.session_store {
        Some(path) => {
            let store = SqliteSessionStore::open_at(path)
                .await
                .with_context(|| format!("open session store {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            let store = RedisSessionStore::connect(&cfg.url, &cfg.session_key)
                .await
                .with_context(|| format!("connect to session store at {}", cfg.url))?;
            Ok(Arc::new(store))
        }
    }
}
