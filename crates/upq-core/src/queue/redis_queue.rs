//! Redis list queue (`RPUSH` / `BLPOP` / `LLEN` / `LMOVE`).

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;

use super::JobQueue;
use crate::error::QueueError;

/// Queue over a dedicated multiplexed connection. `BLPOP` holds the
/// connection while it waits, so do not share it with the session store.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = Client::open(url).map_err(|e| QueueError::ConnectionFailed {
            url: url.to_string(),
            source: e,
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                url: url.to_string(),
                source: e,
            })?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn push(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        // BLPOP replies with [key, value] or nil on timeout.
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn len(&self, key: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let n: u64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(n)
    }

    async fn drain_into(&self, from: &str, to: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let mut moved = 0u64;
        loop {
            let item: Option<String> = redis::cmd("LMOVE")
                .arg(from)
                .arg(to)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }
}
