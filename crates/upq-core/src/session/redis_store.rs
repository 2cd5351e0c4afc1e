//! Session descriptors in a single Redis hash (`HGET`/`HSET`/`HDEL`), one
//! field per source path, value is the descriptor JSON.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;

use super::{SessionStore, UploadSession};
use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    key: String,
}

impl RedisSessionStore {
    /// Connect to `url` and use the hash at `key`.
    pub async fn connect(url: &str, key: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::with_connection(conn, key))
    }

    pub fn with_connection(conn: MultiplexedConnection, key: &str) -> Self {
        Self {
            conn,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, path: &str) -> Result<Option<UploadSession>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.key)
            .arg(path)
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(json) => Ok(Some(UploadSession::from_json(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, path: &str, session: &UploadSession) -> Result<(), StoreError> {
        let json = session.to_json()?;
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(&self.key)
            .arg(path)
            .arg(json)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("HDEL")
            .arg(&self.key)
            .arg(path)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = redis::cmd("HKEYS")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        keys.sort();
        Ok(keys)
    }
}
