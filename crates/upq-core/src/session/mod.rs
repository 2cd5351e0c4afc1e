//! Session store: durable map from source path to in-flight upload session.
//!
//! Absence of a descriptor is not an error; it means "start a fresh session".
//! Every operation is a single round trip keyed by one path, so a descriptor
//! is never partially written.

mod descriptor;
mod memory;
mod redis_store;
mod sqlite;

pub use descriptor::UploadSession;
pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;
pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;

use crate::error::StoreError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<UploadSession>, StoreError>;

    async fn set(&self, path: &str, session: &UploadSession) -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Source paths that currently have a persisted descriptor.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}
