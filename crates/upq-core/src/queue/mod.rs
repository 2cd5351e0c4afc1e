//! Work and failure queues: Redis lists whose elements are absolute paths.
//!
//! Producers `push` to the tail; the worker `pop`s from the head with a
//! bounded wait so it can notice shutdown between dequeues.

mod memory;
mod redis_queue;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueError;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append `value` to the list at `key`.
    async fn push(&self, key: &str, value: &str) -> Result<(), QueueError>;

    /// Remove and return the head of `key`, waiting up to `timeout`.
    /// `Ok(None)` on timeout.
    async fn pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, QueueError>;

    async fn len(&self, key: &str) -> Result<u64, QueueError>;

    /// Move every element of `from` to the tail of `to`, preserving order.
    /// Returns how many were moved.
    async fn drain_into(&self, from: &str, to: &str) -> Result<u64, QueueError>;
}
