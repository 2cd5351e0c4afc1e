//! In-process queue with the same list semantics as the Redis backend.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use super::JobQueue;
use crate::error::QueueError;

#[derive(Debug, Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of `key`, head first.
    pub fn snapshot(&self, key: &str) -> Vec<String> {
        self.lock()
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_pop(&self, key: &str) -> Option<String> {
        self.lock().get_mut(key).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, key: &str, value: &str) -> Result<(), QueueError> {
        self.lock()
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop(&self, key: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.pushed.notified();
            if let Some(v) = self.try_pop(key) {
                return Ok(Some(v));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_pop(key));
            }
        }
    }

    async fn len(&self, key: &str) -> Result<u64, QueueError> {
        Ok(self.lock().get(key).map_or(0, |l| l.len() as u64))
    }

    async fn drain_into(&self, from: &str, to: &str) -> Result<u64, QueueError> {
        let mut lists = self.lock();
        let drained: Vec<String> = lists
            .get_mut(from)
            .map(|l| l.drain(..).collect())
            .unwrap_or_default();
        let n = drained.len() as u64;
        lists.entry(to.to_string()).or_default().extend(drained);
        drop(lists);
        if n > 0 {
            self.pushed.notify_waiters();
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let q = MemoryQueue::new();
        q.push("upload", "/a").await.unwrap();
        q.push("upload", "/b").await.unwrap();
        assert_eq!(q.len("upload").await.unwrap(), 2);
        let t = Duration::from_millis(10);
        assert_eq!(q.pop("upload", t).await.unwrap().as_deref(), Some("/a"));
        assert_eq!(q.pop("upload", t).await.unwrap().as_deref(), Some("/b"));
        assert_eq!(q.pop("upload", t).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let q = std::sync::Arc::new(MemoryQueue::new());
        let producer = q.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("upload", "/late").await.unwrap();
        });
        let got = q.pop("upload", Duration::from_secs(5)).await.unwrap();
        assert_eq!(got.as_deref(), Some("/late"));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn drain_appends_in_order() {
        let q = MemoryQueue::new();
        q.push("upload", "/x").await.unwrap();
        q.push("failed", "/f1").await.unwrap();
        q.push("failed", "/f2").await.unwrap();
        assert_eq!(q.drain_into("failed", "upload").await.unwrap(), 2);
        assert_eq!(q.snapshot("upload"), vec!["/x", "/f1", "/f2"]);
        assert_eq!(q.len("failed").await.unwrap(), 0);
        assert_eq!(q.drain_into("failed", "upload").await.unwrap(), 0);
    }
}
