//! In-process session store. Descriptors are kept serialized, the same way
//! the persistent backends hold them.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{SessionStore, UploadSession};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store an already-serialized descriptor as-is, without validating it.
    pub fn insert_raw(&self, path: &str, json: &str) {
        self.lock().insert(path.to_string(), json.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, path: &str) -> Result<Option<UploadSession>, StoreError> {
        match self.lock().get(path) {
            Some(json) => Ok(Some(UploadSession::from_json(json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, path: &str, session: &UploadSession) -> Result<(), StoreError> {
        let json = session.to_json()?;
        self.lock().insert(path.to_string(), json);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.lock().remove(path);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_delete() {
        let store = MemorySessionStore::new();
        assert!(store.get("/a").await.unwrap().is_none());

        let s = UploadSession::new("https://up/1");
        store.set("/a", &s).await.unwrap();
        assert_eq!(store.get("/a").await.unwrap(), Some(s));
        assert_eq!(store.list().await.unwrap(), vec!["/a".to_string()]);

        store.delete("/a").await.unwrap();
        assert!(store.get("/a").await.unwrap().is_none());
        assert!(store.is_empty());
        // deleting an absent key is fine
        store.delete("/a").await.unwrap();
    }
}
