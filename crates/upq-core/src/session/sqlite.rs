//! SQLite-backed session store, for hosts that keep descriptors on local disk
//! instead of in Redis. One row per source path; writes are upserts.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{SessionStore, UploadSession};
use crate::error::StoreError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: Pool<Sqlite>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Sqlite(sqlx::Error::Io(e)))?;
            }
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database; contents vanish with the store.
    pub async fn open_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                path TEXT PRIMARY KEY NOT NULL,
                descriptor TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, path: &str) -> Result<Option<UploadSession>, StoreError> {
        let row = sqlx::query("SELECT descriptor FROM sessions WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("descriptor")?;
                Ok(Some(UploadSession::from_json(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, path: &str, session: &UploadSession) -> Result<(), StoreError> {
        let json = session.to_json()?;
        sqlx::query(
            r#"
            INSERT INTO sessions (path, descriptor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                descriptor = excluded.descriptor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(json)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT path FROM sessions ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("path").map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::PendingRange;

    #[tokio::test]
    async fn upsert_get_delete() {
        let store = SqliteSessionStore::open_memory().await.unwrap();
        assert!(store.get("/data/a.bin").await.unwrap().is_none());

        let mut s = UploadSession::new("https://up.example/1");
        store.set("/data/a.bin", &s).await.unwrap();
        s.next_expected_ranges = Some(vec![PendingRange::open(5_242_880)]);
        store.set("/data/a.bin", &s).await.unwrap();

        let got = store.get("/data/a.bin").await.unwrap().unwrap();
        assert_eq!(got.resume_offset(), Some(5_242_880));
        assert_eq!(store.list().await.unwrap(), vec!["/data/a.bin".to_string()]);

        store.delete("/data/a.bin").await.unwrap();
        assert!(store.get("/data/a.bin").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_at_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state dir/sessions.db");
        {
            let store = SqliteSessionStore::open_at(&db).await.unwrap();
            store.set("/x", &UploadSession::new("u")).await.unwrap();
        }
        let store = SqliteSessionStore::open_at(&db).await.unwrap();
        assert_eq!(store.get("/x").await.unwrap(), Some(UploadSession::new("u")));
    }

    #[test]
    fn uri_escapes_spaces() {
        assert_eq!(
            path_to_sqlite_uri(Path::new("/tmp/a b#c.db")),
            "sqlite:///tmp/a%20b%23c.db"
        );
    }
}
