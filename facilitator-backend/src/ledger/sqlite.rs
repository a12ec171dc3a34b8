//! SQLite-backed key-value store

use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use super::memory::expiry_from_ttl;
use super::KvStore;

pub type DbConn = PooledConnection<SqliteConnectionManager>;

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) the database file and its schema.
    pub fn open(database_url: &str) -> Result<Self, String> {
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create database directory: {}", e))?;
            }
        }

        let manager = SqliteConnectionManager::file(database_url)
            .with_init(|conn| conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;"));
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| format!("Failed to open database pool: {}", e))?;

        let store = Self { pool };
        store.init_schema()?;
        log::info!("[Ledger] SQLite store ready at {}", database_url);
        Ok(store)
    }

    fn conn(&self) -> Result<DbConn, String> {
        self.pool
            .get()
            .map_err(|e| format!("Failed to get database connection: {}", e))
    }

    fn init_schema(&self) -> Result<(), String> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    expires_at INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_kv_store_expires_at ON kv_store(expires_at);",
            )
            .map_err(|e| format!("Failed to initialize schema: {}", e))
    }

    /// Delete every expired row. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, String> {
        let now = Utc::now().timestamp_millis();
        self.conn()?
            .execute(
                "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
            .map_err(|e| format!("Failed to purge expired rows: {}", e))
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        let conn = self.conn()?;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv_store WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| format!("Failed to read key '{}': {}", key, e))?;

        match row {
            Some((_, Some(expires_at))) if expires_at <= Utc::now().timestamp_millis() => {
                conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                    .map_err(|e| format!("Failed to delete expired key '{}': {}", key, e))?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), String> {
        let expires_at = expiry_from_ttl(ttl).map(|at| at.timestamp_millis());
        self.conn()?
            .execute(
                "INSERT INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .map_err(|e| format!("Failed to write key '{}': {}", key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        self.conn()?
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .map_err(|e| format!("Failed to delete key '{}': {}", key, e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_set_get_overwrite_delete() {
        let (_dir, store) = open_temp();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "one", None).await.unwrap();
        store.set("k", "two", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));

        store.delete("k").await.unwrap();
        assert!(!store.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        SqliteStore::open(path).unwrap().set("k", "v", None).await.unwrap();
        let reopened = SqliteStore::open(path).unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_ttl_and_purge() {
        let (_dir, store) = open_temp();
        store.set("short", "v", Some(Duration::from_secs(1))).await.unwrap();
        store.set("other", "v", Some(Duration::from_secs(1))).await.unwrap();
        store.set("long", "v", None).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.get("long").await.unwrap().as_deref(), Some("v"));
    }
}
