//! Relational table storage backend (SQLite).
//!
//! Each blob is one row of the `blob_data_store` table, keyed by storage
//! key, holding the raw bytes and a last-write timestamp.  Every call is a
//! single-row statement; there are no multi-key transactions.
//!
//! Because `rusqlite::Connection` is `!Sync`, we wrap it in a
//! `std::sync::Mutex` behind an `Arc` and use `tokio::task::spawn_blocking`
//! for every database operation.

use bytes::Bytes;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::backend::{StorageBackend, StorageFuture};
use crate::errors::{StorageError, StorageResult};
use crate::keys::check_storage_key;

const BACKEND: &str = "db";

/// SQLite-backed blob storage.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a SQLite database at `db_path` and initialise
    /// the blob table.
    ///
    /// Configures WAL journal mode and a 5-second busy timeout so that
    /// concurrent processes sharing the file serialise on row writes.
    pub fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA busy_timeout=5000;\
             PRAGMA synchronous=NORMAL;",
        )?;
        info!("SQLite storage backend: path={}", db_path.display());
        Self::from_connection(conn)
    }

    /// Wrap an already-open connection, creating the blob table if needed.
    pub fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blob_data_store (\
                 key        TEXT PRIMARY KEY NOT NULL,\
                 data       BLOB NOT NULL,\
                 updated_at TEXT NOT NULL\
             );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard: MutexGuard<'_, Connection> = conn
                .lock()
                .map_err(|e| StorageError::unavailable(BACKEND, format!("mutex poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::unavailable(BACKEND, format!("blocking task failed: {e}")))?
    }
}

/// Classify a SQLite error.  Errors meaning the database itself cannot be
/// used are `BackendUnavailable`; anything else is attributed to the
/// operation via `op_failed`.
fn classify(err: rusqlite::Error, op_failed: fn(&'static str, String) -> StorageError) -> StorageError {
    let unusable = matches!(
        &err,
        rusqlite::Error::SqliteFailure(failure, _) if matches!(
            failure.code,
            ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
        )
    );
    if unusable {
        return StorageError::unavailable(BACKEND, err);
    }
    op_failed(BACKEND, err.to_string())
}

fn read_failed(backend: &'static str, message: String) -> StorageError {
    StorageError::read_failed(backend, message)
}

fn write_failed(backend: &'static str, message: String) -> StorageError {
    StorageError::write_failed(backend, message)
}

// ── StorageBackend implementation ──────────────────────────────────────

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn write(&self, storage_key: &str, data: Bytes) -> StorageFuture<'_, ()> {
        let key = storage_key.to_string();
        Box::pin(async move {
            check_storage_key(&key)?;
            debug!("db write: key={} bytes={}", key, data.len());
            let updated_at = chrono::Utc::now().to_rfc3339();
            self.with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO blob_data_store (key, data, updated_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                    params![key, &data[..], updated_at],
                )
                .map_err(|e| classify(e, write_failed))?;
                Ok(())
            })
            .await
        })
    }

    fn fetch(&self, storage_key: &str) -> StorageFuture<'_, Option<Bytes>> {
        let key = storage_key.to_string();
        Box::pin(async move {
            check_storage_key(&key)?;
            debug!("db fetch: key={}", key);
            let row = self
                .with_conn(move |conn| {
                    conn.query_row(
                        "SELECT data FROM blob_data_store WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()
                    .map_err(|e| classify(e, read_failed))
                })
                .await?;
            Ok(row.map(Bytes::from))
        })
    }

    fn remove(&self, storage_key: &str) -> StorageFuture<'_, ()> {
        let key = storage_key.to_string();
        Box::pin(async move {
            check_storage_key(&key)?;
            debug!("db remove: key={}", key);
            // Zero affected rows is fine: delete is idempotent.
            self.with_conn(move |conn| {
                conn.execute("DELETE FROM blob_data_store WHERE key = ?1", params![key])
                    .map_err(|e| classify(e, write_failed))?;
                Ok(())
            })
            .await
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_key;

    fn test_backend() -> (tempfile::TempDir, SqliteBackend) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("blobs.db");
        let backend = SqliteBackend::open(&db_path).expect("failed to create backend");
        (dir, backend)
    }

    fn row_timestamp(backend: &SqliteBackend, key: &str) -> String {
        let conn = backend.conn.lock().unwrap();
        conn.query_row(
            "SELECT updated_at FROM blob_data_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_and_fetch_roundtrip() {
        let (_dir, backend) = test_backend();

        let data = Bytes::from("hello world");
        let key = backend.store("greeting", data.clone()).await.unwrap();
        assert_eq!(key, derive_key("greeting"));
        assert_eq!(backend.fetch(&key).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_store_empty_and_all_byte_values() {
        let (_dir, backend) = test_backend();

        let key = backend.store("empty", Bytes::new()).await.unwrap();
        assert_eq!(backend.fetch(&key).await.unwrap(), Some(Bytes::new()));

        let every_byte: Vec<u8> = (0..=255u8).collect();
        let key = backend
            .store("binary", Bytes::from(every_byte.clone()))
            .await
            .unwrap();
        assert_eq!(backend.fetch(&key).await.unwrap().unwrap(), every_byte);
    }

    #[tokio::test]
    async fn test_store_upserts_row() {
        let (_dir, backend) = test_backend();

        let key = backend.store("doc", Bytes::from("v1")).await.unwrap();
        let first_ts = row_timestamp(&backend, &key);
        backend.store("doc", Bytes::from("v2")).await.unwrap();

        assert_eq!(backend.fetch(&key).await.unwrap(), Some(Bytes::from("v2")));
        assert!(row_timestamp(&backend, &key) >= first_ts);

        let count: i64 = backend
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM blob_data_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_fetch_missing_returns_none() {
        let (_dir, backend) = test_backend();
        assert!(backend.fetch(&"0".repeat(64)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_dir, backend) = test_backend();
        let key = backend.store("gone", Bytes::from("data")).await.unwrap();

        backend.remove(&key).await.unwrap();
        backend.remove(&key).await.unwrap();
        assert!(backend.fetch(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_connection_in_memory() {
        let conn = Connection::open_in_memory().unwrap();
        let backend = SqliteBackend::from_connection(conn).unwrap();

        let key = backend.store("mem", Bytes::from("abc")).await.unwrap();
        assert_eq!(backend.fetch(&key).await.unwrap(), Some(Bytes::from("abc")));
    }

    #[tokio::test]
    async fn test_malformed_key_rejected() {
        let (_dir, backend) = test_backend();
        let result = backend.fetch("abc123").await;
        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_missing_table_is_read_failure() {
        let (_dir, backend) = test_backend();
        backend
            .conn
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE blob_data_store;")
            .unwrap();

        let result = backend.fetch(&"0".repeat(64)).await;
        assert!(matches!(result, Err(StorageError::BackendReadFailed { .. })));
    }
}
