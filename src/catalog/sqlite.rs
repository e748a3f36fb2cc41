//! SQLite-backed catalog.
//!
//! Records live in a single `blob_metadata` table whose primary key is
//! the logical identifier, so claiming an id is one conditional insert.
//! A claimed id is a row with `recorded = 0` and empty record columns.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{BlobRecord, CatalogConflict, CatalogFuture, MetadataCatalog};

/// Catalog backed by a single SQLite database file.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog at `path`.
    ///
    /// Passing `":memory:"` creates an in-memory database.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Self::init(conn)
    }

    /// Idempotent; safe to run on every startup.
    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS blob_metadata (
                id              TEXT PRIMARY KEY NOT NULL,
                backend         TEXT NOT NULL,
                storage_key     TEXT NOT NULL,
                size_bytes      INTEGER NOT NULL,
                checksum_sha256 TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                recorded        INTEGER NOT NULL DEFAULT 1
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MetadataCatalog for SqliteCatalog {
    fn exists(&self, id: &str) -> CatalogFuture<'_, bool> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM blob_metadata WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    fn claim(&self, id: &str) -> CatalogFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let inserted = conn.execute(
                "INSERT INTO blob_metadata
                     (id, backend, storage_key, size_bytes, checksum_sha256, created_at, recorded)
                 VALUES (?1, '', '', 0, '', ?2, 0)
                 ON CONFLICT(id) DO NOTHING",
                params![id, chrono::Utc::now().to_rfc3339()],
            )?;
            if inserted == 0 {
                return Err(CatalogConflict { id }.into());
            }
            Ok(())
        })
    }

    fn record(&self, record: BlobRecord) -> CatalogFuture<'_, ()> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            // Completes a pending claim; an existing record makes the
            // WHERE false and nothing changes.
            let changed = conn.execute(
                "INSERT INTO blob_metadata
                     (id, backend, storage_key, size_bytes, checksum_sha256, created_at, recorded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                 ON CONFLICT(id) DO UPDATE SET
                     backend = excluded.backend,
                     storage_key = excluded.storage_key,
                     size_bytes = excluded.size_bytes,
                     checksum_sha256 = excluded.checksum_sha256,
                     created_at = excluded.created_at,
                     recorded = 1
                 WHERE blob_metadata.recorded = 0",
                params![
                    record.id,
                    record.backend,
                    record.storage_key,
                    record.size_bytes as i64,
                    record.checksum_sha256,
                    record.created_at,
                ],
            )?;
            if changed == 0 {
                return Err(CatalogConflict { id: record.id }.into());
            }
            Ok(())
        })
    }

    fn release(&self, id: &str) -> CatalogFuture<'_, ()> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "DELETE FROM blob_metadata WHERE id = ?1 AND recorded = 0",
                params![id],
            )?;
            Ok(())
        })
    }

    fn lookup(&self, id: &str) -> CatalogFuture<'_, Option<BlobRecord>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let record = conn
                .query_row(
                    "SELECT id, backend, storage_key, size_bytes, checksum_sha256, created_at
                     FROM blob_metadata WHERE id = ?1 AND recorded = 1",
                    params![id],
                    |row| {
                        Ok(BlobRecord {
                            id: row.get(0)?,
                            backend: row.get(1)?,
                            storage_key: row.get(2)?,
                            size_bytes: row.get::<_, i64>(3)? as u64,
                            checksum_sha256: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
    }
}
