//! Local filesystem storage backend.
//!
//! Blobs are stored as flat files directly under a base directory, one
//! file per storage key, named by the hex key itself.  There is no
//! subdirectory sharding.
//!
//! All writes follow crash-only design: write to a temp file in the same
//! directory, fsync, rename.  A concurrent reader sees either the old or
//! the new file, never a partial one.

use bytes::Bytes;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backend::{StorageBackend, StorageFuture};
use crate::errors::{StorageError, StorageResult};
use crate::keys::check_storage_key;

const BACKEND: &str = "local";

/// Stores blobs on the local filesystem.
pub struct LocalBackend {
    /// Directory holding one file per storage key.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory is created lazily on the first write, so a backend
    /// can be constructed before the volume is mounted.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("Local storage backend: dir={}", root.display());
        Self { root }
    }

    /// The base directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage key to its file path.
    ///
    /// Only well-formed hex keys are accepted, so the result is always a
    /// direct child of the root.
    fn resolve(&self, storage_key: &str) -> StorageResult<PathBuf> {
        check_storage_key(storage_key)?;
        Ok(self.root.join(storage_key))
    }

    /// Unique temp path next to the final file, so the rename never
    /// crosses a filesystem boundary.
    fn temp_path(&self, storage_key: &str) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(format!(".{storage_key}.{id}.tmp"))
    }

    fn write_atomic(&self, final_path: &Path, tmp_path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = std::fs::File::create(tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(tmp_path, final_path)
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn write(&self, storage_key: &str, data: Bytes) -> StorageFuture<'_, ()> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&storage_key)?;

            std::fs::create_dir_all(&self.root).map_err(|e| {
                StorageError::unavailable(
                    BACKEND,
                    format!("cannot create {}: {e}", self.root.display()),
                )
            })?;

            let tmp_path = self.temp_path(&storage_key);
            debug!("local write: key={} bytes={}", storage_key, data.len());

            if let Err(e) = self.write_atomic(&final_path, &tmp_path, &data) {
                if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                    if cleanup.kind() != ErrorKind::NotFound {
                        warn!("failed to remove temp file {}: {cleanup}", tmp_path.display());
                    }
                }
                return Err(StorageError::write_failed(
                    BACKEND,
                    format!("{}: {e}", final_path.display()),
                ));
            }

            Ok(())
        })
    }

    fn fetch(&self, storage_key: &str) -> StorageFuture<'_, Option<Bytes>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let path = self.resolve(&storage_key)?;
            debug!("local fetch: key={}", storage_key);

            match std::fs::read(&path) {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StorageError::read_failed(
                    BACKEND,
                    format!("{}: {e}", path.display()),
                )),
            }
        })
    }

    fn remove(&self, storage_key: &str) -> StorageFuture<'_, ()> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let path = self.resolve(&storage_key)?;
            debug!("local remove: key={}", storage_key);

            // Idempotent: a missing file is already deleted.
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::write_failed(
                    BACKEND,
                    format!("{}: {e}", path.display()),
                )),
            }
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
