//! Blob storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where bytes
//! physically live: a local directory, a SQLite table, an S3-compatible
//! object store or an FTP server.  [`Backend`] is the closed set of
//! those variants, selected once from configuration at startup.

pub mod backend;
pub mod ftp;
pub mod local;
pub mod s3;
pub mod sqlite;

use bytes::Bytes;
use std::time::Instant;
use tracing::info;

use crate::config::{BackendKind, StorageConfig};
use crate::errors::StorageResult;
use crate::metrics::{self, Outcome};
use backend::{StorageBackend, StorageFuture};

/// The configured storage backend.
///
/// Implements [`StorageBackend`] by delegating to the selected variant
/// and recording operation metrics around every call.
pub enum Backend {
    Local(local::LocalBackend),
    Db(sqlite::SqliteBackend),
    S3(s3::S3Backend),
    Ftp(ftp::FtpBackend),
}

impl Backend {
    /// Build the backend named by `config.backend`.
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        let backend = match config.kind()? {
            BackendKind::Local => Backend::Local(local::LocalBackend::new(&config.local.dir)),
            BackendKind::Db => Backend::Db(sqlite::SqliteBackend::open(&config.db.path)?),
            BackendKind::S3 => {
                let s3 = config.s3.clone().ok_or_else(|| {
                    anyhow::anyhow!("storage.backend is 's3' but storage.s3 config section is missing")
                })?;
                Backend::S3(s3::S3Backend::new(s3)?)
            }
            BackendKind::Ftp => {
                let ftp = config.ftp.clone().ok_or_else(|| {
                    anyhow::anyhow!(
                        "storage.backend is 'ftp' but storage.ftp config section is missing"
                    )
                })?;
                Backend::Ftp(ftp::FtpBackend::new(ftp))
            }
        };
        info!("storage backend selected: {}", backend.name());
        Ok(backend)
    }

    fn inner(&self) -> &dyn StorageBackend {
        match self {
            Backend::Local(b) => b,
            Backend::Db(b) => b,
            Backend::S3(b) => b,
            Backend::Ftp(b) => b,
        }
    }
}

fn outcome_of<T>(result: &StorageResult<T>) -> Outcome {
    match result {
        Ok(_) => Outcome::Ok,
        Err(_) => Outcome::Error,
    }
}

impl StorageBackend for Backend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn write(&self, storage_key: &str, data: Bytes) -> StorageFuture<'_, ()> {
        let name = self.name();
        let len = data.len();
        let op = self.inner().write(storage_key, data);
        Box::pin(async move {
            let start = Instant::now();
            let result = op.await;
            metrics::record_operation(name, "write", outcome_of(&result), start.elapsed());
            if result.is_ok() {
                metrics::record_bytes_written(name, len);
            }
            result
        })
    }

    fn fetch(&self, storage_key: &str) -> StorageFuture<'_, Option<Bytes>> {
        let name = self.name();
        let op = self.inner().fetch(storage_key);
        Box::pin(async move {
            let start = Instant::now();
            let result = op.await;
            let outcome = match &result {
                Ok(Some(data)) => {
                    metrics::record_bytes_read(name, data.len());
                    Outcome::Ok
                }
                Ok(None) => Outcome::NotFound,
                Err(_) => Outcome::Error,
            };
            metrics::record_operation(name, "fetch", outcome, start.elapsed());
            result
        })
    }

    fn remove(&self, storage_key: &str) -> StorageFuture<'_, ()> {
        let name = self.name();
        let op = self.inner().remove(storage_key);
        Box::pin(async move {
            let start = Instant::now();
            let result = op.await;
            metrics::record_operation(name, "remove", outcome_of(&result), start.elapsed());
            result
        })
    }
}
