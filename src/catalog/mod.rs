//! Blob metadata catalog.
//!
//! The catalog records which logical identifiers have been claimed and
//! where their bytes live.  Storage backends never consult it; the
//! [`crate::service::BlobService`] claims an id before storing any bytes
//! and completes the claim with a [`BlobRecord`] afterwards.
//! [`sqlite::SqliteCatalog`] persists records, [`memory::MemoryCatalog`]
//! keeps them in process.

pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Metadata for one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Logical identifier chosen by the caller.
    pub id: String,
    /// Backend name the bytes were written to.
    pub backend: String,
    /// 64-char hex storage key.
    pub storage_key: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the stored bytes.
    pub checksum_sha256: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Returned (inside `anyhow::Error`) when an id is already claimed.
#[derive(Debug, Error)]
#[error("blob id {id:?} is already claimed")]
pub struct CatalogConflict {
    pub id: String,
}

/// Boxed future returned by catalog operations.
pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Identifier-to-record mapping consumed by the upload/download flow.
///
/// An id moves from absent to claimed (`claim`) to recorded (`record`).
/// A claim that is never completed can be dropped with `release`.
pub trait MetadataCatalog: Send + Sync + 'static {
    /// Whether `id` is claimed or recorded.
    fn exists(&self, id: &str) -> CatalogFuture<'_, bool>;

    /// Reserve `id` if nothing claims it yet.
    ///
    /// Fails with [`CatalogConflict`] when the id is already claimed or
    /// recorded.
    fn claim(&self, id: &str) -> CatalogFuture<'_, ()>;

    /// Store `record`, completing a pending claim on its id or inserting
    /// it if the id is absent.
    ///
    /// Fails with [`CatalogConflict`] if a record already exists; the
    /// existing record is left untouched.
    fn record(&self, record: BlobRecord) -> CatalogFuture<'_, ()>;

    /// Drop a pending claim on `id`. Recorded ids are left alone.
    fn release(&self, id: &str) -> CatalogFuture<'_, ()>;

    /// The completed record for `id`, if any. Pending claims are `None`.
    fn lookup(&self, id: &str) -> CatalogFuture<'_, Option<BlobRecord>>;
}

/// Whether `err` is a [`CatalogConflict`].
pub fn is_conflict(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CatalogConflict>().is_some()
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str) -> BlobRecord {
    BlobRecord {
        id: id.to_string(),
        backend: "local".to_string(),
        storage_key: crate::keys::derive_key(id),
        size_bytes: 5,
        checksum_sha256: crate::keys::derive_key("hello"),
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
    }
}
