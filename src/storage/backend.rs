//! Abstract storage backend trait.
//!
//! Every storage backend must implement [`StorageBackend`].  Backends
//! only ever see derived storage keys; the logical identifier is hashed
//! once, in the provided [`StorageBackend::store`] method, so every
//! variant derives keys identically.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use crate::errors::StorageResult;
use crate::keys::{derive_key, validate_identifier};

/// Boxed future returned by backend operations.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Async blob storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Short backend name (`local`, `db`, `s3`, `ftp`) for logs and records.
    fn name(&self) -> &'static str;

    /// Persist `data` at `storage_key`, replacing any existing payload.
    fn write(&self, storage_key: &str, data: Bytes) -> StorageFuture<'_, ()>;

    /// Read the payload at `storage_key`, or `None` if nothing is stored there.
    fn fetch(&self, storage_key: &str) -> StorageFuture<'_, Option<Bytes>>;

    /// Delete the payload at `storage_key`.  Deleting an absent key succeeds.
    fn remove(&self, storage_key: &str) -> StorageFuture<'_, ()>;

    /// Derive the storage key for `identifier`, write `data` there and
    /// return the key.  Storing twice under one identifier overwrites.
    fn store(&self, identifier: &str, data: Bytes) -> StorageFuture<'_, String> {
        let checked = validate_identifier(identifier).map(|()| derive_key(identifier));
        Box::pin(async move {
            let storage_key = checked?;
            self.write(&storage_key, data).await?;
            Ok(storage_key)
        })
    }
}
