//! blobvault: content-addressed blob storage over interchangeable backends.
//!
//! Logical identifiers are hashed into storage keys ([`keys`]) and the
//! bytes are persisted by one of four backends ([`storage`]): a local
//! directory, a SQLite table, an S3-compatible object store signed with
//! SigV4 ([`auth`]) or an FTP server ([`ftp`]).  The [`service`] layer
//! adds identifier claiming and checksum verification on top of a
//! metadata [`catalog`].

use std::sync::Arc;

pub mod auth;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod ftp;
pub mod keys;
pub mod metrics;
pub mod service;
pub mod storage;

use crate::catalog::sqlite::SqliteCatalog;
use crate::config::Config;
use crate::service::BlobService;
use crate::storage::Backend;

/// Everything a process needs, built once from configuration.
///
/// The catalog is only opened for the flows that need it, so raw
/// key-level commands never create the catalog database.
pub struct AppState {
    pub config: Config,
    /// The selected storage backend.
    pub storage: Arc<Backend>,
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let storage = Arc::new(Backend::from_config(&config.storage)?);
        Ok(Self { config, storage })
    }

    /// Upload/download flow over `storage` and the SQLite catalog at
    /// `catalog.path`.
    pub fn blob_service(&self) -> anyhow::Result<BlobService> {
        let catalog = Arc::new(SqliteCatalog::open(&self.config.catalog.path)?);
        Ok(BlobService::new(self.storage.clone(), catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::StorageBackend;
    use bytes::Bytes;

    fn local_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.local.dir = dir.join("blobs").to_string_lossy().into_owned();
        config.catalog.path = dir.join("meta").join("catalog.db").to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_backend_only_state_leaves_catalog_alone() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(local_config(dir.path())).unwrap();

        let key = state.storage.store("doc", Bytes::from("x")).await.unwrap();
        assert_eq!(state.storage.fetch(&key).await.unwrap(), Some(Bytes::from("x")));
        state.storage.remove(&key).await.unwrap();
        assert!(!dir.path().join("meta").exists());
    }

    #[tokio::test]
    async fn test_blob_service_opens_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(local_config(dir.path())).unwrap();

        let service = state.blob_service().unwrap();
        service.upload("doc", Bytes::from("x")).await.unwrap();
        assert!(dir.path().join("meta").join("catalog.db").exists());

        // A second service over the same file sees the record.
        let (_, data) = state.blob_service().unwrap().download("doc").await.unwrap();
        assert_eq!(data, Bytes::from("x"));
    }
}
