//! Upload/download orchestration.
//!
//! Wraps a storage backend and a metadata catalog into the two flows
//! callers actually use: claim an identifier and store its bytes, or
//! look an identifier up and return verified bytes.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{is_conflict, BlobRecord, MetadataCatalog};
use crate::errors::BlobError;
use crate::keys::{derive_key, validate_identifier};
use crate::storage::backend::StorageBackend;

pub struct BlobService {
    backend: Arc<dyn StorageBackend>,
    catalog: Arc<dyn MetadataCatalog>,
}

impl BlobService {
    pub fn new(backend: Arc<dyn StorageBackend>, catalog: Arc<dyn MetadataCatalog>) -> Self {
        Self { backend, catalog }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Storage key `id` maps to.
    pub fn key_for(&self, id: &str) -> Result<String, BlobError> {
        validate_identifier(id)?;
        Ok(derive_key(id))
    }

    /// Claim `id` and store `data` under it.
    ///
    /// The id is claimed in the catalog before any bytes are written, so
    /// of several racing uploads only the one holding the claim touches
    /// the backend; the others get `AlreadyExists`.  A failed store or
    /// record releases the claim again.
    pub async fn upload(&self, id: &str, data: Bytes) -> Result<BlobRecord, BlobError> {
        validate_identifier(id)?;
        match self.catalog.claim(id).await {
            Ok(()) => {}
            Err(e) if is_conflict(&e) => {
                return Err(BlobError::AlreadyExists { id: id.to_string() })
            }
            Err(e) => return Err(BlobError::Catalog(e)),
        }
        debug!("claimed id={:?}", id);

        match self.store_claimed(id, data).await {
            Ok(record) => {
                info!(
                    "uploaded blob id={:?} key={} size={} backend={}",
                    record.id, record.storage_key, record.size_bytes, record.backend
                );
                Ok(record)
            }
            Err(err) => {
                if let Err(e) = self.catalog.release(id).await {
                    warn!("failed to release claim on id={:?}: {e:#}", id);
                }
                Err(err)
            }
        }
    }

    async fn store_claimed(&self, id: &str, data: Bytes) -> Result<BlobRecord, BlobError> {
        let checksum_sha256 = hex::encode(Sha256::digest(&data));
        let size_bytes = data.len() as u64;
        let storage_key = self.backend.store(id, data).await?;

        let record = BlobRecord {
            id: id.to_string(),
            backend: self.backend.name().to_string(),
            storage_key,
            size_bytes,
            checksum_sha256,
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };

        match self.catalog.record(record.clone()).await {
            Ok(()) => Ok(record),
            Err(e) if is_conflict(&e) => {
                warn!("id={:?} was recorded while its claim was held", id);
                Err(BlobError::AlreadyExists { id: id.to_string() })
            }
            Err(e) => Err(BlobError::Catalog(e)),
        }
    }

    /// Look up `id` and return its record with checksum-verified bytes.
    pub async fn download(&self, id: &str) -> Result<(BlobRecord, Bytes), BlobError> {
        let not_found = || BlobError::NotFound { id: id.to_string() };

        let record = self.catalog.lookup(id).await?.ok_or_else(not_found)?;
        debug!("download id={:?} key={}", id, record.storage_key);

        let data = self
            .backend
            .fetch(&record.storage_key)
            .await?
            .ok_or_else(not_found)?;

        let actual = hex::encode(Sha256::digest(&data));
        if actual != record.checksum_sha256 {
            return Err(BlobError::ChecksumMismatch {
                id: id.to_string(),
                expected: record.checksum_sha256,
                actual,
            });
        }
        Ok((record, data))
    }
}
