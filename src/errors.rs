//! Error types for the storage core.
//!
//! Backends classify every low-level fault (errno, SQLite error, HTTP
//! status, FTP reply code) into one of the [`StorageError`] kinds before
//! returning.  Absence is not an error: `fetch` reports it as `Ok(None)`.

use thiserror::Error;

/// Failure kinds surfaced by every storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Malformed identifier or storage key.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The medium could not be reached (connection refused, DNS failure,
    /// credentials rejected before any data operation).
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable {
        backend: &'static str,
        message: String,
    },

    /// A read reached the medium but failed partway.
    #[error("{backend} backend read failed: {message}")]
    BackendReadFailed {
        backend: &'static str,
        message: String,
    },

    /// A write or delete reached the medium but failed partway.
    #[error("{backend} backend write failed: {message}")]
    BackendWriteFailed {
        backend: &'static str,
        message: String,
    },
}

impl StorageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StorageError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unavailable(backend: &'static str, message: impl std::fmt::Display) -> Self {
        StorageError::BackendUnavailable {
            backend,
            message: message.to_string(),
        }
    }

    pub fn read_failed(backend: &'static str, message: impl std::fmt::Display) -> Self {
        StorageError::BackendReadFailed {
            backend,
            message: message.to_string(),
        }
    }

    pub fn write_failed(backend: &'static str, message: impl std::fmt::Display) -> Self {
        StorageError::BackendWriteFailed {
            backend,
            message: message.to_string(),
        }
    }

    /// Short label used for logs and metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::InvalidInput { .. } => "invalid_input",
            StorageError::BackendUnavailable { .. } => "backend_unavailable",
            StorageError::BackendReadFailed { .. } => "backend_read_failed",
            StorageError::BackendWriteFailed { .. } => "backend_write_failed",
        }
    }
}

/// Result alias for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from the upload/download orchestration in [`crate::service`].
#[derive(Debug, Error)]
pub enum BlobError {
    /// The identifier failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A metadata record already claims this identifier.
    #[error("blob with id {id:?} already exists")]
    AlreadyExists { id: String },

    /// No metadata record, or no backend bytes, for this identifier.
    #[error("blob with id {id:?} not found")]
    NotFound { id: String },

    /// Backend bytes no longer match the recorded checksum.
    #[error("checksum mismatch for blob {id:?}: recorded {expected}, stored {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// The storage backend failed.
    #[error(transparent)]
    Storage(StorageError),

    /// The metadata catalog failed.
    #[error("metadata catalog error: {0}")]
    Catalog(#[from] anyhow::Error),
}

impl From<StorageError> for BlobError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidInput { message } => BlobError::InvalidInput(message),
            other => BlobError::Storage(other),
        }
    }
}
