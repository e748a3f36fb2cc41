//! Storage key derivation.
//!
//! A storage key is the lowercase hex SHA-256 digest of a caller-chosen
//! identifier.  Every backend addresses blobs by this key alone, so the
//! same identifier resolves to the same physical location whichever
//! backend is active.

use sha2::{Digest, Sha256};

use crate::errors::StorageError;

/// Maximum identifier length, in characters.
pub const MAX_IDENTIFIER_CHARS: usize = 512;

/// Length of a hex-encoded SHA-256 digest.
pub const STORAGE_KEY_LEN: usize = 64;

/// Derive the storage key for `identifier`.
///
/// Hashes the UTF-8 bytes of the identifier and renders the digest as
/// lowercase hex.  Pure and total.
pub fn derive_key(identifier: &str) -> String {
    hex::encode(Sha256::digest(identifier.as_bytes()))
}

/// Reject identifiers outside `1..=512` characters.
pub fn validate_identifier(identifier: &str) -> Result<(), StorageError> {
    if identifier.is_empty() {
        return Err(StorageError::invalid_input("identifier must not be empty"));
    }
    let chars = identifier.chars().count();
    if chars > MAX_IDENTIFIER_CHARS {
        return Err(StorageError::invalid_input(format!(
            "identifier is {chars} characters, maximum is {MAX_IDENTIFIER_CHARS}"
        )));
    }
    Ok(())
}

/// Whether `key` has the shape of a derived storage key (64 lowercase hex chars).
pub fn is_storage_key(key: &str) -> bool {
    key.len() == STORAGE_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Check a caller-supplied storage key before it reaches a backend.
pub fn check_storage_key(key: &str) -> Result<(), StorageError> {
    if is_storage_key(key) {
        Ok(())
    } else {
        Err(StorageError::invalid_input(format!(
            "malformed storage key: {key:?}"
        )))
    }
}
