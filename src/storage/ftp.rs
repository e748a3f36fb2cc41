//! FTP storage backend.
//!
//! Every call opens a fresh control connection, logs in, switches to
//! binary mode, walks into the base directory (creating it as needed),
//! performs exactly one transfer and quits.  Nothing is pooled.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::backend::{StorageBackend, StorageFuture};
use crate::config::FtpConfig;
use crate::errors::{StorageError, StorageResult};
use crate::ftp::FtpStream;
use crate::keys::check_storage_key;

const BACKEND: &str = "ftp";

/// Stores blobs as files in one directory of a remote FTP server.
pub struct FtpBackend {
    config: FtpConfig,
}

impl FtpBackend {
    pub fn new(config: FtpConfig) -> Self {
        info!(
            "FTP storage backend: host={}:{} user={} dir={}",
            config.host, config.port, config.user, config.dir
        );
        Self { config }
    }

    /// Connect, authenticate and enter the base directory.
    ///
    /// Any failure here happens before a data operation, so it is
    /// reported as `BackendUnavailable`.
    async fn open_session(&self) -> StorageResult<FtpStream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let mut ftp = FtpStream::connect(&addr)
            .await
            .map_err(|e| StorageError::unavailable(BACKEND, format!("connect {addr}: {e}")))?;

        let setup = async {
            ftp.login(&self.config.user, &self.config.password).await?;
            ftp.binary().await?;
            ftp.ensure_dir(&self.config.dir).await
        };
        if let Err(e) = setup.await {
            close(ftp).await;
            return Err(StorageError::unavailable(BACKEND, e));
        }
        Ok(ftp)
    }
}

/// Send `QUIT`; a failure only gets logged.
async fn close(ftp: FtpStream) {
    if let Err(e) = ftp.quit().await {
        warn!("ftp QUIT failed: {e}");
    }
}

impl StorageBackend for FtpBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn write(&self, storage_key: &str, data: Bytes) -> StorageFuture<'_, ()> {
        let key = storage_key.to_string();
        Box::pin(async move {
            check_storage_key(&key)?;
            debug!("ftp write: key={} bytes={}", key, data.len());

            let mut ftp = self.open_session().await?;
            let result = ftp.put(&key, &data).await;
            close(ftp).await;

            result.map_err(|e| StorageError::write_failed(BACKEND, e))
        })
    }

    fn fetch(&self, storage_key: &str) -> StorageFuture<'_, Option<Bytes>> {
        let key = storage_key.to_string();
        Box::pin(async move {
            check_storage_key(&key)?;
            debug!("ftp fetch: key={}", key);

            let mut ftp = self.open_session().await?;
            let result = ftp.retrieve(&key).await;
            close(ftp).await;

            match result {
                Ok(buf) => Ok(Some(Bytes::from(buf))),
                Err(e) if e.is_file_unavailable() => Ok(None),
                Err(e) => Err(StorageError::read_failed(BACKEND, e)),
            }
        })
    }

    fn remove(&self, storage_key: &str) -> StorageFuture<'_, ()> {
        let key = storage_key.to_string();
        Box::pin(async move {
            check_storage_key(&key)?;
            debug!("ftp remove: key={}", key);

            let mut ftp = self.open_session().await?;
            let result = ftp.delete(&key).await;
            close(ftp).await;

            match result {
                Ok(()) => Ok(()),
                Err(e) if e.is_file_unavailable() => Ok(()),
                Err(e) => Err(StorageError::write_failed(BACKEND, e)),
            }
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::fake_server::FakeFtpServer;
    use crate::keys::derive_key;

    fn backend_for(server: &FakeFtpServer, password: &str, dir: &str) -> FtpBackend {
        FtpBackend::new(FtpConfig {
            host: server.host(),
            port: server.port(),
            user: "blobs".to_string(),
            password: password.to_string(),
            dir: dir.to_string(),
        })
    }

    #[tokio::test]
    async fn test_store_and_fetch_roundtrip() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/srv/blobs");

        let data = Bytes::from("hello over ftp");
        let key = backend.store("greeting", data.clone()).await.unwrap();
        assert_eq!(key, derive_key("greeting"));
        assert_eq!(backend.fetch(&key).await.unwrap(), Some(data));

        // One file per key, directly under the base directory.
        let state = server.state.lock().unwrap();
        assert!(state.files.contains_key(&format!("/srv/blobs/{key}")));
        assert!(state.dirs.contains("/srv/blobs"));
    }

    #[tokio::test]
    async fn test_store_empty_and_all_byte_values() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");

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
    async fn test_store_overwrites() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");

        backend.store("doc", Bytes::from("v1")).await.unwrap();
        let key = backend.store("doc", Bytes::from("v2")).await.unwrap();
        assert_eq!(backend.fetch(&key).await.unwrap(), Some(Bytes::from("v2")));
    }

    #[tokio::test]
    async fn test_fetch_missing_returns_none() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");
        assert!(backend.fetch(&"0".repeat(64)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");
        let key = backend.store("gone", Bytes::from("data")).await.unwrap();

        backend.remove(&key).await.unwrap();
        backend.remove(&key).await.unwrap();
        assert!(backend.fetch(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connection_per_call_and_quit_always_sent() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");

        let key = backend.store("a", Bytes::from("1")).await.unwrap();
        backend.fetch(&key).await.unwrap();
        backend.fetch(&"0".repeat(64)).await.unwrap();
        backend.remove(&key).await.unwrap();

        let state = server.state.lock().unwrap();
        assert_eq!(state.sessions, 4);
        assert_eq!(state.quits, 4);
    }

    #[tokio::test]
    async fn test_rejected_login_is_unavailable() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "wrong", "/");

        let result = backend.fetch(&"0".repeat(64)).await;
        assert!(matches!(
            result,
            Err(StorageError::BackendUnavailable { backend: "ftp", .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let backend = FtpBackend::new(FtpConfig {
            host: "127.0.0.1".to_string(),
            port,
            user: "u".to_string(),
            password: "p".to_string(),
            dir: "/".to_string(),
        });

        let result = backend.store("x", Bytes::from("x")).await;
        assert!(matches!(result, Err(StorageError::BackendUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_transfer_faults_are_classified() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");
        server.state.lock().unwrap().fail_transfers = true;

        let result = backend.store("x", Bytes::from("x")).await;
        assert!(matches!(result, Err(StorageError::BackendWriteFailed { .. })));

        let result = backend.fetch(&"0".repeat(64)).await;
        assert!(matches!(result, Err(StorageError::BackendReadFailed { .. })));
    }

    #[tokio::test]
    async fn test_malformed_key_rejected_without_connecting() {
        let server = FakeFtpServer::start("blobs", "pw").await;
        let backend = backend_for(&server, "pw", "/");

        let result = backend.fetch("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
        assert_eq!(server.state.lock().unwrap().sessions, 0);
    }
}
