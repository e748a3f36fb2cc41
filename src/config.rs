//! Configuration loading and types for blobvault.
//!
//! Configuration is read from an optional YAML file, then overridden by
//! environment variables, then validated.  Each subsection governs one
//! concern: the storage backend, the metadata catalog, and logging.

use garde::Validate;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct Config {
    /// Blob storage backend settings.
    #[serde(default)]
    #[garde(dive)]
    pub storage: StorageConfig,

    /// Metadata catalog settings.
    #[serde(default)]
    #[garde(dive)]
    pub catalog: CatalogConfig,

    /// Logging settings.
    #[serde(default)]
    #[garde(dive)]
    pub logging: LoggingConfig,
}

/// The closed set of storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Db,
    S3,
    Ftp,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "db" | "table" | "sqlite" => Ok(BackendKind::Db),
            "s3" => Ok(BackendKind::S3),
            "ftp" => Ok(BackendKind::Ftp),
            other => anyhow::bail!(
                "unknown storage backend {other:?} (expected local, db, s3 or ftp)"
            ),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Local => "local",
            BackendKind::Db => "db",
            BackendKind::S3 => "s3",
            BackendKind::Ftp => "ftp",
        })
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StorageConfig {
    /// Backend type: `local`, `db` (alias `table`, `sqlite`), `s3`, `ftp`.
    #[serde(default = "default_storage_backend")]
    #[garde(custom(validate_backend_name))]
    pub backend: String,

    #[serde(default)]
    #[garde(dive)]
    pub local: LocalConfig,

    #[serde(default)]
    #[garde(dive)]
    pub db: DbConfig,

    /// Validated only when selected.
    #[serde(default)]
    #[garde(skip)]
    pub s3: Option<S3Config>,

    /// Validated only when selected.
    #[serde(default)]
    #[garde(skip)]
    pub ftp: Option<FtpConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalConfig::default(),
            db: DbConfig::default(),
            s3: None,
            ftp: None,
        }
    }
}

impl StorageConfig {
    /// The selected backend kind.
    pub fn kind(&self) -> anyhow::Result<BackendKind> {
        self.backend.parse()
    }
}

fn validate_backend_name(value: &str, _ctx: &()) -> garde::Result {
    value
        .parse::<BackendKind>()
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}

/// Local filesystem backend.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocalConfig {
    /// Base directory holding one file per storage key.
    #[serde(default = "default_local_dir")]
    #[garde(length(min = 1))]
    pub dir: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            dir: default_local_dir(),
        }
    }
}

/// SQLite table backend.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DbConfig {
    /// Database file path.
    #[serde(default = "default_db_path")]
    #[garde(length(min = 1))]
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// S3-compatible object storage backend.
#[derive(Clone, Default, Deserialize, Validate)]
pub struct S3Config {
    /// Endpoint URL, e.g. `http://10.0.0.5:9000`.
    #[serde(default)]
    #[garde(pattern(r"^https?://[^/[:space:]]+"))]
    pub endpoint: String,

    #[serde(default)]
    #[garde(length(min = 1))]
    pub bucket: String,

    #[serde(default)]
    #[garde(length(min = 1))]
    pub access_key: String,

    #[serde(default)]
    #[garde(length(min = 1))]
    pub secret_key: String,

    #[serde(default = "default_region")]
    #[garde(length(min = 1))]
    pub region: String,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// FTP backend.
#[derive(Clone, Deserialize, Validate)]
pub struct FtpConfig {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub host: String,

    #[serde(default = "default_ftp_port")]
    #[garde(range(min = 1))]
    pub port: u16,

    #[serde(default)]
    #[garde(length(min = 1))]
    pub user: String,

    #[serde(default)]
    #[garde(skip)]
    pub password: String,

    /// Remote base directory; created on demand.
    #[serde(default = "default_ftp_dir")]
    #[garde(length(min = 1))]
    pub dir: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ftp_port(),
            user: String::new(),
            password: String::new(),
            dir: default_ftp_dir(),
        }
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dir", &self.dir)
            .finish()
    }
}

/// Metadata catalog configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CatalogConfig {
    /// SQLite database file holding blob records.
    #[serde(default = "default_catalog_path")]
    #[garde(length(min = 1))]
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    #[garde(length(min = 1))]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    #[garde(pattern(r"^(text|json)$"))]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Default value functions -------------------------------------------------

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_local_dir() -> String {
    "/data/blobs".to_string()
}

fn default_db_path() -> String {
    "./data/blobs.db".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_dir() -> String {
    "/".to_string()
}

fn default_catalog_path() -> String {
    "./data/catalog.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loading -----------------------------------------------------------------

impl Config {
    /// Overlay environment variables on top of the file values.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = &mut self.storage;
        if let Some(v) = lookup("STORAGE_BACKEND") {
            storage.backend = v;
        }
        if let Some(v) = lookup("LOCAL_DIR") {
            storage.local.dir = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            storage.db.path = v;
        }

        let s3_vars = [
            "S3_ENDPOINT",
            "S3_BUCKET",
            "S3_ACCESS_KEY",
            "S3_SECRET_KEY",
            "S3_REGION",
        ];
        if s3_vars.iter().any(|k| lookup(k).is_some()) {
            let s3 = storage.s3.get_or_insert_with(|| S3Config {
                region: default_region(),
                ..S3Config::default()
            });
            if let Some(v) = lookup("S3_ENDPOINT") {
                s3.endpoint = v;
            }
            if let Some(v) = lookup("S3_BUCKET") {
                s3.bucket = v;
            }
            if let Some(v) = lookup("S3_ACCESS_KEY") {
                s3.access_key = v;
            }
            if let Some(v) = lookup("S3_SECRET_KEY") {
                s3.secret_key = v;
            }
            if let Some(v) = lookup("S3_REGION") {
                s3.region = v;
            }
        }

        let ftp_vars = ["FTP_HOST", "FTP_PORT", "FTP_USER", "FTP_PASS", "FTP_DIR"];
        if ftp_vars.iter().any(|k| lookup(k).is_some()) {
            let ftp = storage.ftp.get_or_insert_with(FtpConfig::default);
            if let Some(v) = lookup("FTP_HOST") {
                ftp.host = v;
            }
            if let Some(v) = lookup("FTP_PORT") {
                ftp.port = v
                    .parse()
                    .map_err(|e| anyhow::anyhow!("FTP_PORT {v:?} is not a port: {e}"))?;
            }
            if let Some(v) = lookup("FTP_USER") {
                ftp.user = v;
            }
            if let Some(v) = lookup("FTP_PASS") {
                ftp.password = v;
            }
            if let Some(v) = lookup("FTP_DIR") {
                ftp.dir = v;
            }
        }

        if let Some(v) = lookup("CATALOG_PATH") {
            self.catalog.path = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    /// Field-level validation plus the presence of the selected section.
    pub fn check(&self) -> anyhow::Result<BackendKind> {
        self.validate()
            .map_err(|report| anyhow::anyhow!("invalid configuration: {report}"))?;

        let kind = self.storage.kind()?;
        let section = match kind {
            BackendKind::S3 => self
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| {
                    anyhow::anyhow!("storage.backend is 's3' but storage.s3 config section is missing")
                })?
                .validate(),
            BackendKind::Ftp => self
                .storage
                .ftp
                .as_ref()
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "storage.backend is 'ftp' but storage.ftp config section is missing"
                    )
                })?
                .validate(),
            BackendKind::Local | BackendKind::Db => Ok(()),
        };
        section.map_err(|report| anyhow::anyhow!("invalid storage.{kind} configuration: {report}"))?;
        Ok(kind)
    }
}

/// Parse a YAML document into a [`Config`] (no env, no validation).
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Load configuration from `path` (if it exists), apply overrides from
/// the process environment and validate.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<P, F>(path: P, lookup: F) -> anyhow::Result<Config>
where
    P: AsRef<Path>,
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(anyhow::anyhow!("{}: {e}", path.display())),
    };
    config.apply_env_overrides(lookup)?;
    config.check()?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
