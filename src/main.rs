//! blobvault command-line interface.
//!
//! Logs go to stderr so stdout only ever carries command output.
//! Exit codes: 0 success, 1 error, 2 not found, 3 identifier already claimed.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use base64::Engine;
use blobvault::errors::BlobError;
use blobvault::storage::backend::StorageBackend;
use blobvault::AppState;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

const EXIT_NOT_FOUND: u8 = 2;
const EXIT_ALREADY_EXISTS: u8 = 3;

/// Command-line arguments for blobvault.
#[derive(Parser, Debug)]
#[command(
    name = "blobvault",
    version,
    about = "Content-addressed blob storage over local, SQLite, S3 or FTP backends"
)]
struct Cli {
    /// Path to the YAML configuration file (optional).
    #[arg(short, long, default_value = "blobvault.yaml")]
    config: String,

    /// Print storage metrics (Prometheus text format) to stderr on exit.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the storage key an identifier maps to.
    Key { id: String },

    /// Claim an identifier and store bytes under it.
    Put {
        id: String,
        /// Read the payload from this file.
        #[arg(long, conflicts_with = "base64", required_unless_present = "base64")]
        file: Option<PathBuf>,
        /// Payload given inline as standard base64.
        #[arg(long)]
        base64: Option<String>,
    },

    /// Fetch raw bytes by storage key.
    Get {
        key: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fetch checksum-verified bytes by identifier.
    Download {
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete bytes by storage key. Succeeds if already absent.
    Rm { key: String },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Write the payload to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print the payload as base64.
    #[arg(long)]
    base64: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match blobvault::config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);
    debug!("configuration loaded from {}", cli.config);

    let metrics = if cli.metrics {
        blobvault::metrics::init_metrics()
    } else {
        None
    };

    let code = match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    };

    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }
    code
}

fn init_tracing(logging: &blobvault::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Command, config: blobvault::config::Config) -> anyhow::Result<ExitCode> {
    let open = move || -> anyhow::Result<AppState> {
        let state = AppState::from_config(config)?;
        info!("using {} storage backend", state.storage.name());
        Ok(state)
    };

    match command {
        // Needs neither a backend nor a catalog.
        Command::Key { id } => {
            blobvault::keys::validate_identifier(&id)?;
            println!("{}", blobvault::keys::derive_key(&id));
            Ok(ExitCode::SUCCESS)
        }

        Command::Put { id, file, base64 } => {
            let data = match (file, base64) {
                (Some(path), _) => Bytes::from(tokio::fs::read(&path).await.map_err(|e| {
                    anyhow::anyhow!("cannot read {}: {e}", path.display())
                })?),
                (None, Some(encoded)) => Bytes::from(
                    base64::engine::general_purpose::STANDARD
                        .decode(encoded.trim())
                        .map_err(|e| anyhow::anyhow!("invalid base64 payload: {e}"))?,
                ),
                (None, None) => anyhow::bail!("either --file or --base64 is required"),
            };

            let service = open()?.blob_service()?;
            match service.upload(&id, data).await {
                Ok(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e @ BlobError::AlreadyExists { .. }) => {
                    eprintln!("{e}");
                    Ok(ExitCode::from(EXIT_ALREADY_EXISTS))
                }
                Err(e) => Err(e.into()),
            }
        }

        Command::Get { key, output } => match open()?.storage.fetch(&key).await? {
            Some(data) => {
                emit(&data, &output).await?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("no blob stored under key {key}");
                Ok(ExitCode::from(EXIT_NOT_FOUND))
            }
        },

        Command::Download { id, output } => match open()?.blob_service()?.download(&id).await {
            Ok((_, data)) => {
                emit(&data, &output).await?;
                Ok(ExitCode::SUCCESS)
            }
            Err(e @ BlobError::NotFound { .. }) => {
                eprintln!("{e}");
                Ok(ExitCode::from(EXIT_NOT_FOUND))
            }
            Err(e) => Err(e.into()),
        },

        Command::Rm { key } => {
            open()?.storage.remove(&key).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Write a payload to `--out`, or to stdout raw or as base64.
async fn emit(data: &[u8], output: &OutputArgs) -> anyhow::Result<()> {
    if let Some(path) = &output.out {
        if output.base64 {
            let encoded = base64::engine::general_purpose::STANDARD.encode(data);
            tokio::fs::write(path, encoded).await?;
        } else {
            tokio::fs::write(path, data).await?;
        }
        info!("wrote {} bytes to {}", data.len(), path.display());
        return Ok(());
    }

    if output.base64 {
        println!("{}", base64::engine::general_purpose::STANDARD.encode(data));
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(data)?;
        stdout.flush()?;
    }
    Ok(())
}
