//! Local administration CLI for a package registry data directory.
//!
//! Operates directly on the configured directories, without a server.
//! Results are printed as pretty JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use pkg_registry::store::open_file_stream;
use pkg_registry::{ByteStream, Coordinator, RegistryConfig, UploadRequest};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "pkg-registry")]
#[command(about = "Agent package registry - local storage administration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory; overrides the configured storage directories
    #[arg(long, global = true)]
    data: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all packages
    List,

    /// Show one package and its metadata
    Show { name: String },

    /// List versions of a package, or show one version
    Versions { name: String, version: Option<String> },

    /// Upload a local file as a package version
    Upload {
        name: String,
        version: String,
        path: PathBuf,

        /// Stored filename (defaults to the file's own name)
        #[arg(long)]
        filename: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        author_email: Option<String>,
    },

    /// Download a stored file
    Download {
        name: String,
        version: String,
        filename: String,

        /// Output path (defaults to ./<filename>)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete a stored file
    Delete {
        name: String,
        version: String,
        filename: String,
    },

    /// Re-hash stored files and compare with recorded hashes
    Verify { name: String },

    /// Show package, version and file counts
    Status,
}

#[derive(Serialize)]
struct DownloadSummary {
    file: String,
    size: u64,
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = pkg_logging::init_subscriber();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.data.as_deref())?;
    let registry = Coordinator::open(&config)
        .await
        .context("Failed to open registry storage")?;

    match cli.command {
        Commands::List => print_json(&registry.list_packages().await?),

        Commands::Show { name } => print_json(&registry.get_package(&name).await?),

        Commands::Versions { name, version: None } => {
            print_json(&registry.list_versions(&name).await?)
        }

        Commands::Versions {
            name,
            version: Some(version),
        } => print_json(&registry.get_version(&name, &version).await?),

        Commands::Upload {
            name,
            version,
            path,
            filename,
            description,
            author,
            author_email,
        } => {
            let filename = filename
                .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_default();
            let stream = open_file_stream(&path, config.chunk_size_bytes())
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let request = UploadRequest {
                description,
                author,
                author_email,
            };

            let response = registry
                .upload(&name, &version, &filename, stream, request)
                .await?;
            print_json(&response)
        }

        Commands::Download {
            name,
            version,
            filename,
            output,
        } => {
            let download = registry.download(&name, &version, &filename).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&download.filename));
            save_stream(download.stream, &path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            print_json(&DownloadSummary {
                file: download.filename,
                size: download.size,
                path,
            })
        }

        Commands::Delete {
            name,
            version,
            filename,
        } => print_json(&registry.delete_file(&name, &version, &filename).await?),

        Commands::Verify { name } => {
            let report = registry.verify_package(&name).await?;
            print_json(&report)?;
            anyhow::ensure!(
                report.is_clean(),
                "{} file(s) do not match their recorded hash",
                report.mismatched
            );
            Ok(())
        }

        Commands::Status => print_json(&registry.status().await?),
    }
}

/// Config file, then environment overrides, then `--data`.
fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> Result<RegistryConfig> {
    let mut config = match path {
        Some(path) => RegistryConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RegistryConfig::load_or_default("config.json")?,
    };
    config.apply_env_overrides();

    if let Some(data_dir) = data_dir {
        config = config.with_data_dir(data_dir);
    }
    Ok(config)
}

/// Write `stream` to `path` via a sibling temp file, so `path` only ever
/// holds a complete download.
async fn save_stream(mut stream: ByteStream, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let (file, staged) = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(dir)?
        .into_parts();

    let mut file = tokio::fs::File::from_std(file);
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
