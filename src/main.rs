use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use pageforge::config::AppConfig;
use pageforge::state::TaskStore;
use pageforge::storage::{archive_file_name, build_archive, scan_task, ImageStore};
use pageforge::{server, Error, Result};

/// pageforge - page image generation server
#[derive(Parser, Debug)]
#[command(name = "pageforge")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    PAGEFORGE_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG              Override the log filter")]
pub struct Cli {
    /// Config file (defaults to ~/.pageforge/pageforge.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind, overrides the config file
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides the config file
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Rebuild a task's state from its history directory and print the report
    Scan {
        task_id: String,

        /// Expected page count, for reporting trailing gaps
        #[arg(long)]
        pages: Option<usize>,
    },

    /// Write a task's images to a ZIP archive
    Export {
        task_id: String,

        /// Output path (defaults to <title>.zip in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Title used for the default archive name
        #[arg(short, long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pageforge::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => run_serve(config, host, port).await,
        Command::Scan { task_id, pages } => run_scan(&config, &task_id, pages).await,
        Command::Export {
            task_id,
            output,
            title,
        } => run_export(&config, &task_id, output, title).await,
    }
}

async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    server::serve(config).await
}

async fn run_scan(config: &AppConfig, task_id: &str, pages: Option<usize>) -> Result<()> {
    let images = ImageStore::new(config.history_root());
    let report = scan_task(&images, &TaskStore::new(), task_id, pages).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_export(
    config: &AppConfig,
    task_id: &str,
    output: Option<PathBuf>,
    title: Option<String>,
) -> Result<()> {
    let images = ImageStore::new(config.history_root());
    let archive = build_archive(&images, task_id).await?;
    let path = output.unwrap_or_else(|| {
        PathBuf::from(archive_file_name(title.as_deref().unwrap_or(task_id)))
    });
    tokio::fs::write(&path, &archive)
        .await
        .map_err(|e| Error::persistence(&path, e))?;
    info!(task_id, path = %path.display(), bytes = archive.len(), "Archive written");
    println!("{}", path.display());
    Ok(())
}
