//! Command-line front end for mdview remote access and live updates.
//!
//! # Usage
//!
//! ```bash
//! mdv [OPTIONS] <COMMAND>
//!
//! # Show how an input is interpreted
//! mdv parse 'smb://nas/docs/readme.md'
//!
//! # List a remote directory (markdown files and folders)
//! mdv ls sftp://alice@docs.example.com/notes
//!
//! # Print a file
//! mdv cat nfs://storage/export/handbook.md
//!
//! # Stream change notifications as JSON lines
//! mdv watch --interval 1000 sftp://alice@docs.example.com/notes/todo.md
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod prompt;

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use mdv_core::{Config, DirEntry, RemoteTarget, build_url, is_remote, normalize_listing, parse};
use mdv_remote::{ConnectionRegistry, CredentialManager, MemoryCredentialStore, OpenedFile};
use mdv_watcher::WatchManager;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::prompt::TerminalPrompter;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Read and watch markdown files over SFTP, SMB, and NFS.
#[derive(Parser)]
#[command(name = "mdv", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "MDV_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Show how a path or URI is interpreted.
    Parse {
        /// Local path, `scheme://` URI, or UNC path.
        input: String,
    },

    /// List a directory, keeping folders and markdown files.
    Ls {
        /// Directory to list.
        input: String,

        /// Print entries as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Print a file.
    Cat {
        /// File to print.
        input: String,
    },

    /// Stream change notifications for a file as JSON lines.
    ///
    /// Runs until interrupted or until the watch ends (remote file deleted,
    /// or the connection could not be re-established).
    Watch {
        /// File to watch.
        input: String,

        /// Remote poll interval in milliseconds (clamped to 500..=30000).
        #[arg(short, long)]
        interval: Option<u64>,

        /// Print the file once instead of watching it.
        #[arg(long)]
        no_live: bool,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr; stdout carries command output only.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Loads the configuration file if one was given.
fn load_config(path: Option<&Utf8Path>) -> color_eyre::Result<Config> {
    match path {
        Some(path) => Config::load(path).wrap_err_with(|| format!("Failed to load {path}")),
        None => Ok(Config::default()),
    }
}

/// Builds the connection registry shared by every command.
///
/// Credentials are prompted for only when stdin is a terminal.
fn build_registry(config: &Config) -> Arc<ConnectionRegistry> {
    let mut credentials = CredentialManager::new(
        Arc::new(MemoryCredentialStore::new()),
        config.remote.prompt_timeout(),
    );
    if std::io::stdin().is_terminal() {
        credentials = credentials.with_prompter(Arc::new(TerminalPrompter));
    }
    Arc::new(ConnectionRegistry::new(
        Arc::new(credentials),
        config.remote.clone(),
    ))
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// What `mdv parse` prints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseReport<'a> {
    #[serde(flatten)]
    target: &'a RemoteTarget,
    is_remote: bool,
    url: String,
}

/// Prints the parsed form of `input` as JSON.
fn run_parse(input: &str) -> color_eyre::Result<()> {
    let target = parse(input);
    let report = ParseReport {
        target: &target,
        is_remote: is_remote(input),
        url: build_url(&target),
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

/// Lists a local directory the same way remote listings are filtered.
fn list_local(dir: &str) -> color_eyre::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).wrap_err_with(|| format!("Failed to list {dir}"))? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        entries.push(
            DirEntry::new(dir, name, metadata.is_dir())
                .with_size(metadata.is_file().then_some(metadata.len())),
        );
    }
    Ok(normalize_listing(entries))
}

/// Lists a directory.
async fn run_ls(registry: &ConnectionRegistry, input: &str, json: bool) -> color_eyre::Result<()> {
    let target = parse(input);
    let entries = if target.is_local() {
        list_local(&target.resource_path)?
    } else {
        registry.connect(&target, None).await?;
        registry.list_directory(&target).await?
    };
    info!(path = %target.resource_path, entries = entries.len(), "Listed directory");

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if json {
        writeln!(handle, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }
    for entry in &entries {
        if entry.is_directory {
            writeln!(handle, "{:>12}  {}/", "-", entry.name)?;
        } else {
            let size = entry.size.map_or_else(|| "?".to_owned(), |s| s.to_string());
            writeln!(handle, "{size:>12}  {}", entry.name)?;
        }
    }
    Ok(())
}

/// Prints a file.
async fn run_cat(registry: &ConnectionRegistry, input: &str) -> color_eyre::Result<()> {
    let content = match registry.open_file(input, None).await? {
        OpenedFile::Local { path } => {
            std::fs::read_to_string(&path).wrap_err_with(|| format!("Failed to read {path}"))?
        }
        OpenedFile::Remote { content, .. } => content,
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{content}")?;
    Ok(())
}

/// Streams notifications until Ctrl-C or a terminal notification.
async fn run_watch(
    registry: &Arc<ConnectionRegistry>,
    config: &Config,
    input: &str,
) -> color_eyre::Result<()> {
    let mut manager = WatchManager::new(Arc::clone(registry), config.watch);
    if !manager.is_enabled() {
        info!("Live updates disabled, printing current content");
        return run_cat(registry, input).await;
    }

    manager
        .watch(input)
        .await
        .map_err(|e| eyre!("Failed to watch {input}: {e}"))?;
    info!(input, interval_ms = manager.poll_interval().as_millis(), "Watching");

    let stdout = std::io::stdout();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, shutting down");
                break;
            }
            next = manager.recv() => {
                let Some(notification) = next else {
                    break;
                };
                let line = serde_json::to_string(&notification)?;
                writeln!(stdout.lock(), "{line}")?;
                if notification.is_terminal() {
                    break;
                }
            }
        }
    }

    manager.stop().await;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Build the shared context
    let mut config = load_config(cli.config.as_deref())?;
    if let Commands::Watch {
        interval, no_live, ..
    } = &cli.command
    {
        if let Some(ms) = interval {
            config.watch.poll_interval_ms = *ms;
        }
        if *no_live {
            config.watch.live_updates = false;
        }
    }
    let registry = build_registry(&config);

    // 5. Route to appropriate command
    let result = match &cli.command {
        Commands::Parse { input } => run_parse(input),
        Commands::Ls { input, json } => run_ls(&registry, input, *json).await,
        Commands::Cat { input } => run_cat(&registry, input).await,
        Commands::Watch { input, .. } => run_watch(&registry, &config, input).await,
    };

    registry.close_all().await;
    result
}
