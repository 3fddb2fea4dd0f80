use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use helpdesk_sw::cache::SqliteBackend;
use helpdesk_sw::config::WorkerConfig;
use helpdesk_sw::control::ControlMessage;
use helpdesk_sw::fetch::HttpFetcher;
use helpdesk_sw::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "helpdesk-sw")]
#[command(about = "Offline cache orchestrator for the helpdesk PWA client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/helpdesk-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the precache from the manifest and activate the new version
  Install,
  /// Report the active version tag and existing cache stores
  Status,
  /// Delete every cache store, any role or version
  Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.log_file.as_deref())?;

  let config = WorkerConfig::load(args.config.as_deref())?;
  let backend = SqliteBackend::open()?;
  let fetcher = Arc::new(HttpFetcher::new()?);
  let mut worker = Worker::new(config, fetcher, backend);

  match args.command {
    Command::Install => {
      worker.on_install().await?;
      worker.on_activate().await?;
      println!("Installed and activated version {}", worker.version());
    }
    Command::Status => {
      println!("Active version: {}", worker.version());
      let stores = worker.store_names()?;
      if stores.is_empty() {
        println!("No cache stores");
      } else {
        for name in stores {
          println!("  {}", name);
        }
      }
    }
    Command::Purge => {
      worker.on_message(ControlMessage::ClearCache, None).await;
      println!("All cache stores deleted");
    }
  }

  Ok(())
}

/// Initialize tracing, either to stderr or to a log file.
///
/// The returned guard must stay alive for buffered file output to flush.
fn init_logging(log_file: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_file {
    Some(path) => {
      let directory = path.parent().unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let appender = tracing_appender::rolling::never(directory, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt().with_env_filter(filter).init();
      Ok(None)
    }
  }
}
