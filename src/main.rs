use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photocat::app::App;
use photocat::commands::Command;
use photocat::config::Config;

#[derive(Parser, Debug)]
#[command(name = "photocat")]
#[command(about = "Browse photo collections and run AI annotation jobs")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/photocat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Annotation provider to use
  #[arg(short, long)]
  provider: Option<String>,

  /// Write logs to a daily-rolling file in this directory instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

/// Install the global subscriber. The guard flushes buffered lines on drop.
fn init_logging(log_dir: Option<&PathBuf>) -> WorkerGuard {
  let (writer, guard) = match log_dir {
    Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "photocat.log")),
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "photocat=info".into()),
    )
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(log_dir.is_none()),
    )
    .init();

  guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_ref());

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let app = App::new(config, args.provider)?;
  let exit = app.run(args.command).await?;

  Ok(exit.into())
}
