use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use envmerge::sync::{EnvSync, EnvSyncOptions};
use tracing::{Dispatch, error, info};

#[derive(Parser, Debug)]
#[command(
  name = "envmerge",
  about = "Append missing keys from a template env file to your local env file",
  version,
  author
)]
struct Cli {
  /// Source .env.example file path
  #[arg(long, default_value = ".env.example")]
  src: PathBuf,

  /// Destination .env file path
  #[arg(long, default_value = ".env")]
  dst: PathBuf,

  /// Append updates for differing keys
  #[arg(long)]
  force: bool,

  /// Verbose output (-v for verbose, -vv for very verbose)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Log output format
  #[arg(long, value_enum, default_value_t = LogFormat::Json)]
  log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
  Json,
  Text,
}

impl Cli {
  fn sync_options(&self) -> EnvSyncOptions {
    EnvSyncOptions {
      source_file: self.src.clone(),
      destination_file: self.dst.clone(),
      force: self.force,
      base_dir: None,
    }
  }
}

fn build_dispatch(verbose: u8, format: LogFormat) -> Dispatch {
  use tracing_subscriber::{Layer, fmt, prelude::*};

  let log_level = match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };

  let fmt_layer = match format {
    LogFormat::Json => fmt::layer().json().boxed(),
    LogFormat::Text => fmt::layer().boxed(),
  };

  tracing_subscriber::registry()
    .with(fmt_layer)
    .with(tracing_subscriber::EnvFilter::new(
      std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    ))
    .into()
}

fn run(cli: &Cli) -> ExitCode {
  let sync = match EnvSync::open(cli.sync_options()) {
    Ok(sync) => sync,
    Err(err) => {
      error!(error = %err, "service initialization failed");
      return ExitCode::FAILURE;
    }
  };

  match sync.run() {
    Ok(report) => {
      info!(
        appended = report.appended.len(),
        destination = %report.destination.display(),
        "dotenv synced"
      );
      ExitCode::SUCCESS
    }
    Err(err) => {
      error!(error = %err, "service run failed");
      ExitCode::FAILURE
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let dispatch = build_dispatch(cli.verbose, cli.log_format);

  tracing::dispatcher::with_default(&dispatch, || run(&cli))
}
