mod archive;
mod commands;
mod core;
mod feed;
mod release;
mod ui;

use clap::{Parser, Subcommand};
use core::error::{ShipError, print_error};
use core::state::STATUS_FILE_NAME;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Resumable releases for feed-described packages kept in git
#[derive(Parser)]
#[command(name = "shiprel")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  /// More diagnostics (-v info, -vv debug, -vvv trace)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Only print errors
  #[arg(short, long, global = true, conflicts_with = "verbose")]
  quiet: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Make a new release, or resume the one in progress
  Release {
    /// GPG key for signing the tag and the master feed
    #[arg(short, long)]
    key: Option<String>,
    /// Comma-separated build targets (empty to skip binary builds)
    #[arg(long)]
    builders: Option<String>,
    /// Releases directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    config: Option<PathBuf>,
  },

  /// Create shiprel.toml for a feed in the current (empty) directory
  Init {
    /// The feed inside your git working copy
    local_feed: PathBuf,
  },

  /// Show how far the release in progress got
  Status {
    /// Output status in JSON format
    #[arg(long)]
    json: bool,
    /// Releases directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    config: Option<PathBuf>,
  },

  /// Roll back a release that has not been tagged yet
  Abandon {
    /// Releases directory (default: current directory)
    #[arg(long, value_name = "DIR")]
    config: Option<PathBuf>,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

/// `RUST_LOG` wins over the -v/-q flags
fn init_logging(verbose: u8, quiet: bool) {
  let level = match (quiet, verbose) {
    (true, _) => "error",
    (false, 0) => "warn",
    (false, 1) => "info",
    (false, 2) => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .compact()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose, cli.quiet);

  let result = match cli.command {
    Commands::Release { key, builders, config } => commands::run_release(key, builders, config),
    Commands::Init { local_feed } => commands::run_init(local_feed),
    Commands::Status { json, config } => commands::run_status(json, config),
    Commands::Abandon { config } => commands::run_abandon(config),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: ShipError) -> ! {
  print_error(&err);
  eprintln!(
    "Progress so far is kept in '{}' in the releases directory; \
     run again to resume, or `shiprel abandon` to start over.",
    STATUS_FILE_NAME
  );
  std::process::exit(err.exit_code().as_i32());
}
