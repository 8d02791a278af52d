//! Kestrel CLI: inspect and maintain the incremental analysis cache.
//!
//! Provides `kestrel changes` to list files that changed since the last
//! analysis run, and `kestrel cache stats|prune|clean` to look after the
//! persisted cache of a workspace.

#![warn(missing_docs)]

mod cache_cmd;
mod changes;
mod pipeline;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter.
const LOG_ENV: &str = "KESTREL_LOG";

/// Kestrel: incremental static analysis.
#[derive(Parser, Debug)]
#[command(name = "kestrel", version, about = "Kestrel incremental analysis cache")]
pub struct Cli {
    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug output, including every cache hit and miss.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `kestrel.toml` file or to the workspace directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List files changed since the last analysis run.
    Changes(ChangesArgs),
    /// Inspect or maintain the cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for `kestrel changes`.
#[derive(Parser, Debug)]
pub struct ChangesArgs {
    /// Files or directories to check. Defaults to the whole workspace.
    pub paths: Vec<String>,

    /// Also list unchanged files.
    #[arg(short, long)]
    pub all: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// `kestrel cache` subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache size and per-detector entry counts.
    Stats {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Drop deleted files and expired entries.
    Prune,
    /// Discard every cached hash and result.
    Clean,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file or workspace directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Changes(ref args) => changes::run(args, &global),
        Command::Cache(CacheCommand::Stats { format }) => cache_cmd::stats(format, &global),
        Command::Cache(CacheCommand::Prune) => cache_cmd::prune(&global),
        Command::Cache(CacheCommand::Clean) => cache_cmd::clean(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber. `KESTREL_LOG` overrides the flags.
fn init_logging(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(global)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_log_level(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "warn"
    }
}
