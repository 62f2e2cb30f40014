use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use searoute_cli::config::WorkerConfig;
use searoute_cli::logging::{init_logging, LoggingConfig};

mod commands;

use commands::route::RouteArgs;
use commands::worker::WorkerArgs;

#[derive(Parser, Debug)]
#[command(author, version, about = "Maritime route calculator")]
struct Cli {
    /// Port database path. Overrides SEAROUTE_DATABASE_PATH.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `searoute_lib=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a route between two ports and print it.
    Route(RouteArgs),
    /// Process calculation requests and persist their results.
    Worker(WorkerArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Command::Route(_) => "warn",
        Command::Worker(_) => "info",
    };
    let mut logging = LoggingConfig::from_env(default_level);
    if let Some(level) = &cli.log_level {
        logging = logging.with_level(level.clone());
    }
    init_logging(&logging)?;

    match cli.command {
        Command::Route(args) => {
            let config = WorkerConfig::from_env().with_overrides(cli.database, None, None);
            commands::route::run(&config.database_path, &args)
        }
        Command::Worker(args) => commands::worker::run(cli.database, args),
    }
}
