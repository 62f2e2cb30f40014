use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use searoute_lib::{SqliteGateway, SqliteTaskStore, TaskOrchestrator};
use tokio::{select, signal};
use tracing::{debug, error, info, warn};

use searoute_cli::config::WorkerConfig;
use searoute_cli::dispatcher::Dispatcher;
use searoute_cli::intake::{self, Incoming, RequestSource};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Newline-delimited JSON requests. Omit or pass `-` to read stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Readiness probes before giving up. Overrides SEAROUTE_STARTUP_RETRIES.
    #[arg(long)]
    pub startup_retries: Option<u32>,
    /// Seconds between readiness probes. Overrides SEAROUTE_STARTUP_RETRY_DELAY_SECS.
    #[arg(long)]
    pub retry_delay_secs: Option<u64>,
}

pub fn run(database: Option<PathBuf>, args: WorkerArgs) -> Result<()> {
    let config = WorkerConfig::from_env().with_overrides(
        database,
        args.startup_retries,
        args.retry_delay_secs,
    );
    let source = RequestSource::from_arg(args.input);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(serve(config, source));
    // A pending stdin read must not hold up exit.
    runtime.shutdown_background();
    result
}

async fn serve(config: WorkerConfig, source: RequestSource) -> Result<()> {
    let gateway = Arc::new(SqliteGateway::open(&config.database_path));
    wait_for_database(gateway.clone(), &config).await?;

    let store = Arc::new(SqliteTaskStore::open(&config.database_path));
    let mut dispatcher = Dispatcher::new(TaskOrchestrator::new(gateway, store));
    let mut reader = intake::open(&source).await?;
    info!(database = %config.database_path.display(), "worker accepting requests");

    let mut intake_error = None;
    loop {
        select! {
            _ = signal::ctrl_c() => {
                info!(in_flight = dispatcher.in_flight(), "shutdown requested, draining");
                break;
            }
            next = reader.next() => match next {
                Ok(Some(Incoming::Payload(payload))) => dispatcher.submit(payload),
                Ok(Some(Incoming::Garbled { line_number, reason })) => {
                    dispatcher.reject(format!("line {line_number}: {reason}"));
                }
                Ok(None) => {
                    debug!("end of request stream");
                    break;
                }
                Err(error) => {
                    error!(%error, "request intake failed, draining");
                    intake_error = Some(error);
                    break;
                }
            }
        }
        dispatcher.reap_finished();
    }

    let summary = dispatcher.drain().await;
    info!(
        completed = summary.completed,
        failed = summary.failed,
        rejected = summary.rejected,
        "worker stopped"
    );
    println!("{summary}");

    match intake_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

async fn wait_for_database(gateway: Arc<SqliteGateway>, config: &WorkerConfig) -> Result<()> {
    let attempts = config.startup_retries.max(1);
    for attempt in 1..=attempts {
        let probe = gateway.clone();
        let ready = tokio::task::spawn_blocking(move || probe.check_ready())
            .await
            .context("readiness probe aborted")?;
        match ready {
            Ok(true) => {
                info!(attempt, "database ready");
                return Ok(());
            }
            Ok(false) => warn!(attempt, attempts, "port table not available yet"),
            Err(error) => warn!(attempt, attempts, %error, "database not reachable yet"),
        }
        if attempt < attempts {
            tokio::time::sleep(config.retry_delay).await;
        }
    }
    bail!(
        "database {} not ready after {} attempts",
        config.database_path.display(),
        attempts
    )
}
