//! Aggregator Binary - incremental aggregate jobs
//!
//! Runs every aggregate job's state machine concurrently against the event
//! store. Jobs never exit on error; stop with Ctrl-C, which lets running
//! iterations finish and releases every job lease.
//!
//! ## Environment Variables
//!
//! - NEARFLOW_DB_PATH - SQLite database path
//! - SAFETY_LAG - heights kept behind the latest stored block (default: 5)
//! - BATCH_CAP_TIERS / BATCH_CAP_TIERS_<JOB> - adaptive batch caps
//! - RPC_URLS - comma separated JSON-RPC endpoints (enables balance snapshots)
//! - RPC_MAX_RETRIES - retries per RPC call (default: 4)
//! - RUST_LOG - Logging level (optional, default: info)

use dotenv::dotenv;
use log::{info, warn};
use nearflow::aggregator_core::jobs::{BalanceSnapshotsJob, DailyStatsJob, FtHoldersJob, TpsJob};
use nearflow::aggregator_core::{AggregateJob, AggregatorConfig, ErrorReporter, JobRunner, LogReporter, RpcPool};
use nearflow::pipeline::open_store;
use nearflow::streamer_core::error_handler::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn spawn_job<J>(
    job: J,
    config: &AggregatorConfig,
    reporter: Arc<dyn ErrorReporter>,
    shutdown: &watch::Receiver<bool>,
) -> Result<JoinHandle<()>, Box<dyn std::error::Error>>
where
    J: AggregateJob + 'static,
{
    let conn = open_store(&config.db_path, &config.schema_dir)?;
    let runner = JobRunner::new(job, conn, config.clone(), reporter)?;
    Ok(tokio::spawn(runner.run_until(shutdown.clone())))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = AggregatorConfig::from_env()?;

    info!("🚀 nearflow aggregator");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Worker: {}", config.worker_id);
    info!("   ├─ Safety lag: {} blocks", config.safety_lag);
    info!("   └─ RPC endpoints: {}", config.rpc_urls.len());

    let reporter: Arc<dyn ErrorReporter> = Arc::new(LogReporter);
    let (stop, shutdown) = watch::channel(false);
    let mut handles = vec![
        spawn_job(FtHoldersJob, &config, reporter.clone(), &shutdown)?,
        spawn_job(DailyStatsJob, &config, reporter.clone(), &shutdown)?,
        spawn_job(TpsJob, &config, reporter.clone(), &shutdown)?,
    ];

    if config.rpc_urls.is_empty() {
        warn!("⚠️  RPC_URLS not set, balance snapshots disabled");
    } else {
        let pool = RpcPool::new(config.rpc_urls.clone(), config.rpc_concurrency, config.rpc_timeout_secs)?
            .with_backoff(ExponentialBackoff::new(200, 5_000, config.rpc_max_retries));
        handles.push(spawn_job(
            BalanceSnapshotsJob::new(Arc::new(pool)),
            &config,
            reporter.clone(),
            &shutdown,
        )?);
    }

    info!("✅ {} jobs running", handles.len());
    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down aggregator");
    stop.send(true)?;
    for mut handle in handles {
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
            warn!("⚠️  Job did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            handle.abort();
        }
    }
    info!("✅ Aggregator stopped");
    Ok(())
}
