use std::sync::Arc;

use tanglegc::config::Config;
use tanglegc::gc::{GarbageCollector, GcSettings};
use tanglegc::goals::GoalBook;
use tanglegc::humanize::ByteSize;
use tanglegc::log::{FjallLog, LogStore};
use tracing::info;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn open(config: &Config) -> Result<(Arc<FjallLog>, GarbageCollector), AnyError> {
    let log = Arc::new(FjallLog::open(&config.log.path)?);

    let goals = GoalBook::new(log.clone());
    for (tangle, goal) in config.parsed_goals() {
        goals.set(tangle, goal);
    }

    let gc = GarbageCollector::new(log.clone(), Arc::new(goals), GcSettings::from(&config.gc));
    Ok((log, gc))
}

/// Collect garbage in the background until a shutdown signal arrives
pub async fn run(config: &Config, max_log_bytes: Option<u64>) -> Result<(), AnyError> {
    let (log, gc) = open(config)?;
    gc.start(max_log_bytes)?;
    info!(path = %config.log.path.display(), "tanglegc running");

    shutdown_signal().await;

    gc.stop();
    info!("waiting for gc cycle in flight");
    gc.wait_idle().await;
    log.persist()?;
    Ok(())
}

pub async fn force(config: &Config) -> Result<(), AnyError> {
    let (log, gc) = open(config)?;
    let report = gc.force_immediately().await?;

    if let Some(pass) = report.pass_report() {
        println!(
            "scanned {} kept {} deleted {} ghosted {} erased {} failed {}",
            pass.scanned,
            pass.kept,
            pass.deleted,
            pass.ghosted,
            pass.erased,
            pass.failures.len()
        );
    }
    match &report.compaction {
        Some(Ok(())) => println!("compaction ok"),
        Some(Err(err)) => println!("compaction failed: {}", err),
        None => {}
    }

    log.persist()?;
    Ok(())
}

pub async fn stats(config: &Config) -> Result<(), AnyError> {
    let (log, _gc) = open(config)?;
    let stats = log.stats().await?;
    println!(
        "total {} deleted {}",
        ByteSize(stats.total_bytes),
        ByteSize(stats.deleted_bytes)
    );
    Ok(())
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
