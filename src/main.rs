use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use simq::api::{LedgerRouteState, ledger_routes};
use simq::config::ServerConfig;
use simq::ledger::JobLedger;
use simq::store::{JobStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    eprintln!("⚙️ simqd v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/jobs", config.bind_addr);
    eprintln!("   Database: {}", config.db_path.display());
    match config.requeue_after {
        Some(after) => eprintln!(
            "   Stale requeue: after {}s, swept every {}s",
            after.as_secs(),
            config.sweep_interval.as_secs()
        ),
        None => eprintln!("   Stale requeue: disabled"),
    }

    let store: Arc<dyn JobStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    let ledger = Arc::new(JobLedger::new(store));

    if let Some(after) = config.requeue_after {
        spawn_stale_sweep(Arc::clone(&ledger), after, config.sweep_interval);
    }

    let app = ledger_routes(LedgerRouteState {
        ledger: Arc::clone(&ledger),
    });
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Job ledger listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically requeue running jobs whose consumer has gone silent.
fn spawn_stale_sweep(ledger: Arc<JobLedger>, after: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            match ledger.requeue_stale(after).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "Requeued stale jobs"),
                Err(e) => tracing::error!("Stale sweep failed: {e}"),
            }
        }
    });
}
