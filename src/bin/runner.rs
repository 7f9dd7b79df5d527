use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;

use simq::client::LedgerClient;
use simq::config::RunnerConfig;
use simq::runner::{Engine, HttpEngine, spawn_runner};

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

    let config = RunnerConfig::from_env()?;

    eprintln!("⚙️ simq-runner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Ledger: {}", config.ledger_url);
    eprintln!("   Engine: {}", config.engine_url);
    eprintln!("   Polling every {}s", config.poll_interval.as_secs());

    let client = LedgerClient::new(&config.ledger_url).context("building ledger client")?;
    let engine: Arc<dyn Engine> = Arc::new(
        HttpEngine::new(&config.engine_url, config.dispatch_timeout)
            .context("building engine client")?,
    );

    let (handle, shutdown) = spawn_runner(config, client, engine);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping runner");
    shutdown.store(true, Ordering::Relaxed);
    handle.await?;

    Ok(())
}
