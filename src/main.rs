use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use signal_engine::api::{self, ApiState};
use signal_engine::config::Config;
use signal_engine::dispatch::{BackendDispatcher, TelegramBroadcaster};
use signal_engine::scheduler::{Pipeline, Scheduler};
use signal_engine::strategies::HttpAnalyzer;
use signal_engine::tracker::{SignalStore, SignalTracker};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let store = SignalStore::open(&cfg.data_dir)?;
    let tracker = Arc::new(SignalTracker::new(store)?);
    info!("Tracker loaded {} signals from {}", tracker.len(), cfg.data_dir);

    let dispatcher = Arc::new(BackendDispatcher::new(&cfg)?);
    let broadcaster = Arc::new(TelegramBroadcaster::new(&cfg)?);
    let fetch_timeout = Duration::from_secs(cfg.scheduler.fetch_timeout_secs);

    let analyzers = cfg.analyzers.clone();
    let api_bind = cfg.api_bind.clone();
    let secret = cfg.webhook_secret.clone();
    let shared_config = cfg.shared();

    let pipeline = Arc::new(Pipeline::new(shared_config, tracker, dispatcher, broadcaster));
    let mut scheduler = Scheduler::new(pipeline.clone());
    for a in analyzers {
        let analyzer = Arc::new(HttpAnalyzer::new(&a, fetch_timeout)?);
        scheduler.add_analyzer(analyzer, a);
    }

    let shutdown = scheduler.shutdown_handle();
    let state = ApiState::new(pipeline, &secret);
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = api::serve(&api_bind, state, server_shutdown.clone()).await;
        if result.is_err() {
            server_shutdown.trigger();
        }
        result
    });

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal.trigger();
    });

    scheduler.run().await?;

    match server.await {
        Ok(Err(e)) => error!("API server error: {:#}", e),
        Err(e) => error!("API server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    Ok(())
}
