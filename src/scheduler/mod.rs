pub mod pipeline;
pub mod stats;

pub use pipeline::{CycleReport, Delivery, Pipeline, StatusSnapshot};
pub use stats::{PipelineSnapshot, PipelineStats};

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AnalyzerConfig;
use crate::dispatch::format::format_startup;
use crate::dispatch::{with_retry, Channel, RetryPolicy};
use crate::models::SignalCandidate;
use crate::reporting::{next_report_at, yesterday};
use crate::strategies::Analyzer;

/// Cooperative stop signal shared by every loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolves once shutdown has been requested (or the handle is gone).
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

struct Worker {
    analyzer: Arc<dyn Analyzer>,
    config: AnalyzerConfig,
}

/// Runs N analyzer workers, the fusion cycle, reconciliation, status and
/// daily report loops over one shared [`Pipeline`].
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    workers: Vec<Worker>,
    shutdown: ShutdownHandle,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            workers: Vec::new(),
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Registers an analyzer; disabled or symbol-less ones are skipped.
    pub fn add_analyzer(&mut self, analyzer: Arc<dyn Analyzer>, config: AnalyzerConfig) {
        if !config.enabled {
            info!("{} analyzer disabled", config.source);
            return;
        }
        if config.symbols.is_empty() {
            warn!("{} analyzer has an empty watchlist, skipping", config.source);
            return;
        }
        self.workers.push(Worker { analyzer, config });
    }

    pub async fn run(self) -> Result<()> {
        let cfg = self.pipeline.config().clone();
        let sched = cfg.scheduler.clone();

        info!("{}", "=".repeat(60));
        info!("Signal engine starting");
        for w in &self.workers {
            info!(
                "  {} analyzer: every {}s over {}",
                w.config.source,
                w.config.interval_secs,
                w.config.symbols.join(",")
            );
        }
        info!(
            "  Fusion cycle {}s | reconcile every {}s (stale after {}h)",
            sched.cycle_interval_secs, sched.reconcile_interval_secs, sched.stale_after_hours
        );
        info!("{}", "=".repeat(60));

        let startup: Vec<AnalyzerConfig> = self.workers.iter().map(|w| w.config.clone()).collect();
        {
            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                pipeline.announce(&format_startup(&startup), &[Channel::Admin]).await;
            });
        }

        let (tx, rx) = mpsc::channel::<SignalCandidate>(sched.channel_capacity.max(1));
        let fetch = RetryPolicy::fetch(&sched);
        let mut tasks = JoinSet::new();

        for worker in self.workers {
            tasks.spawn(analyzer_loop(worker, tx.clone(), self.shutdown.subscribe(), fetch));
        }
        drop(tx);

        tasks.spawn(cycle_loop(
            self.pipeline.clone(),
            rx,
            Duration::from_secs(sched.cycle_interval_secs.max(1)),
            self.shutdown.subscribe(),
        ));
        tasks.spawn(reconcile_loop(
            self.pipeline.clone(),
            Duration::from_secs(sched.reconcile_interval_secs.max(1)),
            self.shutdown.subscribe(),
        ));
        tasks.spawn(status_loop(
            self.pipeline.clone(),
            Duration::from_secs(sched.status_interval_secs.max(1)),
            self.shutdown.subscribe(),
        ));
        tasks.spawn(daily_report_loop(
            self.pipeline.clone(),
            sched.daily_report_hour,
            self.shutdown.subscribe(),
        ));

        info!("All loops running");

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }

        self.pipeline.log_status();
        info!("Signal engine stopped");
        Ok(())
    }
}

/// `analyze` every watched symbol, then wait one interval. A failing symbol
/// never stops the others.
async fn analyzer_loop(
    worker: Worker,
    tx: mpsc::Sender<SignalCandidate>,
    mut shutdown: watch::Receiver<bool>,
    fetch: RetryPolicy,
) {
    let source = worker.config.source;
    let mut ticker = time::interval(Duration::from_secs(worker.config.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }

        for symbol in &worker.config.symbols {
            if *shutdown.borrow() {
                break;
            }
            let what = format!("{source} analyze {symbol}");
            let analyzer = &worker.analyzer;
            let result = with_retry(&fetch, &what, || analyzer.analyze(symbol)).await;
            match result {
                Ok(Some(candidate)) => {
                    info!(
                        "{} generated {} {} ({:.0}%)",
                        source, candidate.symbol, candidate.side, candidate.confidence
                    );
                    if tx.send(candidate).await.is_err() {
                        debug!("{} analyzer: collector gone, stopping", source);
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{} analyzer failed on {}: {:#}", source, symbol, e),
            }
        }
    }
    debug!("{} analyzer stopped", source);
}

/// Collects whatever arrived since the last tick into one batch and runs a
/// full pipeline cycle over it. Shutdown is only observed between cycles.
async fn cycle_loop(
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::Receiver<SignalCandidate>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }

        let batch = drain(&mut rx);
        if batch.is_empty() {
            continue;
        }
        let report = pipeline.run_cycle(batch).await;
        debug!(
            candidates = report.candidates,
            approved = report.approved,
            rejected = report.rejected,
            "Cycle complete"
        );
    }

    // Candidates that arrived after the last tick are arbitrated rather than lost.
    rx.close();
    let batch = drain(&mut rx);
    if !batch.is_empty() {
        info!("Processing {} queued candidates before exit", batch.len());
        pipeline.run_cycle(batch).await;
    }
    debug!("Fusion cycle stopped");
}

fn drain(rx: &mut mpsc::Receiver<SignalCandidate>) -> Vec<SignalCandidate> {
    let mut batch = Vec::new();
    while let Ok(c) = rx.try_recv() {
        batch.push(c);
    }
    batch
}

/// Sweeps once immediately, then every `period`.
async fn reconcile_loop(pipeline: Arc<Pipeline>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }
        // The sweep persists each close, so keep it off the async workers.
        let sweep = pipeline.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sweep.reconcile()).await {
            error!("Reconciliation sweep panicked: {}", e);
        }
    }
    debug!("Reconciliation stopped");
}

async fn status_loop(pipeline: Arc<Pipeline>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => pipeline.log_status(),
            _ = stopped(&mut shutdown) => break,
        }
    }
}

async fn daily_report_loop(pipeline: Arc<Pipeline>, hour: u32, mut shutdown: watch::Receiver<bool>) {
    loop {
        let now = Utc::now();
        let at = next_report_at(now, hour);
        let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
        debug!("Next daily report at {}", at);

        tokio::select! {
            _ = time::sleep(wait) => {}
            _ = stopped(&mut shutdown) => break,
        }
        pipeline.send_daily_report(yesterday(Utc::now())).await;
    }
}
