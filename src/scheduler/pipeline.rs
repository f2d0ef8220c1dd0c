use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SharedConfig;
use crate::dispatch::format::{format_outcome, format_signal};
use crate::dispatch::{with_retry, Broadcaster, Channel, DeliveryStats, Dispatcher, RetryPolicy};
use crate::fusion::{FusionEngine, FusionSummary};
use crate::models::{CloseReason, SignalCandidate, SignalOutcome};
use crate::reporting::DailyReport;
use crate::scheduler::stats::{PipelineSnapshot, PipelineStats};
use crate::tracker::{SignalTracker, TrackerError, TrackerStats};

/// What happened to one approved signal after arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Tracker refused the row; nothing was sent.
    Untracked,
    /// Tracked but the system of record never acknowledged it.
    DispatchFailed,
    Delivered { broadcast: bool },
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub candidates: usize,
    pub approved: usize,
    pub rejected: usize,
    pub deliveries: Vec<(String, Delivery)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub fusion: FusionSummary,
    pub pipeline: PipelineSnapshot,
    pub tracker: TrackerStats,
    pub dispatcher: DeliveryStats,
    pub broadcaster: DeliveryStats,
}

/// The shared core every loop works through: one fusion engine behind one
/// lock, one tracker, and the two delivery collaborators.
pub struct Pipeline {
    config: SharedConfig,
    fusion: Mutex<FusionEngine>,
    tracker: Arc<SignalTracker>,
    dispatcher: Arc<dyn Dispatcher>,
    broadcaster: Arc<dyn Broadcaster>,
    stats: PipelineStats,
    retry: RetryPolicy,
    broadcast_retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        config: SharedConfig,
        tracker: Arc<SignalTracker>,
        dispatcher: Arc<dyn Dispatcher>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let fusion = FusionEngine::new(config.fusion.clone());
        let retry = RetryPolicy::dispatch(&config.scheduler);
        let broadcast_retry = RetryPolicy::broadcast(&config.scheduler, Channel::ALL.len());
        Self {
            config,
            fusion: Mutex::new(fusion),
            tracker,
            dispatcher,
            broadcaster,
            stats: PipelineStats::default(),
            retry,
            broadcast_retry,
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Exclusive access to the engine. The guard is not `Send`, so it cannot
    /// be held across an await.
    pub fn fusion(&self) -> MutexGuard<'_, FusionEngine> {
        self.fusion.lock()
    }

    pub fn tracker(&self) -> &SignalTracker {
        &self.tracker
    }

    /// Runs a tracker write on the blocking pool. Every write persists the
    /// table to disk while holding the tracker's write lock.
    pub async fn write_tracker<T, F>(&self, op: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&SignalTracker) -> Result<T, TrackerError> + Send + 'static,
        T: Send + 'static,
    {
        let tracker = self.tracker.clone();
        tokio::task::spawn_blocking(move || op(&tracker))
            .await
            .map_err(|e| TrackerError::Storage(std::io::Error::other(e)))?
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.stats.snapshot()
    }

    /// One scheduler cycle: trend bias, arbitration, then per-signal
    /// track, dispatch and broadcast.
    pub async fn run_cycle(&self, batch: Vec<SignalCandidate>) -> CycleReport {
        let mut report = CycleReport {
            candidates: batch.len(),
            ..CycleReport::default()
        };
        self.stats.cycle(batch.len());
        if batch.is_empty() {
            return report;
        }

        let fusion = {
            let mut engine = self.fusion.lock();
            let trend_source = engine.config().trend_source;
            for c in batch.iter().filter(|c| c.bot_source == trend_source) {
                engine.update_trend_bias(&c.symbol, c.side);
            }
            engine.process_detailed(batch)
        };

        for r in &fusion.rejected {
            debug!(
                signal_id = %r.signal_id,
                symbol = %r.symbol,
                reason = %r.reason,
                "Candidate rejected"
            );
        }
        report.approved = fusion.approved.len();
        report.rejected = fusion.rejected.len();
        self.stats.approved(fusion.approved.len());

        for signal in fusion.approved {
            let outcome = self.deliver(&signal).await;
            report.deliveries.push((signal.signal_id.clone(), outcome));
        }
        report
    }

    pub async fn deliver(&self, signal: &SignalCandidate) -> Delivery {
        let candidate = signal.clone();
        if let Err(e) = self.write_tracker(move |t| t.open(&candidate)).await {
            self.stats.tracking_failure();
            self.fusion.lock().revoke(&signal.symbol, &signal.signal_id);
            error!(
                signal_id = %signal.signal_id,
                symbol = %signal.symbol,
                error = %e,
                "Tracking failed, signal dropped and approval revoked"
            );
            return Delivery::Untracked;
        }

        let dispatched =
            with_retry(&self.retry, "dispatch", || self.dispatcher.dispatch(signal)).await;
        if let Err(e) = dispatched {
            self.stats.dispatch_failure();
            let cause = format!("{e:#}");
            error!(
                signal_id = %signal.signal_id,
                symbol = %signal.symbol,
                error = %cause,
                "Dispatch failed, signal left ACTIVE for follow-up"
            );
            return Delivery::DispatchFailed;
        }
        self.stats.dispatched();

        let message = format_signal(signal);
        let broadcast = self.broadcast(&message, &Channel::ALL).await;
        Delivery::Delivered { broadcast }
    }

    async fn broadcast(&self, message: &str, channels: &[Channel]) -> bool {
        let sent = with_retry(&self.broadcast_retry, "broadcast", || {
            self.broadcaster.broadcast(message, channels)
        })
        .await;
        match sent {
            Ok(()) => {
                self.stats.broadcast();
                true
            }
            Err(e) => {
                self.stats.broadcast_failure();
                let cause = format!("{e:#}");
                warn!(error = %cause, "Broadcast failed");
                false
            }
        }
    }

    pub fn reconcile(&self) -> usize {
        self.reconcile_at(Utc::now())
    }

    /// Force-closes every ACTIVE signal older than the staleness threshold
    /// at its own entry price with reason TIMEOUT.
    pub fn reconcile_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = Duration::hours(self.config.scheduler.stale_after_hours);
        let stale = self.tracker.find_stale(max_age, now);
        if stale.is_empty() {
            debug!("Reconciliation: nothing stale");
            return 0;
        }

        let mut closed = 0;
        for signal in stale {
            match self
                .tracker
                .close_at(&signal.signal_id, signal.entry_price, CloseReason::Timeout, now)
            {
                Ok(outcome) => {
                    closed += 1;
                    self.stats.reconciled();
                    self.record_outcome(&outcome);
                    info!(
                        signal_id = %signal.signal_id,
                        symbol = %signal.symbol,
                        age_h = signal.age_seconds(now) / 3600,
                        "Reconciled stale signal at entry (TIMEOUT)"
                    );
                }
                Err(TrackerError::AlreadyClosed(_)) => {
                    debug!(signal_id = %signal.signal_id, "Closed concurrently, skipping");
                }
                Err(e) => {
                    self.stats.tracking_failure();
                    error!(signal_id = %signal.signal_id, error = %e, "Reconciliation close failed");
                }
            }
        }
        info!(closed, "Reconciliation sweep complete");
        closed
    }

    /// Lets the fusion engine know when a tracked signal reached a terminal
    /// state.
    pub fn record_outcome(&self, outcome: &SignalOutcome) {
        if !outcome.is_final {
            return;
        }
        if let Some(reason) = outcome.close_reason {
            self.fusion
                .lock()
                .signal_closed(&outcome.symbol, &outcome.signal_id, reason);
        }
    }

    /// Best-effort free-form broadcast (startup notices and the like).
    pub async fn announce(&self, message: &str, channels: &[Channel]) -> bool {
        self.broadcast(message, channels).await
    }

    pub async fn announce_outcome(&self, outcome: &SignalOutcome) -> bool {
        self.broadcast(&format_outcome(outcome), &Channel::SUBSCRIBERS).await
    }

    /// Builds the report for `date`, broadcasts it when anything closed that
    /// day, and starts a fresh fusion stats window.
    pub async fn send_daily_report(&self, date: NaiveDate) -> bool {
        let report = DailyReport::new(self.tracker.get_daily_stats(date));
        let sent = if report.is_empty() {
            info!("No closed signals for {}, skipping report", date);
            false
        } else {
            report.log_summary();
            self.broadcast(&report.render(), &[Channel::Vip, Channel::Admin])
                .await
        };
        self.fusion.lock().reset_stats();
        sent
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            fusion: self.fusion.lock().stats(),
            pipeline: self.stats.snapshot(),
            tracker: self.tracker.get_stats(),
            dispatcher: self.dispatcher.stats(),
            broadcaster: self.broadcaster.stats(),
        }
    }

    pub fn log_status(&self) {
        let s = self.status();
        info!("{}", "=".repeat(60));
        info!("SIGNAL ENGINE STATUS");
        info!(
            "Fusion: {} candidates | {} approved ({:.1}%) | cooldown {} | trend {} | opposite {} | rate {} | not selected {}",
            s.fusion.stats.total_candidates,
            s.fusion.stats.approved,
            s.fusion.approval_rate,
            s.fusion.stats.rejected_cooldown,
            s.fusion.stats.rejected_trend,
            s.fusion.stats.rejected_opposite,
            s.fusion.stats.rejected_rate_limit,
            s.fusion.stats.rejected_not_selected
        );
        info!(
            "Pipeline: {} cycles | tracked fail {} | dispatched {} (fail {}) | broadcast {} (fail {}) | reconciled {}",
            s.pipeline.cycles,
            s.pipeline.tracking_failures,
            s.pipeline.dispatched,
            s.pipeline.dispatch_failures,
            s.pipeline.broadcasts,
            s.pipeline.broadcast_failures,
            s.pipeline.reconciled
        );
        info!(
            "Tracker: {} active | {} closed | win rate {:.1}% | avg {:+.2}%",
            s.tracker.active_signals,
            s.tracker.closed_signals,
            s.tracker.win_rate,
            s.tracker.avg_profit
        );
        info!("{}", "=".repeat(60));
    }
}
