use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::signal::round4;
use crate::models::{CloseReason, Signal, SignalCandidate, SignalOutcome, SignalStatus};
use crate::tracker::{DailyStats, SignalStore, TrackerError, TrackerStats};

/// Owner of every tracked signal row.
///
/// Reads take the shared lock and may run concurrently. Writes take the
/// exclusive lock for the whole validate-mutate-persist sequence, so they are
/// serialized globally and a failed persist never leaves a half-applied row
/// visible to readers.
pub struct SignalTracker {
    store: SignalStore,
    signals: RwLock<HashMap<String, Signal>>,
}

impl SignalTracker {
    pub fn new(store: SignalStore) -> Result<Self, TrackerError> {
        let signals = store.load()?;
        let active = signals.values().filter(|s| s.is_active()).count();
        info!(
            total = signals.len(),
            active = active,
            "Signal tracker initialized"
        );
        Ok(Self {
            store,
            signals: RwLock::new(signals),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: SignalStore::in_memory(),
            signals: RwLock::new(HashMap::new()),
        }
    }

    // --- Writes ---

    pub fn open(&self, candidate: &SignalCandidate) -> Result<Signal, TrackerError> {
        if candidate.take_profits.is_empty() {
            warn!(signal_id = %candidate.signal_id, "Refusing to track signal without targets");
            return Err(TrackerError::EmptyTargets(candidate.signal_id.clone()));
        }

        let mut guard = self.signals.write();
        if guard.contains_key(&candidate.signal_id) {
            return Err(TrackerError::Duplicate(candidate.signal_id.clone()));
        }

        let signal = Signal::from_candidate(candidate);
        guard.insert(signal.signal_id.clone(), signal.clone());
        if let Err(e) = self.store.save(&guard) {
            guard.remove(&signal.signal_id);
            return Err(e);
        }

        info!(
            signal_id = %signal.signal_id,
            symbol = %signal.symbol,
            side = %signal.side,
            entry = signal.entry_price,
            targets = signal.total_targets,
            "Signal tracked"
        );
        Ok(signal)
    }

    pub fn on_target_hit(
        &self,
        signal_id: &str,
        hit_price: f64,
        expected_target: Option<usize>,
    ) -> Result<SignalOutcome, TrackerError> {
        self.on_target_hit_at(signal_id, hit_price, expected_target, Utc::now())
    }

    /// Records the next target in sequence. `expected_target` is the 1-based
    /// ordinal the caller believes was hit; it must equal the current index
    /// plus one.
    pub fn on_target_hit_at(
        &self,
        signal_id: &str,
        hit_price: f64,
        expected_target: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<SignalOutcome, TrackerError> {
        check_price(signal_id, hit_price)?;

        self.mutate(signal_id, |signal| {
            if signal.status == SignalStatus::Closed {
                return Err(TrackerError::AlreadyClosed(signal_id.to_string()));
            }
            if signal.current_target_index >= signal.total_targets {
                return Err(TrackerError::TargetsComplete(signal_id.to_string()));
            }
            let next = signal.current_target_index + 1;
            if let Some(got) = expected_target {
                if got != next {
                    warn!(
                        signal_id = %signal_id,
                        expected = next,
                        got = got,
                        "Target hit out of order"
                    );
                    return Err(TrackerError::OutOfOrder {
                        id: signal_id.to_string(),
                        expected: next,
                        got,
                    });
                }
            }

            let profit = round4(signal.side.profit_pct(signal.entry_price, hit_price));
            signal.partial_profits.push(profit);
            signal.current_target_index = next;

            if next >= signal.total_targets {
                finalize(signal, hit_price, profit, CloseReason::Target, now);
                info!(
                    signal_id = %signal_id,
                    symbol = %signal.symbol,
                    profit_pct = profit,
                    "Final target hit, signal closed"
                );
            } else {
                info!(
                    signal_id = %signal_id,
                    symbol = %signal.symbol,
                    target = next,
                    of = signal.total_targets,
                    profit_pct = profit,
                    "Target hit"
                );
            }

            Ok(SignalOutcome::from_signal(signal, hit_price, profit, now))
        })
    }

    pub fn close(
        &self,
        signal_id: &str,
        exit_price: f64,
        reason: CloseReason,
    ) -> Result<SignalOutcome, TrackerError> {
        self.close_at(signal_id, exit_price, reason, Utc::now())
    }

    pub fn close_at(
        &self,
        signal_id: &str,
        exit_price: f64,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<SignalOutcome, TrackerError> {
        check_price(signal_id, exit_price)?;

        self.mutate(signal_id, |signal| {
            if signal.status == SignalStatus::Closed {
                return Err(TrackerError::AlreadyClosed(signal_id.to_string()));
            }

            let profit = round4(signal.side.profit_pct(signal.entry_price, exit_price));
            finalize(signal, exit_price, profit, reason, now);
            info!(
                signal_id = %signal_id,
                symbol = %signal.symbol,
                reason = %reason,
                exit = exit_price,
                profit_pct = profit,
                "Signal closed"
            );

            Ok(SignalOutcome::from_signal(signal, exit_price, profit, now))
        })
    }

    /// Applies `f` to a copy of the row and commits it only if `f` succeeds
    /// and the table persists.
    fn mutate<F>(&self, signal_id: &str, f: F) -> Result<SignalOutcome, TrackerError>
    where
        F: FnOnce(&mut Signal) -> Result<SignalOutcome, TrackerError>,
    {
        let mut guard = self.signals.write();
        let previous = guard
            .get(signal_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(signal_id.to_string()))?;

        let mut updated = previous.clone();
        let outcome = f(&mut updated)?;

        guard.insert(signal_id.to_string(), updated);
        if let Err(e) = self.store.save(&guard) {
            guard.insert(signal_id.to_string(), previous);
            warn!(signal_id = %signal_id, error = %e, "Persist failed, change rolled back");
            return Err(e);
        }
        Ok(outcome)
    }

    // --- Reads ---

    pub fn get(&self, signal_id: &str) -> Option<Signal> {
        self.signals.read().get(signal_id).cloned()
    }

    /// Active signals, newest first.
    pub fn get_active(&self) -> Vec<Signal> {
        let mut active: Vec<Signal> = self
            .signals
            .read()
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.opened_at
                .cmp(&a.opened_at)
                .then_with(|| a.signal_id.cmp(&b.signal_id))
        });
        active
    }

    pub fn get_stats(&self) -> TrackerStats {
        TrackerStats::compute(self.signals.read().values())
    }

    pub fn get_daily_stats(&self, date: NaiveDate) -> DailyStats {
        DailyStats::compute(date, self.signals.read().values())
    }

    /// Active signals opened more than `max_age` before `now`, oldest first.
    pub fn find_stale(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<Signal> {
        let mut stale: Vec<Signal> = self
            .signals
            .read()
            .values()
            .filter(|s| s.is_active() && now - s.opened_at > max_age)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        stale
    }

    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }
}

fn check_price(signal_id: &str, price: f64) -> Result<(), TrackerError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(TrackerError::InvalidPrice {
            id: signal_id.to_string(),
            price,
        })
    }
}

fn finalize(signal: &mut Signal, exit: f64, profit: f64, reason: CloseReason, now: DateTime<Utc>) {
    signal.status = SignalStatus::Closed;
    signal.exit_price = Some(exit);
    signal.profit_pct = Some(profit);
    signal.close_reason = Some(reason);
    signal.closed_at = Some(now);
    signal.duration_seconds = Some((now - signal.opened_at).num_seconds().max(0));
}
