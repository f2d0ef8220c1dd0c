use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{BotSource, CloseReason, Side, SignalCandidate, SignalStatus};

/// Tracked lifecycle row for an admitted candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profits: Vec<f64>,
    /// Distance to the first target, as a percentage of entry.
    pub tp_pct: f64,
    /// Distance to the stop, as a percentage of entry.
    pub sl_pct: f64,
    pub confidence: f64,
    pub bot_source: BotSource,
    pub timeframe: String,
    pub opened_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub current_target_index: usize,
    pub total_targets: usize,
    /// Cumulative profit percentage recorded at each target hit, in order.
    #[serde(default)]
    pub partial_profits: Vec<f64>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub profit_pct: Option<f64>,
    #[serde(default)]
    pub close_reason: Option<CloseReason>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

impl Signal {
    pub fn from_candidate(candidate: &SignalCandidate) -> Self {
        let entry = candidate.entry;
        let first_tp = candidate.take_profits.first().copied().unwrap_or(entry);
        let tp_pct = round4(candidate.side.profit_pct(entry, first_tp));
        let sl_pct = round4(-candidate.side.profit_pct(entry, candidate.stop_loss));

        Self {
            signal_id: candidate.signal_id.clone(),
            symbol: candidate.symbol.clone(),
            side: candidate.side,
            entry_price: entry,
            stop_loss: candidate.stop_loss,
            take_profits: candidate.take_profits.clone(),
            tp_pct,
            sl_pct,
            confidence: candidate.confidence,
            bot_source: candidate.bot_source,
            timeframe: candidate.timeframe.clone(),
            opened_at: candidate.created_at,
            status: SignalStatus::Active,
            current_target_index: 0,
            total_targets: candidate.take_profits.len(),
            partial_profits: Vec::new(),
            closed_at: None,
            exit_price: None,
            profit_pct: None,
            close_reason: None,
            duration_seconds: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_seconds()
    }

    pub fn duration(&self) -> Option<SignalDuration> {
        self.duration_seconds.map(SignalDuration::from_seconds)
    }
}

/// Result of a target hit or a closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub bot_source: BotSource,
    pub entry: f64,
    pub exit_price: f64,
    pub profit_pct: f64,
    /// Present only when the signal is now CLOSED.
    pub close_reason: Option<CloseReason>,
    pub opened_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub current_target_index: usize,
    pub total_targets: usize,
    pub partial_profits: Vec<f64>,
    pub is_final: bool,
    pub duration: SignalDuration,
}

impl SignalOutcome {
    pub(crate) fn from_signal(signal: &Signal, price: f64, profit_pct: f64, at: DateTime<Utc>) -> Self {
        Self {
            signal_id: signal.signal_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            bot_source: signal.bot_source,
            entry: signal.entry_price,
            exit_price: price,
            profit_pct,
            close_reason: signal.close_reason,
            opened_at: signal.opened_at,
            recorded_at: at,
            current_target_index: signal.current_target_index,
            total_targets: signal.total_targets,
            partial_profits: signal.partial_profits.clone(),
            is_final: signal.status == SignalStatus::Closed,
            duration: SignalDuration::from_seconds((at - signal.opened_at).num_seconds()),
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.profit_pct > 0.0
    }
}

/// Wall-clock span between open and close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDuration {
    pub total_seconds: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl SignalDuration {
    pub fn from_seconds(total_seconds: i64) -> Self {
        let secs = total_seconds.max(0);
        Self {
            total_seconds: secs,
            days: secs / 86_400,
            hours: (secs % 86_400) / 3_600,
            minutes: (secs % 3_600) / 60,
        }
    }

    pub fn total_minutes(&self) -> f64 {
        self.total_seconds as f64 / 60.0
    }
}

impl fmt::Display for SignalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn unit(n: i64, name: &str) -> String {
            if n == 1 {
                format!("{n} {name}")
            } else {
                format!("{n} {name}s")
            }
        }

        let mut parts = Vec::new();
        if self.days > 0 {
            parts.push(unit(self.days, "day"));
        }
        if self.hours > 0 {
            parts.push(unit(self.hours, "hour"));
        }
        if self.minutes > 0 || parts.is_empty() {
            parts.push(unit(self.minutes, "minute"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
