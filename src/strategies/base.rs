use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{Side, SignalCandidate};

pub const DEFAULT_TARGET_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LevelError {
    #[error("no take-profit targets")]
    NoTargets,
    #[error("first target {target} is not beyond entry {entry} for {side}")]
    TargetWrongSide { side: Side, entry: f64, target: f64 },
    #[error("stop {stop} is not behind entry {entry} for {side}")]
    StopWrongSide { side: Side, entry: f64, stop: f64 },
    #[error("reward/risk {ratio:.2} below minimum {min:.2}")]
    PoorRewardRisk { ratio: f64, min: f64 },
}

/// `count` evenly spaced targets, each `step_pct` percent further from entry
/// in the profitable direction.
pub fn target_ladder(entry: f64, side: Side, step_pct: f64, count: usize) -> Vec<f64> {
    let sign = match side {
        Side::Long => 1.0,
        Side::Short => -1.0,
    };
    (1..=count)
        .map(|i| entry * (1.0 + sign * step_pct * i as f64 / 100.0))
        .collect()
}

pub fn stop_price(entry: f64, side: Side, sl_pct: f64) -> f64 {
    match side {
        Side::Long => entry * (1.0 - sl_pct / 100.0),
        Side::Short => entry * (1.0 + sl_pct / 100.0),
    }
}

/// Checks the candidate's geometry: first target on the profitable side of
/// entry, stop on the losing side, and reward/risk to the last target at
/// least `min_rr`.
pub fn validate_levels(candidate: &SignalCandidate, min_rr: f64) -> Result<(), LevelError> {
    let side = candidate.side;
    let entry = candidate.entry;
    let target = *candidate.take_profits.first().ok_or(LevelError::NoTargets)?;

    if side.profit_pct(entry, target) <= 0.0 {
        return Err(LevelError::TargetWrongSide { side, entry, target });
    }
    let last = candidate.take_profits.last().copied().unwrap_or(target);
    let reward = side.profit_pct(entry, last);
    let risk = -side.profit_pct(entry, candidate.stop_loss);
    if risk <= 0.0 {
        return Err(LevelError::StopWrongSide {
            side,
            entry,
            stop: candidate.stop_loss,
        });
    }

    let ratio = reward / risk;
    if ratio < min_rr {
        return Err(LevelError::PoorRewardRisk { ratio, min: min_rr });
    }
    Ok(())
}

/// Per-symbol minimum spacing between candidates emitted by one analyzer.
pub struct EmitCooldown {
    spacing: Duration,
    last: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl EmitCooldown {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn ready(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.last.lock().get(symbol) {
            Some(t) => now - *t >= self.spacing,
            None => true,
        }
    }

    pub fn record(&self, symbol: &str, now: DateTime<Utc>) {
        self.last.lock().insert(symbol.to_string(), now);
    }
}
