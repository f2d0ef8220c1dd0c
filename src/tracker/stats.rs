use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::signal::round2;
use crate::models::{CloseReason, Signal, SignalStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub active_signals: usize,
    pub closed_signals: usize,
    pub total_signals: usize,
    /// Share of closed signals with positive profit, in percent.
    pub win_rate: f64,
    pub avg_profit: f64,
}

impl TrackerStats {
    pub fn compute<'a>(signals: impl Iterator<Item = &'a Signal>) -> Self {
        let mut active = 0;
        let mut closed = 0;
        let mut winners = 0;
        let mut profit_sum = 0.0;

        for s in signals {
            match s.status {
                SignalStatus::Active => active += 1,
                SignalStatus::Closed => {
                    closed += 1;
                    let p = s.profit_pct.unwrap_or(0.0);
                    if p > 0.0 {
                        winners += 1;
                    }
                    profit_sum += p;
                }
            }
        }

        Self {
            active_signals: active,
            closed_signals: closed,
            total_signals: active + closed,
            win_rate: if closed > 0 {
                round2(winners as f64 / closed as f64 * 100.0)
            } else {
                0.0
            },
            avg_profit: if closed > 0 {
                round2(profit_sum / closed as f64)
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_signals: usize,
    pub tp_count: usize,
    pub sl_count: usize,
    pub cancel_count: usize,
    pub reversal_count: usize,
    pub timeout_count: usize,
    pub winners: usize,
    pub losers: usize,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_duration_minutes: i64,
    /// Number of signals closed that day, keyed by how many targets each
    /// reached before closing.
    pub targets_reached: BTreeMap<usize, usize>,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_signals: 0,
            tp_count: 0,
            sl_count: 0,
            cancel_count: 0,
            reversal_count: 0,
            timeout_count: 0,
            winners: 0,
            losers: 0,
            win_rate: 0.0,
            avg_profit: 0.0,
            best_trade: 0.0,
            worst_trade: 0.0,
            avg_duration_minutes: 0,
            targets_reached: BTreeMap::new(),
        }
    }

    /// Aggregates the signals that were CLOSED on `date` (UTC).
    pub fn compute<'a>(date: NaiveDate, signals: impl Iterator<Item = &'a Signal>) -> Self {
        let closed: Vec<&Signal> = signals
            .filter(|s| s.status == SignalStatus::Closed)
            .filter(|s| s.closed_at.is_some_and(|t| t.date_naive() == date))
            .collect();

        if closed.is_empty() {
            return Self::empty(date);
        }

        let mut stats = Self::empty(date);
        stats.total_signals = closed.len();

        let mut profit_sum = 0.0;
        let mut duration_sum: i64 = 0;
        let mut best = f64::NEG_INFINITY;
        let mut worst = f64::INFINITY;

        for s in &closed {
            match s.close_reason {
                Some(CloseReason::Target) => stats.tp_count += 1,
                Some(CloseReason::StopLoss) => stats.sl_count += 1,
                Some(CloseReason::Cancel) => stats.cancel_count += 1,
                Some(CloseReason::Reversal) => stats.reversal_count += 1,
                Some(CloseReason::Timeout) => stats.timeout_count += 1,
                None => {}
            }

            let p = s.profit_pct.unwrap_or(0.0);
            if p > 0.0 {
                stats.winners += 1;
            } else if p < 0.0 {
                stats.losers += 1;
            }
            profit_sum += p;
            best = best.max(p);
            worst = worst.min(p);
            duration_sum += s.duration_seconds.unwrap_or(0);

            *stats
                .targets_reached
                .entry(s.current_target_index)
                .or_insert(0) += 1;
        }

        let n = closed.len() as f64;
        stats.win_rate = round2(stats.winners as f64 / n * 100.0);
        stats.avg_profit = round2(profit_sum / n);
        stats.best_trade = round2(best);
        stats.worst_trade = round2(worst);
        stats.avg_duration_minutes = duration_sum / closed.len() as i64 / 60;
        stats
    }
}
