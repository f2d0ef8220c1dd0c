use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::config::FusionConfig;
use crate::fusion::stats::{FusionStats, FusionSummary, RejectReason, Rejection};
use crate::models::{CloseReason, Side, SignalCandidate, TrendBias};

/// State the engine carries between cycles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FusionState {
    pub last_signal_by_symbol: HashMap<String, SignalCandidate>,
    /// Close reason for the current last signal, if its closure was reported.
    pub last_close_reason_by_symbol: HashMap<String, CloseReason>,
    pub last_signal_time_by_symbol: HashMap<String, DateTime<Utc>>,
    pub trend_bias_by_symbol: HashMap<String, TrendBias>,
    pub signals_this_hour: VecDeque<DateTime<Utc>>,
    pub signals_per_symbol_this_hour: HashMap<String, VecDeque<DateTime<Utc>>>,
    /// What the last approval replaced, so it can be undone by [`FusionEngine::revoke`].
    #[serde(skip)]
    superseded_by_symbol: HashMap<String, PriorApproval>,
}

/// A symbol's approval state just before a newer approval replaced it.
#[derive(Debug, Clone)]
struct PriorApproval {
    signal: SignalCandidate,
    at: DateTime<Utc>,
    close_reason: Option<CloseReason>,
}

#[derive(Debug, Clone, Default)]
pub struct FusionReport {
    pub approved: Vec<SignalCandidate>,
    pub rejected: Vec<Rejection>,
}

pub struct FusionEngine {
    config: FusionConfig,
    state: FusionState,
    stats: FusionStats,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        info!(
            same_cooldown_m = config.cooldown_same_direction_minutes,
            opposite_cooldown_m = config.cooldown_opposite_direction_minutes,
            reversal_min = config.reversal_min_confidence,
            max_per_hour = config.max_signals_per_hour_global,
            "Fusion engine initialized"
        );
        Self {
            config,
            state: FusionState::default(),
            stats: FusionStats::default(),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    pub fn update_trend_bias(&mut self, symbol: &str, side: Side) {
        let bias = TrendBias::from(side);
        let previous = self
            .state
            .trend_bias_by_symbol
            .insert(symbol.to_string(), bias);
        if previous != Some(bias) {
            info!(symbol, %bias, "Trend bias updated");
        }
    }

    pub fn trend_bias(&self, symbol: &str) -> TrendBias {
        self.state
            .trend_bias_by_symbol
            .get(symbol)
            .copied()
            .unwrap_or_default()
    }

    pub fn process(&mut self, candidates: Vec<SignalCandidate>) -> Vec<SignalCandidate> {
        self.process_at(candidates, Utc::now()).approved
    }

    /// Like [`FusionEngine::process`], but also reports every rejection.
    pub fn process_detailed(&mut self, candidates: Vec<SignalCandidate>) -> FusionReport {
        self.process_at(candidates, Utc::now())
    }

    /// Run one arbitration pass over a cycle's batch.
    pub fn process_at(&mut self, candidates: Vec<SignalCandidate>, now: DateTime<Utc>) -> FusionReport {
        let mut report = FusionReport::default();
        if candidates.is_empty() {
            return report;
        }

        self.stats.total_candidates += candidates.len() as u64;
        self.prune_hourly(now);

        let total = candidates.len();
        let groups = group_by_symbol(candidates);
        debug!(candidates = total, symbols = groups.len(), "Processing candidates");

        for (symbol, symbol_candidates) in groups {
            if self.state.signals_this_hour.len() >= self.config.max_signals_per_hour_global {
                warn!(
                    symbol = %symbol,
                    cap = self.config.max_signals_per_hour_global,
                    "Global rate limit reached"
                );
                self.reject_all(&mut report, symbol_candidates, RejectReason::GlobalRateLimit);
                continue;
            }

            let symbol_count = self
                .state
                .signals_per_symbol_this_hour
                .get(&symbol)
                .map_or(0, |w| w.len());
            if symbol_count >= self.config.max_signals_per_hour_per_symbol {
                warn!(
                    symbol = %symbol,
                    cap = self.config.max_signals_per_hour_per_symbol,
                    "Symbol rate limit reached"
                );
                self.reject_all(&mut report, symbol_candidates, RejectReason::SymbolRateLimit);
                continue;
            }

            let survivors = self.apply_cooldown_filter(&symbol, symbol_candidates, now, &mut report);
            if survivors.is_empty() {
                continue;
            }

            let survivors = self.apply_trend_filter(&symbol, survivors, &mut report);
            if survivors.is_empty() {
                continue;
            }

            let best = match self.select_best(survivors, &mut report) {
                Some(c) => c,
                None => continue,
            };

            if self.is_blocked_by_opposite_signal(&symbol, &best) {
                warn!(
                    symbol = %symbol,
                    side = %best.side,
                    signal_id = best.short_id(),
                    "Blocked: active opposite signal exists"
                );
                self.reject(&mut report, &best, RejectReason::OppositeSignal);
                continue;
            }

            info!(
                symbol = %symbol,
                side = %best.side,
                source = %best.bot_source,
                confidence = best.confidence,
                signal_id = best.short_id(),
                "APPROVED"
            );
            self.record_approved(&symbol, &best, now);
            self.stats.approved += 1;
            report.approved.push(best);
        }

        info!(
            approved = report.approved.len(),
            candidates = total,
            "Fusion pass complete"
        );
        report
    }

    /// Records a closure for the symbol's last approved signal. The
    /// last-approved reference is kept so cooldown timing still applies;
    /// only the opposite-signal block is lifted.
    pub fn signal_closed(&mut self, symbol: &str, signal_id: &str, reason: CloseReason) -> bool {
        let matches = self
            .state
            .last_signal_by_symbol
            .get(symbol)
            .is_some_and(|last| last.signal_id == signal_id);
        if matches {
            info!(symbol, %reason, "Signal closed, opposite signals now allowed");
            self.state
                .last_close_reason_by_symbol
                .insert(symbol.to_string(), reason);
        } else {
            debug!(symbol, signal_id, "Closure for a signal that is no longer the latest");
        }
        matches
    }

    /// Undoes the approval of a signal that never reached tracking, so it
    /// neither blocks the opposite side nor counts against rate limits. The
    /// symbol falls back to whatever it held before that approval.
    pub fn revoke(&mut self, symbol: &str, signal_id: &str) -> bool {
        let is_latest = self
            .state
            .last_signal_by_symbol
            .get(symbol)
            .is_some_and(|last| last.signal_id == signal_id);
        if !is_latest {
            debug!(symbol, signal_id, "Revoke for a signal that is no longer the latest");
            return false;
        }

        let approved_at = self.state.last_signal_time_by_symbol.get(symbol).copied();
        match self.state.superseded_by_symbol.remove(symbol) {
            Some(prior) => {
                self.state
                    .last_signal_by_symbol
                    .insert(symbol.to_string(), prior.signal);
                self.state
                    .last_signal_time_by_symbol
                    .insert(symbol.to_string(), prior.at);
                match prior.close_reason {
                    Some(reason) => {
                        self.state
                            .last_close_reason_by_symbol
                            .insert(symbol.to_string(), reason);
                    }
                    None => {
                        self.state.last_close_reason_by_symbol.remove(symbol);
                    }
                }
            }
            None => {
                self.state.last_signal_by_symbol.remove(symbol);
                self.state.last_signal_time_by_symbol.remove(symbol);
                self.state.last_close_reason_by_symbol.remove(symbol);
            }
        }

        if let Some(at) = approved_at {
            remove_latest(&mut self.state.signals_this_hour, at);
            if let Some(window) = self.state.signals_per_symbol_this_hour.get_mut(symbol) {
                remove_latest(window, at);
                if window.is_empty() {
                    self.state.signals_per_symbol_this_hour.remove(symbol);
                }
            }
        }

        warn!(symbol, signal_id, "Approval revoked");
        true
    }

    pub fn stats(&self) -> FusionSummary {
        FusionSummary {
            stats: self.stats.clone(),
            approval_rate: self.stats.approval_rate(),
            tracked_symbols: self.state.last_signal_by_symbol.len(),
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = FusionStats::default();
    }

    fn prune_hourly(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(1);
        prune_window(&mut self.state.signals_this_hour, cutoff);
        for window in self.state.signals_per_symbol_this_hour.values_mut() {
            prune_window(window, cutoff);
        }
        self.state
            .signals_per_symbol_this_hour
            .retain(|_, w| !w.is_empty());
    }

    fn apply_cooldown_filter(
        &mut self,
        symbol: &str,
        candidates: Vec<SignalCandidate>,
        now: DateTime<Utc>,
        report: &mut FusionReport,
    ) -> Vec<SignalCandidate> {
        let (last_side, last_time) = match (
            self.state.last_signal_by_symbol.get(symbol),
            self.state.last_signal_time_by_symbol.get(symbol),
        ) {
            (Some(last), Some(&time)) => (last.side, time),
            _ => return candidates,
        };
        let elapsed = now - last_time;

        let mut kept = Vec::with_capacity(candidates.len());
        for c in candidates {
            if c.side == last_side {
                let required = Duration::minutes(self.config.cooldown_same_direction_minutes);
                if elapsed >= required {
                    kept.push(c);
                } else if c.confidence >= self.config.very_strong_confidence {
                    info!(
                        symbol,
                        side = %c.side,
                        confidence = c.confidence,
                        "Cooldown bypassed (very strong)"
                    );
                    kept.push(c);
                } else {
                    debug!(
                        symbol,
                        side = %c.side,
                        elapsed_m = elapsed.num_minutes(),
                        required_m = self.config.cooldown_same_direction_minutes,
                        "Rejected by cooldown"
                    );
                    self.reject(report, &c, RejectReason::Cooldown);
                }
            } else {
                let required = Duration::minutes(self.config.cooldown_opposite_direction_minutes);
                if elapsed >= required {
                    kept.push(c);
                } else {
                    debug!(
                        symbol,
                        side = %c.side,
                        elapsed_m = elapsed.num_minutes(),
                        required_m = self.config.cooldown_opposite_direction_minutes,
                        "Opposite direction in cooldown"
                    );
                    self.reject(report, &c, RejectReason::OppositeCooldown);
                }
            }
        }
        kept
    }

    fn apply_trend_filter(
        &mut self,
        symbol: &str,
        candidates: Vec<SignalCandidate>,
        report: &mut FusionReport,
    ) -> Vec<SignalCandidate> {
        let bias = match self.trend_bias(symbol).to_side() {
            Some(side) => side,
            None => return candidates,
        };

        let mut kept = Vec::with_capacity(candidates.len());
        for c in candidates {
            if c.side == bias {
                kept.push(c);
            } else if c.confidence >= self.config.reversal_min_confidence {
                info!(
                    symbol,
                    side = %c.side,
                    confidence = c.confidence,
                    "Counter-trend approved (reversal confidence)"
                );
                kept.push(c);
            } else {
                debug!(
                    symbol,
                    side = %c.side,
                    confidence = c.confidence,
                    min = self.config.reversal_min_confidence,
                    "Rejected by trend bias"
                );
                self.reject(report, &c, RejectReason::TrendBias);
            }
        }
        kept
    }

    /// Highest confidence wins; ties go to the higher-priority source, then
    /// to input order.
    fn select_best(
        &mut self,
        mut candidates: Vec<SignalCandidate>,
        report: &mut FusionReport,
    ) -> Option<SignalCandidate> {
        let config = &self.config;
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| config.priority(b.bot_source).cmp(&config.priority(a.bot_source)))
        });

        let mut iter = candidates.into_iter();
        let best = iter.next()?;
        for loser in iter {
            self.reject(report, &loser, RejectReason::NotSelected);
        }
        Some(best)
    }

    fn is_blocked_by_opposite_signal(&self, symbol: &str, candidate: &SignalCandidate) -> bool {
        match self.state.last_signal_by_symbol.get(symbol) {
            Some(last) if last.side != candidate.side => {
                !self.state.last_close_reason_by_symbol.contains_key(symbol)
            }
            _ => false,
        }
    }

    fn record_approved(&mut self, symbol: &str, candidate: &SignalCandidate, now: DateTime<Utc>) {
        let previous = self
            .state
            .last_signal_by_symbol
            .insert(symbol.to_string(), candidate.clone());
        let previous_at = self
            .state
            .last_signal_time_by_symbol
            .insert(symbol.to_string(), now);
        let previous_reason = self.state.last_close_reason_by_symbol.remove(symbol);
        match (previous, previous_at) {
            (Some(signal), Some(at)) => {
                self.state.superseded_by_symbol.insert(
                    symbol.to_string(),
                    PriorApproval {
                        signal,
                        at,
                        close_reason: previous_reason,
                    },
                );
            }
            _ => {
                self.state.superseded_by_symbol.remove(symbol);
            }
        }
        self.state.signals_this_hour.push_back(now);
        self.state
            .signals_per_symbol_this_hour
            .entry(symbol.to_string())
            .or_default()
            .push_back(now);
    }

    fn reject(&mut self, report: &mut FusionReport, c: &SignalCandidate, reason: RejectReason) {
        self.stats.record_rejection(reason);
        report.rejected.push(Rejection {
            signal_id: c.signal_id.clone(),
            symbol: c.symbol.clone(),
            side: c.side,
            bot_source: c.bot_source,
            confidence: c.confidence,
            reason,
        });
    }

    fn reject_all(&mut self, report: &mut FusionReport, candidates: Vec<SignalCandidate>, reason: RejectReason) {
        for c in &candidates {
            self.reject(report, c, reason);
        }
    }
}

fn prune_window(window: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    window.retain(|&t| t > cutoff);
}

fn remove_latest(window: &mut VecDeque<DateTime<Utc>>, at: DateTime<Utc>) {
    if let Some(pos) = window.iter().rposition(|&t| t == at) {
        window.remove(pos);
    }
}

/// Groups by symbol, keeping first-seen symbol order and input order within
/// each group.
fn group_by_symbol(candidates: Vec<SignalCandidate>) -> Vec<(String, Vec<SignalCandidate>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<SignalCandidate>)> = Vec::new();
    for c in candidates {
        match index.get(&c.symbol) {
            Some(&i) => groups[i].1.push(c),
            None => {
                index.insert(c.symbol.clone(), groups.len());
                groups.push((c.symbol.clone(), vec![c]));
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BotSource;
    use crate::test_helpers::{base_time, make_candidate};

    fn engine() -> FusionEngine {
        FusionEngine::new(FusionConfig::default())
    }

    fn reasons(report: &FusionReport) -> Vec<RejectReason> {
        report.rejected.iter().map(|r| r.reason).collect()
    }

    #[test]
    fn empty_batch_leaves_state_untouched() {
        let mut e = engine();
        let report = e.process_at(Vec::new(), base_time());
        assert!(report.approved.is_empty());
        assert_eq!(e.stats().stats, FusionStats::default());
        assert!(e.state().signals_this_hour.is_empty());
    }

    #[test]
    fn first_candidate_for_symbol_is_approved() {
        let mut e = engine();
        let c = make_candidate("BTCUSDT", Side::Long, 75.0, BotSource::Scalping);
        let report = e.process_at(vec![c.clone()], base_time());
        assert_eq!(report.approved, vec![c.clone()]);
        assert_eq!(e.state().last_signal_by_symbol["BTCUSDT"], c);
        assert_eq!(e.state().signals_this_hour.len(), 1);
        assert_eq!(e.state().signals_per_symbol_this_hour["BTCUSDT"].len(), 1);
    }

    #[test]
    fn picks_highest_confidence_then_source_priority() {
        let mut e = engine();
        let qfl = make_candidate("ETHUSDT", Side::Long, 80.0, BotSource::Qfl);
        let trend = make_candidate("ETHUSDT", Side::Long, 80.0, BotSource::Trend);
        let scalp = make_candidate("ETHUSDT", Side::Long, 78.0, BotSource::Scalping);
        let report = e.process_at(vec![qfl, trend.clone(), scalp], base_time());
        assert_eq!(report.approved, vec![trend]);
        assert_eq!(reasons(&report), vec![RejectReason::NotSelected; 2]);
    }

    #[test]
    fn one_approval_per_symbol_per_batch() {
        let mut e = engine();
        let batch = vec![
            make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping),
            make_candidate("ETHUSDT", Side::Short, 70.0, BotSource::Scalping),
            make_candidate("BTCUSDT", Side::Long, 72.0, BotSource::AiMl),
        ];
        let report = e.process_at(batch, base_time());
        assert_eq!(report.approved.len(), 2);
        let btc = report.approved.iter().find(|c| c.symbol == "BTCUSDT").unwrap();
        assert_eq!(btc.bot_source, BotSource::AiMl);
    }

    #[test]
    fn global_cap_rejects_sixth_approval_regardless_of_confidence() {
        let mut e = FusionEngine::new(FusionConfig {
            max_signals_per_hour_global: 5,
            ..FusionConfig::default()
        });
        let t0 = base_time();
        for (i, sym) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            let c = make_candidate(sym, Side::Long, 70.0, BotSource::Scalping);
            let report = e.process_at(vec![c], t0 + Duration::minutes(i as i64));
            assert_eq!(report.approved.len(), 1);
        }

        let strong = make_candidate("F", Side::Long, 100.0, BotSource::Trend);
        let report = e.process_at(vec![strong], t0 + Duration::minutes(10));
        assert!(report.approved.is_empty());
        assert_eq!(reasons(&report), vec![RejectReason::GlobalRateLimit]);
        assert_eq!(e.stats().stats.rejected_rate_limit, 1);
    }

    #[test]
    fn hourly_window_rolls_off() {
        let mut e = FusionEngine::new(FusionConfig {
            max_signals_per_hour_global: 1,
            ..FusionConfig::default()
        });
        let t0 = base_time();
        e.process_at(vec![make_candidate("A", Side::Long, 70.0, BotSource::Qfl)], t0);

        let blocked = e.process_at(
            vec![make_candidate("B", Side::Long, 70.0, BotSource::Qfl)],
            t0 + Duration::minutes(59),
        );
        assert!(blocked.approved.is_empty());

        let allowed = e.process_at(
            vec![make_candidate("B", Side::Long, 70.0, BotSource::Qfl)],
            t0 + Duration::minutes(61),
        );
        assert_eq!(allowed.approved.len(), 1);
        assert_eq!(e.state().signals_this_hour.len(), 1);
    }

    #[test]
    fn per_symbol_cap() {
        let mut e = FusionEngine::new(FusionConfig {
            max_signals_per_hour_per_symbol: 2,
            cooldown_same_direction_minutes: 0,
            ..FusionConfig::default()
        });
        let t0 = base_time();
        for i in 0..2 {
            let c = make_candidate("SOLUSDT", Side::Long, 70.0, BotSource::Scalping);
            assert_eq!(e.process_at(vec![c], t0 + Duration::minutes(i)).approved.len(), 1);
        }
        let c = make_candidate("SOLUSDT", Side::Long, 99.0, BotSource::Trend);
        let report = e.process_at(vec![c], t0 + Duration::minutes(5));
        assert_eq!(reasons(&report), vec![RejectReason::SymbolRateLimit]);

        let other = make_candidate("ADAUSDT", Side::Long, 70.0, BotSource::Scalping);
        assert_eq!(e.process_at(vec![other], t0 + Duration::minutes(6)).approved.len(), 1);
    }

    #[test]
    fn same_direction_cooldown_override_threshold() {
        let t0 = base_time();
        let within = t0 + Duration::minutes(5);

        let mut e = engine();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], t0);
        let strong = make_candidate("BTCUSDT", Side::Long, 90.0, BotSource::Scalping);
        assert_eq!(e.process_at(vec![strong], within).approved.len(), 1);

        let mut e = engine();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], t0);
        let weak = make_candidate("BTCUSDT", Side::Long, 89.9, BotSource::Scalping);
        let report = e.process_at(vec![weak], within);
        assert_eq!(reasons(&report), vec![RejectReason::Cooldown]);
    }

    #[test]
    fn same_direction_allowed_after_cooldown() {
        let mut e = engine();
        let t0 = base_time();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], t0);
        let later = make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping);
        let report = e.process_at(vec![later], t0 + Duration::minutes(15));
        assert_eq!(report.approved.len(), 1);
    }

    #[test]
    fn opposite_cooldown_has_no_confidence_override() {
        let mut e = engine();
        let t0 = base_time();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], t0);
        let reversal = make_candidate("BTCUSDT", Side::Short, 100.0, BotSource::Trend);
        let report = e.process_at(vec![reversal], t0 + Duration::minutes(30));
        assert_eq!(reasons(&report), vec![RejectReason::OppositeCooldown]);
    }

    #[test]
    fn opposite_signal_blocks_until_closure_recorded() {
        let mut e = engine();
        let t0 = base_time();
        let long = make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping);
        e.process_at(vec![long.clone()], t0);

        let later = t0 + Duration::minutes(120);
        let short = make_candidate("BTCUSDT", Side::Short, 100.0, BotSource::Trend);
        let report = e.process_at(vec![short], later);
        assert_eq!(reasons(&report), vec![RejectReason::OppositeSignal]);

        assert!(e.signal_closed("BTCUSDT", &long.signal_id, CloseReason::StopLoss));
        // Reference is kept for cooldown timing.
        assert_eq!(e.state().last_signal_by_symbol["BTCUSDT"], long);

        let short = make_candidate("BTCUSDT", Side::Short, 70.0, BotSource::Scalping);
        let report = e.process_at(vec![short], later + Duration::minutes(1));
        assert_eq!(report.approved.len(), 1);
    }

    #[test]
    fn closure_of_superseded_signal_is_ignored() {
        let mut e = engine();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], base_time());
        assert!(!e.signal_closed("BTCUSDT", "someone-else", CloseReason::Target));
        assert!(e.state().last_close_reason_by_symbol.is_empty());
    }

    #[test]
    fn trend_bias_reversal_threshold() {
        let t0 = base_time();

        let mut e = engine();
        e.update_trend_bias("XUSDT", Side::Long);
        let strong = make_candidate("XUSDT", Side::Short, 90.0, BotSource::AiMl);
        assert_eq!(e.process_at(vec![strong], t0).approved.len(), 1);

        let mut e = engine();
        e.update_trend_bias("XUSDT", Side::Long);
        let weak = make_candidate("XUSDT", Side::Short, 80.0, BotSource::AiMl);
        let report = e.process_at(vec![weak], t0);
        assert_eq!(reasons(&report), vec![RejectReason::TrendBias]);
        assert_eq!(e.stats().stats.rejected_trend, 1);
    }

    #[test]
    fn trend_bias_passes_aligned_and_neutral() {
        let mut e = engine();
        assert_eq!(e.trend_bias("XUSDT"), TrendBias::Neutral);
        e.update_trend_bias("XUSDT", Side::Short);
        let aligned = make_candidate("XUSDT", Side::Short, 10.0, BotSource::Qfl);
        assert_eq!(e.process_at(vec![aligned], base_time()).approved.len(), 1);
    }

    #[test]
    fn bias_and_opposite_block_stay_independent() {
        // Bias allows the reversal but the unclosed LONG still blocks it.
        let mut e = engine();
        let t0 = base_time();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], t0);
        e.update_trend_bias("BTCUSDT", Side::Short);
        let short = make_candidate("BTCUSDT", Side::Short, 95.0, BotSource::Trend);
        let report = e.process_at(vec![short], t0 + Duration::hours(2));
        assert_eq!(reasons(&report), vec![RejectReason::OppositeSignal]);
    }

    #[test]
    fn reset_stats_keeps_state() {
        let mut e = engine();
        e.process_at(vec![make_candidate("BTCUSDT", Side::Long, 70.0, BotSource::Scalping)], base_time());
        e.reset_stats();
        let summary = e.stats();
        assert_eq!(summary.stats.approved, 0);
        assert_eq!(summary.tracked_symbols, 1);
    }

    #[test]
    fn revoked_approval_frees_the_opposite_side() {
        let mut e = engine();
        let t0 = base_time();
        let long = make_candidate("BTCUSDT", Side::Long, 80.0, BotSource::Trend);
        e.process_at(vec![long.clone()], t0);

        assert!(e.revoke("BTCUSDT", &long.signal_id));
        assert!(!e.state().last_signal_by_symbol.contains_key("BTCUSDT"));
        assert!(e.state().signals_this_hour.is_empty());
        assert!(!e.state().signals_per_symbol_this_hour.contains_key("BTCUSDT"));

        // No cooldown or opposite block left behind.
        let short = make_candidate("BTCUSDT", Side::Short, 80.0, BotSource::Qfl);
        let report = e.process_at(vec![short], t0 + Duration::minutes(1));
        assert_eq!(report.approved.len(), 1);
    }

    #[test]
    fn revoke_restores_the_replaced_approval() {
        let mut e = engine();
        let t0 = base_time();
        let first = make_candidate("ETHUSDT", Side::Long, 80.0, BotSource::Trend);
        e.process_at(vec![first.clone()], t0);
        assert!(e.signal_closed("ETHUSDT", &first.signal_id, CloseReason::Target));

        let later = t0 + Duration::minutes(20);
        let second = make_candidate("ETHUSDT", Side::Long, 80.0, BotSource::Scalping);
        e.process_at(vec![second.clone()], later);
        assert_eq!(e.state().signals_this_hour.len(), 2);

        assert!(e.revoke("ETHUSDT", &second.signal_id));
        let state = e.state();
        assert_eq!(state.last_signal_by_symbol["ETHUSDT"].signal_id, first.signal_id);
        assert_eq!(state.last_signal_time_by_symbol["ETHUSDT"], t0);
        assert_eq!(state.last_close_reason_by_symbol.get("ETHUSDT"), Some(&CloseReason::Target));
        assert_eq!(state.signals_this_hour, VecDeque::from(vec![t0]));
        assert_eq!(state.signals_per_symbol_this_hour["ETHUSDT"].len(), 1);

        // Only the latest approval can be undone.
        assert!(!e.revoke("ETHUSDT", &second.signal_id));
        assert!(!e.revoke("ETHUSDT", "unknown"));
    }
}
