use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{BotSource, Side};

/// Which fusion rule turned a candidate away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    GlobalRateLimit,
    SymbolRateLimit,
    Cooldown,
    OppositeCooldown,
    TrendBias,
    OppositeSignal,
    /// Survived every filter but lost best-candidate selection.
    NotSelected,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::GlobalRateLimit => "global_rate_limit",
            RejectReason::SymbolRateLimit => "symbol_rate_limit",
            RejectReason::Cooldown => "cooldown",
            RejectReason::OppositeCooldown => "opposite_cooldown",
            RejectReason::TrendBias => "trend_bias",
            RejectReason::OppositeSignal => "opposite_signal",
            RejectReason::NotSelected => "not_selected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub bot_source: BotSource,
    pub confidence: f64,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    pub total_candidates: u64,
    pub approved: u64,
    pub rejected_cooldown: u64,
    pub rejected_trend: u64,
    pub rejected_opposite: u64,
    pub rejected_rate_limit: u64,
    pub rejected_not_selected: u64,
}

impl FusionStats {
    pub(crate) fn record_rejection(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::GlobalRateLimit | RejectReason::SymbolRateLimit => {
                self.rejected_rate_limit += 1
            }
            RejectReason::Cooldown | RejectReason::OppositeCooldown => self.rejected_cooldown += 1,
            RejectReason::TrendBias => self.rejected_trend += 1,
            RejectReason::OppositeSignal => self.rejected_opposite += 1,
            RejectReason::NotSelected => self.rejected_not_selected += 1,
        }
    }

    pub fn approval_rate(&self) -> f64 {
        if self.total_candidates == 0 {
            0.0
        } else {
            self.approved as f64 / self.total_candidates as f64 * 100.0
        }
    }
}

/// Point-in-time view of the engine counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionSummary {
    #[serde(flatten)]
    pub stats: FusionStats,
    pub approval_rate: f64,
    pub tracked_symbols: usize,
}
