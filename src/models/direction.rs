use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Signed percentage move from `entry` to `price`, positive when the
    /// move is in this side's favour.
    pub fn profit_pct(self, entry: f64, price: f64) -> f64 {
        match self {
            Side::Long => (price - entry) / entry * 100.0,
            Side::Short => (entry - price) / entry * 100.0,
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Side::Long),
            "SHORT" | "SELL" => Ok(Side::Short),
            other => Err(format!("invalid side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendBias {
    Long,
    Short,
    #[default]
    Neutral,
}

impl fmt::Display for TrendBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendBias::Long => write!(f, "LONG"),
            TrendBias::Short => write!(f, "SHORT"),
            TrendBias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl TrendBias {
    pub fn to_side(self) -> Option<Side> {
        match self {
            TrendBias::Long => Some(Side::Long),
            TrendBias::Short => Some(Side::Short),
            TrendBias::Neutral => None,
        }
    }
}

impl From<Side> for TrendBias {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => TrendBias::Long,
            Side::Short => TrendBias::Short,
        }
    }
}

/// The fixed set of analyzers allowed to emit candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BotSource {
    #[serde(rename = "SCALPING")]
    Scalping,
    #[serde(rename = "TREND")]
    Trend,
    #[serde(rename = "QFL")]
    Qfl,
    #[serde(rename = "AI_ML")]
    AiMl,
}

impl fmt::Display for BotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BotSource {
    pub const ALL: [BotSource; 4] = [
        BotSource::Scalping,
        BotSource::Trend,
        BotSource::Qfl,
        BotSource::AiMl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BotSource::Scalping => "SCALPING",
            BotSource::Trend => "TREND",
            BotSource::Qfl => "QFL",
            BotSource::AiMl => "AI_ML",
        }
    }

    /// Tie-break rank used when two candidates share a confidence.
    pub fn default_priority(&self) -> u8 {
        match self {
            BotSource::Trend => 4,
            BotSource::AiMl => 3,
            BotSource::Scalping => 2,
            BotSource::Qfl => 1,
        }
    }
}

impl FromStr for BotSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCALPING" => Ok(BotSource::Scalping),
            "TREND" => Ok(BotSource::Trend),
            "QFL" => Ok(BotSource::Qfl),
            "AI_ML" => Ok(BotSource::AiMl),
            other => Err(format!("invalid bot source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    #[serde(rename = "TP")]
    Target,
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "CANCEL")]
    Cancel,
    #[serde(rename = "REVERSAL")]
    Reversal,
    /// Forced break-even close by the reconciliation sweep.
    #[serde(rename = "TIMEOUT")]
    Timeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CloseReason {
    pub const ALL: [CloseReason; 5] = [
        CloseReason::Target,
        CloseReason::StopLoss,
        CloseReason::Cancel,
        CloseReason::Reversal,
        CloseReason::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Target => "TP",
            CloseReason::StopLoss => "SL",
            CloseReason::Cancel => "CANCEL",
            CloseReason::Reversal => "REVERSAL",
            CloseReason::Timeout => "TIMEOUT",
        }
    }
}

impl FromStr for CloseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TP" | "TARGET" => Ok(CloseReason::Target),
            "SL" | "STOP_LOSS" => Ok(CloseReason::StopLoss),
            "CANCEL" => Ok(CloseReason::Cancel),
            "REVERSAL" => Ok(CloseReason::Reversal),
            "TIMEOUT" => Ok(CloseReason::Timeout),
            other => Err(format!("invalid close reason: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Active,
    Closed,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Active => write!(f, "ACTIVE"),
            SignalStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_aliases() {
        assert_eq!("long".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Short);
        assert!("FLAT".parse::<Side>().is_err());
    }

    #[test]
    fn profit_pct_flips_for_short() {
        assert!((Side::Long.profit_pct(100.0, 102.0) - 2.0).abs() < 1e-9);
        assert!((Side::Short.profit_pct(100.0, 98.0) - 2.0).abs() < 1e-9);
        assert!((Side::Short.profit_pct(100.0, 102.0) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn bot_source_serde_uses_wire_names() {
        let json = serde_json::to_string(&BotSource::AiMl).unwrap();
        assert_eq!(json, "\"AI_ML\"");
        let back: BotSource = serde_json::from_str("\"QFL\"").unwrap();
        assert_eq!(back, BotSource::Qfl);
    }

    #[test]
    fn close_reason_round_trips_wire_code() {
        for reason in CloseReason::ALL {
            assert_eq!(reason.as_str().parse::<CloseReason>().unwrap(), reason);
        }
    }
}
