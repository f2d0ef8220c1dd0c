use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BotSource, Side};

pub const PAYLOAD_VERSION: &str = "SE.v2.0";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandidateError {
    #[error("invalid side: {0}")]
    InvalidSide(String),
    #[error("invalid confidence: {0} (must be 0-100)")]
    InvalidConfidence(f64),
    #[error("invalid bot source: {0}")]
    InvalidSource(String),
    #[error("invalid {field}: {value}")]
    InvalidPrice { field: &'static str, value: f64 },
    #[error("missing {0}")]
    Missing(&'static str),
}

/// A trade proposal from exactly one analyzer. Deserialization goes through
/// the same validation as [`SignalCandidate::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandidate")]
pub struct SignalCandidate {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profits: Vec<f64>,
    pub timeframe: String,
    pub confidence: f64,
    pub bot_source: BotSource,
    pub created_at: DateTime<Utc>,
}

/// Unvalidated candidate as it arrives from an analyzer service.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub signal_id: Option<String>,
    pub symbol: String,
    pub side: String,
    pub entry: f64,
    pub stop_loss: f64,
    #[serde(default)]
    pub take_profits: Vec<f64>,
    #[serde(default)]
    pub timeframe: String,
    pub confidence: f64,
    pub bot_source: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawCandidate> for SignalCandidate {
    type Error = CandidateError;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        let side = raw
            .side
            .parse::<Side>()
            .map_err(|_| CandidateError::InvalidSide(raw.side.clone()))?;
        let source = raw
            .bot_source
            .parse::<BotSource>()
            .map_err(|_| CandidateError::InvalidSource(raw.bot_source.clone()))?;

        let mut candidate = SignalCandidate::new(
            raw.signal_id.unwrap_or_else(generate_signal_id),
            &raw.symbol,
            side,
            raw.entry,
            raw.stop_loss,
            raw.take_profits,
            &raw.timeframe,
            raw.confidence,
            source,
        )?;
        if let Some(ts) = raw.created_at {
            candidate.created_at = ts;
        }
        Ok(candidate)
    }
}

impl SignalCandidate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signal_id: String,
        symbol: &str,
        side: Side,
        entry: f64,
        stop_loss: f64,
        take_profits: Vec<f64>,
        timeframe: &str,
        confidence: f64,
        bot_source: BotSource,
    ) -> Result<Self, CandidateError> {
        if signal_id.trim().is_empty() {
            return Err(CandidateError::Missing("signal_id"));
        }
        if symbol.trim().is_empty() {
            return Err(CandidateError::Missing("symbol"));
        }
        if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
            return Err(CandidateError::InvalidConfidence(confidence));
        }
        if take_profits.is_empty() {
            return Err(CandidateError::Missing("take_profits"));
        }
        check_price("entry", entry)?;
        check_price("stop_loss", stop_loss)?;
        for &tp in &take_profits {
            check_price("take_profit", tp)?;
        }

        Ok(Self {
            signal_id,
            symbol: symbol.to_string(),
            side,
            entry,
            stop_loss,
            take_profits,
            timeframe: timeframe.to_string(),
            confidence,
            bot_source,
            created_at: Utc::now(),
        })
    }

    /// Same as [`SignalCandidate::new`] but with string-typed side and
    /// source, as received from loosely-typed producers.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        signal_id: String,
        symbol: &str,
        side: &str,
        entry: f64,
        stop_loss: f64,
        take_profits: Vec<f64>,
        timeframe: &str,
        confidence: f64,
        bot_source: &str,
    ) -> Result<Self, CandidateError> {
        SignalCandidate::try_from(RawCandidate {
            signal_id: Some(signal_id),
            symbol: symbol.to_string(),
            side: side.to_string(),
            entry,
            stop_loss,
            take_profits,
            timeframe: timeframe.to_string(),
            confidence,
            bot_source: bot_source.to_string(),
            created_at: None,
        })
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Payload delivered to the backend system of record.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "signal_id": self.signal_id,
            "symbol": self.symbol,
            "side": self.side,
            "entry": self.entry,
            "stop_loss": self.stop_loss,
            "take_profits": self.take_profits,
            "timeframe": self.timeframe,
            "confidence": self.confidence,
            "bot_source": self.bot_source,
            "created_at": self.created_at.to_rfc3339(),
            "version": PAYLOAD_VERSION,
        })
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.signal_id)
    }
}

fn check_price(field: &'static str, value: f64) -> Result<(), CandidateError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CandidateError::InvalidPrice { field, value })
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

pub fn generate_signal_id() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{:08x}-{:04x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u64>() & 0xffff_ffff_ffff
    )
}
