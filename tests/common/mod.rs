use chrono::{DateTime, Utc};
use std::collections::HashMap;

use signal_engine::config::{Config, FusionConfig, SchedulerConfig};
use signal_engine::models::{generate_signal_id, BotSource, Side, SignalCandidate};

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-17T07:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Entry 100, stop 3% away, five targets spaced 1% apart on the profit side.
pub fn candidate(symbol: &str, side: Side, confidence: f64, source: BotSource) -> SignalCandidate {
    let step = match side {
        Side::Long => 1.0,
        Side::Short => -1.0,
    };
    SignalCandidate::new(
        generate_signal_id(),
        symbol,
        side,
        100.0,
        100.0 - 3.0 * step,
        (1..=5).map(|i| 100.0 + step * i as f64).collect(),
        "15m",
        confidence,
        source,
    )
    .unwrap()
}

pub fn candidate_at(
    symbol: &str,
    side: Side,
    confidence: f64,
    source: BotSource,
    at: DateTime<Utc>,
) -> SignalCandidate {
    candidate(symbol, side, confidence, source).with_created_at(at)
}

/// No remote services, one-second cadence, millisecond retry pauses.
pub fn test_config(data_dir: &str) -> Config {
    Config {
        fusion: FusionConfig::default(),
        scheduler: SchedulerConfig {
            cycle_interval_secs: 1,
            fetch_timeout_secs: 1,
            dispatch_timeout_secs: 1,
            retry_pause_ms: 1,
            ..SchedulerConfig::default()
        },
        analyzers: Vec::new(),
        data_dir: data_dir.to_string(),
        backend_url: "http://127.0.0.1:9".to_string(),
        backend_api_key: "integration".to_string(),
        telegram_token: String::new(),
        telegram_channels: HashMap::new(),
        api_bind: "127.0.0.1:0".to_string(),
        webhook_secret: "integration-secret".to_string(),
        log_level: "warn".to_string(),
    }
}
