use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::BotSource;

pub type SharedConfig = Arc<Config>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub max_signals_per_hour_global: usize,
    pub max_signals_per_hour_per_symbol: usize,
    pub cooldown_same_direction_minutes: i64,
    pub cooldown_opposite_direction_minutes: i64,
    /// Confidence at or above which a same-direction cooldown is bypassed.
    pub very_strong_confidence: f64,
    /// Minimum confidence for a candidate that opposes the trend bias.
    pub reversal_min_confidence: f64,
    /// The analyzer whose candidates set the per-symbol trend bias.
    pub trend_source: BotSource,
    pub source_priority: HashMap<BotSource, u8>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_signals_per_hour_global: 12,
            max_signals_per_hour_per_symbol: 3,
            cooldown_same_direction_minutes: 15,
            cooldown_opposite_direction_minutes: 60,
            very_strong_confidence: 90.0,
            reversal_min_confidence: 85.0,
            trend_source: BotSource::Trend,
            source_priority: BotSource::ALL
                .iter()
                .map(|s| (*s, s.default_priority()))
                .collect(),
        }
    }
}

impl FusionConfig {
    pub fn priority(&self, source: BotSource) -> u8 {
        self.source_priority.get(&source).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub source: BotSource,
    pub enabled: bool,
    pub interval_secs: u64,
    pub symbols: Vec<String>,
    /// Base URL of the external analyzer service.
    pub url: String,
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub cycle_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub stale_after_hours: i64,
    pub fetch_timeout_secs: u64,
    pub fetch_attempts: u32,
    pub dispatch_timeout_secs: u64,
    pub dispatch_attempts: u32,
    pub retry_pause_ms: u64,
    pub status_interval_secs: u64,
    /// UTC hour at which yesterday's report is sent.
    pub daily_report_hour: u32,
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 5,
            reconcile_interval_secs: 30 * 60,
            stale_after_hours: 24,
            fetch_timeout_secs: 15,
            fetch_attempts: 2,
            dispatch_timeout_secs: 10,
            dispatch_attempts: 3,
            retry_pause_ms: 1_000,
            status_interval_secs: 300,
            daily_report_hour: 0,
            channel_capacity: 1_024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fusion: FusionConfig,
    pub scheduler: SchedulerConfig,
    pub analyzers: Vec<AnalyzerConfig>,

    // Tracker storage
    pub data_dir: String,

    // Backend system of record
    pub backend_url: String,
    pub backend_api_key: String,

    // Telegram
    pub telegram_token: String,
    pub telegram_channels: HashMap<String, String>,

    // Webhook / stats server
    pub api_bind: String,
    pub webhook_secret: String,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let symbols = |key: &str, default: &str| -> Vec<String> {
            env(key, default)
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let defaults = FusionConfig::default();
        let fusion = FusionConfig {
            max_signals_per_hour_global: env("MAX_SIGNALS_PER_HOUR", "12")
                .parse()
                .unwrap_or(defaults.max_signals_per_hour_global),
            max_signals_per_hour_per_symbol: env("MAX_SIGNALS_PER_HOUR_PER_SYMBOL", "3")
                .parse()
                .unwrap_or(defaults.max_signals_per_hour_per_symbol),
            cooldown_same_direction_minutes: env("COOLDOWN_SAME_DIRECTION_MINUTES", "15")
                .parse()
                .unwrap_or(defaults.cooldown_same_direction_minutes),
            cooldown_opposite_direction_minutes: env("COOLDOWN_OPPOSITE_DIRECTION_MINUTES", "60")
                .parse()
                .unwrap_or(defaults.cooldown_opposite_direction_minutes),
            very_strong_confidence: env("VERY_STRONG_CONFIDENCE", "90")
                .parse()
                .unwrap_or(defaults.very_strong_confidence),
            reversal_min_confidence: env("REVERSAL_MIN_CONFIDENCE", "85")
                .parse()
                .unwrap_or(defaults.reversal_min_confidence),
            ..defaults
        };

        let sched = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            cycle_interval_secs: env("FUSION_CYCLE_SECS", "5").parse().unwrap_or(sched.cycle_interval_secs),
            reconcile_interval_secs: env("RECONCILE_INTERVAL_SECS", "1800")
                .parse()
                .unwrap_or(sched.reconcile_interval_secs),
            stale_after_hours: env("STALE_SIGNAL_HOURS", "24").parse().unwrap_or(sched.stale_after_hours),
            fetch_timeout_secs: env("FETCH_TIMEOUT_SECS", "15").parse().unwrap_or(sched.fetch_timeout_secs),
            dispatch_timeout_secs: env("DISPATCH_TIMEOUT_SECS", "10")
                .parse()
                .unwrap_or(sched.dispatch_timeout_secs),
            daily_report_hour: env("DAILY_REPORT_HOUR", "0").parse().unwrap_or(sched.daily_report_hour),
            ..sched
        };

        // (source, env prefix, default interval, default watchlist, default min confidence)
        let analyzer_defaults = [
            (BotSource::Scalping, "SCALPING", 15, "BTCUSDT,ETHUSDT", 70.0),
            (BotSource::Trend, "TREND", 300, "BTCUSDT,ETHUSDT,SOLUSDT", 75.0),
            (BotSource::Qfl, "QFL", 20, "BTCUSDT,ETHUSDT,BNBUSDT", 80.0),
            (BotSource::AiMl, "AI_ML", 30, "BTCUSDT,ETHUSDT", 72.0),
        ];
        let analyzers = analyzer_defaults
            .iter()
            .map(|&(source, prefix, interval, watchlist, min_conf)| AnalyzerConfig {
                source,
                enabled: env(&format!("{prefix}_ENABLED"), "true").to_lowercase() == "true",
                interval_secs: env(&format!("{prefix}_INTERVAL_SECS"), &interval.to_string())
                    .parse()
                    .unwrap_or(interval),
                symbols: symbols(&format!("{prefix}_SYMBOLS"), watchlist),
                url: env(
                    &format!("{prefix}_ANALYZER_URL"),
                    &format!("http://127.0.0.1:8060/{}", prefix.to_lowercase()),
                ),
                min_confidence: env(&format!("{prefix}_MIN_CONFIDENCE"), &min_conf.to_string())
                    .parse()
                    .unwrap_or(min_conf),
            })
            .collect();

        let mut telegram_channels = HashMap::new();
        for (channel, key) in [
            ("vip", "TELEGRAM_VIP_GROUP_ID"),
            ("trial", "TELEGRAM_TRIAL_GROUP_ID"),
            ("admin", "TELEGRAM_ADMIN_GROUP_ID"),
        ] {
            let id = env(key, "");
            if !id.is_empty() {
                telegram_channels.insert(channel.to_string(), id);
            }
        }

        Config {
            fusion,
            scheduler,
            analyzers,
            data_dir: env("DATA_DIR", "data"),
            backend_url: env("BACKEND_API_URL", "http://127.0.0.1:8000"),
            backend_api_key: env("BACKEND_API_KEY", ""),
            telegram_token: env("TELEGRAM_BOT_TOKEN", ""),
            telegram_channels,
            api_bind: env("SIGNAL_API_BIND", "0.0.0.0:8050"),
            webhook_secret: env("SIGNAL_ENGINE_WEBHOOK_SECRET", ""),
            log_level: env("LOG_LEVEL", "info"),
        }
    }

    pub fn analyzer(&self, source: BotSource) -> Option<&AnalyzerConfig> {
        self.analyzers.iter().find(|a| a.source == source)
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(self)
    }
}
