use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::{Config, FusionConfig, SchedulerConfig};
use crate::dispatch::{Broadcaster, Channel, DeliveryCounters, DeliveryStats, Dispatcher};
use crate::models::{generate_signal_id, BotSource, Side, SignalCandidate};

/// Fixed reference instant for deterministic time arithmetic.
pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A candidate with a 1%-spaced five-level target ladder around entry 100.
pub fn make_candidate(symbol: &str, side: Side, confidence: f64, source: BotSource) -> SignalCandidate {
    let entry = 100.0;
    let (stop, step) = match side {
        Side::Long => (97.0, 1.0),
        Side::Short => (103.0, -1.0),
    };
    let targets = (1..=5).map(|i| entry + step * i as f64).collect();
    SignalCandidate::new(
        generate_signal_id(),
        symbol,
        side,
        entry,
        stop,
        targets,
        "15m",
        confidence,
        source,
    )
    .unwrap()
}

pub fn make_priced_candidate(
    id: &str,
    symbol: &str,
    side: Side,
    entry: f64,
    targets: Vec<f64>,
) -> SignalCandidate {
    let stop = match side {
        Side::Long => entry * 0.98,
        Side::Short => entry * 1.02,
    };
    SignalCandidate::new(
        id.to_string(),
        symbol,
        side,
        entry,
        stop,
        targets,
        "1h",
        80.0,
        BotSource::Trend,
    )
    .unwrap()
}

/// A Config suitable for testing: no remote services, short intervals.
pub fn default_test_config(data_dir: &str) -> Config {
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
        backend_api_key: String::new(),
        telegram_token: String::new(),
        telegram_channels: Default::default(),
        api_bind: "127.0.0.1:0".to_string(),
        webhook_secret: "test-secret".to_string(),
        log_level: "ERROR".to_string(),
    }
}

/// Dispatcher that fails its first `failures` attempts, then succeeds.
pub struct MockDispatcher {
    failures: AtomicU32,
    attempts: AtomicU32,
    sent: Mutex<Vec<String>>,
    counters: DeliveryCounters,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::flaky(0)
    }

    pub fn flaky(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
            counters: DeliveryCounters::default(),
        }
    }

    pub fn failing() -> Self {
        Self::flaky(u32::MAX)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn dispatch(&self, signal: &SignalCandidate) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            if left != u32::MAX {
                self.failures.fetch_sub(1, Ordering::SeqCst);
            }
            self.counters.record_failed();
            anyhow::bail!("backend unavailable");
        }
        self.sent.lock().push(signal.signal_id.clone());
        self.counters.record_sent(1);
        Ok(())
    }

    fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}

pub struct MockBroadcaster {
    fail: bool,
    delay: Duration,
    messages: Mutex<Vec<(String, Vec<Channel>)>>,
    counters: DeliveryCounters,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
            messages: Mutex::new(Vec::new()),
            counters: DeliveryCounters::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Records the message, then takes `delay` to finish the fan-out.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn messages(&self) -> Vec<(String, Vec<Channel>)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn broadcast(&self, message: &str, channels: &[Channel]) -> Result<()> {
        if self.fail {
            self.counters.record_failed();
            anyhow::bail!("telegram unavailable");
        }
        self.messages
            .lock()
            .push((message.to_string(), channels.to_vec()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.counters.record_sent(channels.len() as u64);
        Ok(())
    }

    fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}
