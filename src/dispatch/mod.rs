pub mod backend;
pub mod format;
pub mod retry;
pub mod telegram;

pub use backend::BackendDispatcher;
pub use retry::{with_retry, RetryPolicy};
pub use telegram::TelegramBroadcaster;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::SignalCandidate;

/// Delivers an approved signal to the system of record. Implementations must
/// tolerate the same signal being sent more than once.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, signal: &SignalCandidate) -> Result<()>;
    fn stats(&self) -> DeliveryStats;
}

/// Fire-and-forget notification fan-out.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, message: &str, channels: &[Channel]) -> Result<()>;
    fn stats(&self) -> DeliveryStats;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Vip,
    Trial,
    Admin,
}

impl Channel {
    /// Where new signals and target updates go.
    pub const SUBSCRIBERS: [Channel; 2] = [Channel::Vip, Channel::Trial];
    pub const ALL: [Channel; 3] = [Channel::Vip, Channel::Trial, Channel::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Vip => "vip",
            Channel::Trial => "trial",
            Channel::Admin => "admin",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub sent: u64,
    pub failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Default)]
pub struct DeliveryCounters {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryCounters {
    pub fn record_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStats {
        let sent = self.sent.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = sent + failed;
        DeliveryStats {
            sent,
            failed,
            success_rate: if total > 0 {
                sent as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
