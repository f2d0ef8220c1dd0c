use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::SchedulerConfig;

/// Bounded retry: a fixed number of attempts, each under its own timeout,
/// with a fixed pause in between. There is no backoff growth.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn dispatch(cfg: &SchedulerConfig) -> Self {
        Self {
            attempts: cfg.dispatch_attempts.max(1),
            timeout: Duration::from_secs(cfg.dispatch_timeout_secs),
            pause: Duration::from_millis(cfg.retry_pause_ms),
        }
    }

    /// A broadcast sends to each of `fan_out` channels in turn, each send
    /// bounded by the client timeout. The attempt timeout covers the whole
    /// fan-out so a slow but progressing attempt is never cut off and re-sent.
    pub fn broadcast(cfg: &SchedulerConfig, fan_out: usize) -> Self {
        let per_send = Duration::from_secs(cfg.dispatch_timeout_secs);
        Self {
            attempts: cfg.dispatch_attempts.max(1),
            timeout: per_send * fan_out.max(1) as u32 + Duration::from_secs(1),
            pause: Duration::from_millis(cfg.retry_pause_ms),
        }
    }

    pub fn fetch(cfg: &SchedulerConfig) -> Self {
        Self {
            attempts: cfg.fetch_attempts.max(1),
            timeout: Duration::from_secs(cfg.fetch_timeout_secs),
            pause: Duration::from_millis(cfg.retry_pause_ms),
        }
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = anyhow!("{what}: no attempts made");

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!("{} failed (attempt {}/{}): {:#}", what, attempt, attempts, e);
                last_err = e;
            }
            Err(_) => {
                warn!(
                    "{} timed out after {:?} (attempt {}/{})",
                    what, policy.timeout, attempt, attempts
                );
                last_err = anyhow!("{what} timed out after {:?}", policy.timeout);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(policy.pause).await;
        }
    }

    Err(last_err.context(format!("{what} failed after {attempts} attempts")))
}
