use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::dispatch::{DeliveryCounters, DeliveryStats, Dispatcher};
use crate::models::SignalCandidate;

pub const PAYLOAD_SOURCE: &str = "signal-engine";

/// Posts approved signals to `{backend_url}/api/signals`.
pub struct BackendDispatcher {
    client: Client,
    base_url: String,
    api_key: String,
    counters: DeliveryCounters,
}

impl BackendDispatcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.scheduler.dispatch_timeout_secs))
            .build()
            .context("Failed to build backend HTTP client")?;
        Ok(Self {
            client,
            base_url: cfg.backend_url.trim_end_matches('/').to_string(),
            api_key: cfg.backend_api_key.clone(),
            counters: DeliveryCounters::default(),
        })
    }

    fn payload(signal: &SignalCandidate) -> serde_json::Value {
        let mut payload = signal.to_payload();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("source".into(), PAYLOAD_SOURCE.into());
            obj.insert(
                "dispatcher_timestamp".into(),
                Utc::now().to_rfc3339().into(),
            );
        }
        payload
    }

    async fn post(&self, signal: &SignalCandidate) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/api/signals", self.base_url))
            .header("X-API-Key", &self.api_key)
            .header("Idempotency-Key", &signal.signal_id)
            .json(&Self::payload(signal))
            .send()
            .await
            .context("Failed to reach backend")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Backend API error {}: {}", status, body);
        }
        debug!(signal_id = %signal.signal_id, status = %status, "Backend accepted signal");
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for BackendDispatcher {
    async fn dispatch(&self, signal: &SignalCandidate) -> Result<()> {
        match self.post(signal).await {
            Ok(()) => {
                self.counters.record_sent(1);
                info!(
                    "Signal dispatched: {} {} [{}]",
                    signal.symbol,
                    signal.side,
                    signal.short_id()
                );
                Ok(())
            }
            Err(e) => {
                self.counters.record_failed();
                Err(e)
            }
        }
    }

    fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}
