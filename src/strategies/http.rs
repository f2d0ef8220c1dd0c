use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::config::AnalyzerConfig;
use crate::models::{BotSource, RawCandidate, SignalCandidate};
use crate::strategies::{validate_levels, Analyzer, EmitCooldown};

const DEFAULT_EMIT_SPACING_MINUTES: i64 = 15;
const DEFAULT_MIN_REWARD_RISK: f64 = 1.0;

/// Client for an external analyzer service exposing
/// `GET {url}/analyze?symbol=S`. A `204` or a `null` body means the service
/// has nothing for that symbol right now.
pub struct HttpAnalyzer {
    client: Client,
    source: BotSource,
    base_url: String,
    min_confidence: f64,
    min_reward_risk: f64,
    cooldown: EmitCooldown,
}

impl HttpAnalyzer {
    pub fn new(cfg: &AnalyzerConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build analyzer HTTP client")?;
        Ok(Self {
            client,
            source: cfg.source,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            min_confidence: cfg.min_confidence,
            min_reward_risk: DEFAULT_MIN_REWARD_RISK,
            cooldown: EmitCooldown::new(ChronoDuration::minutes(DEFAULT_EMIT_SPACING_MINUTES)),
        })
    }

    pub fn with_emit_spacing(mut self, spacing: ChronoDuration) -> Self {
        self.cooldown = EmitCooldown::new(spacing);
        self
    }

    pub fn with_min_reward_risk(mut self, min_rr: f64) -> Self {
        self.min_reward_risk = min_rr;
        self
    }

    /// Validates a service response body and applies this analyzer's own
    /// filters. `Ok(None)` means the body was well-formed but filtered out.
    fn accept(&self, symbol: &str, body: &str, now: DateTime<Utc>) -> Result<Option<SignalCandidate>> {
        let raw: Option<RawCandidate> =
            serde_json::from_str(body).context("Failed to parse analyzer response")?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let candidate = SignalCandidate::try_from(raw)
            .with_context(|| format!("{} returned an invalid candidate", self.source))?;
        if candidate.bot_source != self.source {
            anyhow::bail!(
                "{} analyzer returned a candidate tagged {}",
                self.source,
                candidate.bot_source
            );
        }
        if candidate.symbol != symbol {
            anyhow::bail!("asked for {} but got {}", symbol, candidate.symbol);
        }

        if candidate.confidence < self.min_confidence {
            debug!(
                source = %self.source,
                symbol = %symbol,
                confidence = candidate.confidence,
                "Below analyzer minimum confidence"
            );
            return Ok(None);
        }
        if let Err(e) = validate_levels(&candidate, self.min_reward_risk) {
            debug!(source = %self.source, symbol = %symbol, error = %e, "Levels rejected");
            return Ok(None);
        }
        if !self.cooldown.ready(symbol, now) {
            debug!(source = %self.source, symbol = %symbol, "Emit cooldown active");
            return Ok(None);
        }

        self.cooldown.record(symbol, now);
        Ok(Some(candidate))
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    fn source(&self) -> BotSource {
        self.source
    }

    async fn analyze(&self, symbol: &str) -> Result<Option<SignalCandidate>> {
        let resp = self
            .client
            .get(format!("{}/analyze", self.base_url))
            .query(&[("symbol", symbol)])
            .send()
            .await
            .with_context(|| format!("Failed to reach {} analyzer", self.source))?;

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} analyzer error {}: {}", self.source, status, body);
        }

        let body = resp.text().await.context("Failed to read analyzer response")?;
        self.accept(symbol, &body, Utc::now())
    }
}
