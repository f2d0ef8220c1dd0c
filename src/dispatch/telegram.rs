use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatch::{Broadcaster, Channel, DeliveryCounters, DeliveryStats};

const API_BASE: &str = "https://api.telegram.org";
const ADMIN_PREFIX: &str = "🔔 ADMIN NOTIFICATION\n\n";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API fan-out to the vip/trial/admin groups.
pub struct TelegramBroadcaster {
    client: Client,
    api_base: String,
    token: String,
    chats: HashMap<Channel, String>,
    counters: DeliveryCounters,
}

impl TelegramBroadcaster {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.scheduler.dispatch_timeout_secs))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        let mut chats = HashMap::new();
        for channel in Channel::ALL {
            if let Some(id) = cfg.telegram_channels.get(channel.as_str()) {
                chats.insert(channel, id.clone());
            }
        }

        if cfg.telegram_token.is_empty() {
            warn!("Telegram bot token not set, broadcasts disabled");
        } else {
            info!("Telegram broadcaster initialized ({} channels)", chats.len());
        }

        Ok(Self {
            client,
            api_base: API_BASE.to_string(),
            token: cfg.telegram_token.clone(),
            chats,
            counters: DeliveryCounters::default(),
        })
    }

    /// Points the client at a different Bot API host.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "Markdown",
                disable_web_page_preview: true,
            })
            .send()
            .await
            .context("Failed to reach Telegram")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for TelegramBroadcaster {
    async fn broadcast(&self, message: &str, channels: &[Channel]) -> Result<()> {
        if !self.is_enabled() {
            self.counters.record_failed();
            anyhow::bail!("Telegram broadcaster disabled (no bot token)");
        }

        let mut delivered = 0;
        for channel in channels {
            let Some(chat_id) = self.chats.get(channel) else {
                continue;
            };
            let text = match channel {
                Channel::Admin => format!("{ADMIN_PREFIX}{message}"),
                _ => message.to_string(),
            };
            match self.send(chat_id, &text).await {
                Ok(()) => {
                    delivered += 1;
                    info!("Message sent to {} group", channel);
                }
                Err(e) => error!("Telegram send to {} failed: {:#}", channel, e),
            }
        }

        if delivered == 0 {
            self.counters.record_failed();
            anyhow::bail!("no channel accepted the message");
        }
        self.counters.record_sent(delivered);
        Ok(())
    }

    fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Sent = Arc<Mutex<Vec<(String, String)>>>;

    /// Fake Bot API that rejects chat "bad".
    async fn spawn_bot_api() -> (String, Sent) {
        let sent: Sent = Arc::default();
        let sink = sent.clone();
        let app = Router::new().route(
            "/:bot/sendMessage",
            post(move |Path(_bot): Path<String>, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    let chat = body["chat_id"].as_str().unwrap_or_default().to_string();
                    if chat == "bad" {
                        return StatusCode::BAD_REQUEST;
                    }
                    let text = body["text"].as_str().unwrap_or_default().to_string();
                    sink.lock().push((chat, text));
                    StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{addr}"), sent)
    }

    fn broadcaster(base: &str, token: &str, chats: &[(&str, &str)]) -> TelegramBroadcaster {
        let mut cfg = default_test_config("unused");
        cfg.telegram_token = token.to_string();
        cfg.telegram_channels = chats
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TelegramBroadcaster::new(&cfg).unwrap().with_api_base(base)
    }

    #[tokio::test]
    async fn fans_out_with_admin_prefix() {
        let (base, sent) = spawn_bot_api().await;
        let b = broadcaster(&base, "t0k", &[("vip", "1"), ("trial", "2"), ("admin", "3")]);

        b.broadcast("hello", &[Channel::Vip, Channel::Admin]).await.unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], ("1".to_string(), "hello".to_string()));
        assert_eq!(sent[1].0, "3");
        assert!(sent[1].1.starts_with("🔔 ADMIN NOTIFICATION"));
        assert_eq!(b.stats().sent, 2);
    }

    #[tokio::test]
    async fn one_accepting_channel_is_enough() {
        let (base, _) = spawn_bot_api().await;
        let b = broadcaster(&base, "t0k", &[("vip", "bad"), ("trial", "2")]);
        assert!(b.broadcast("x", &Channel::SUBSCRIBERS).await.is_ok());

        let all_bad = broadcaster(&base, "t0k", &[("vip", "bad")]);
        assert!(all_bad.broadcast("x", &Channel::SUBSCRIBERS).await.is_err());
        assert_eq!(all_bad.stats().failed, 1);
    }

    #[tokio::test]
    async fn disabled_without_token() {
        let b = broadcaster("http://127.0.0.1:1", "", &[("vip", "1")]);
        assert!(!b.is_enabled());
        assert!(b.broadcast("x", &[Channel::Vip]).await.is_err());
    }
}
