pub mod base;
pub mod http;
pub mod scripted;

pub use base::{stop_price, target_ladder, validate_levels, EmitCooldown, LevelError};
pub use http::HttpAnalyzer;
pub use scripted::ScriptedAnalyzer;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{BotSource, SignalCandidate};

/// A candidate producer. The scheduler owns a collection of these and
/// never looks past this interface.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn source(&self) -> BotSource;
    async fn analyze(&self, symbol: &str) -> Result<Option<SignalCandidate>>;
}
