use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::models::{BotSource, SignalCandidate};
use crate::strategies::Analyzer;

enum Step {
    Emit(SignalCandidate),
    Fail(String),
}

/// Replays queued candidates, one per `analyze` call and symbol. Used for
/// replaying recorded sessions and for driving the scheduler in tests.
pub struct ScriptedAnalyzer {
    source: BotSource,
    queue: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<usize>,
}

impl ScriptedAnalyzer {
    pub fn new(source: BotSource) -> Self {
        Self {
            source,
            queue: Mutex::new(HashMap::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn push(&self, candidate: SignalCandidate) {
        self.queue
            .lock()
            .entry(candidate.symbol.clone())
            .or_default()
            .push_back(Step::Emit(candidate));
    }

    /// Queues a failure for `symbol`; the next call for it returns an error.
    pub fn push_error(&self, symbol: &str, message: &str) {
        self.queue
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .push_back(Step::Fail(message.to_string()));
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().values().map(|q| q.len()).sum()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn source(&self) -> BotSource {
        self.source
    }

    async fn analyze(&self, symbol: &str) -> Result<Option<SignalCandidate>> {
        *self.calls.lock() += 1;
        let step = self.queue.lock().get_mut(symbol).and_then(|q| q.pop_front());
        match step {
            Some(Step::Emit(c)) => Ok(Some(c)),
            Some(Step::Fail(msg)) => anyhow::bail!("{} analyzer failed: {}", self.source, msg),
            None => Ok(None),
        }
    }
}
