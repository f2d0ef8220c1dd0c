use thiserror::Error;

/// Every way a tracker call can fail. Callers branch on these to decide
/// between retrying, alerting, and answering "not found".
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("signal {0} not found")]
    NotFound(String),
    #[error("signal {0} is already closed")]
    AlreadyClosed(String),
    #[error("signal {0} has already hit every target")]
    TargetsComplete(String),
    #[error("signal {id}: target {got} hit out of order (expected {expected})")]
    OutOfOrder {
        id: String,
        expected: usize,
        got: usize,
    },
    #[error("signal {0} has no take-profit targets")]
    EmptyTargets(String),
    #[error("signal {0} is already tracked")]
    Duplicate(String),
    #[error("invalid price {price} for signal {id}")]
    InvalidPrice { id: String, price: f64 },
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    /// True for failures caused by the signal's own state rather than by
    /// storage; retrying them cannot succeed.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, TrackerError::Storage(_) | TrackerError::Serialization(_))
    }
}
