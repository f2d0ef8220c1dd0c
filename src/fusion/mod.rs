pub mod engine;
pub mod stats;

pub use engine::{FusionEngine, FusionReport, FusionState};
pub use stats::{FusionStats, FusionSummary, RejectReason, Rejection};
