pub mod error;
pub mod signal_tracker;
pub mod stats;
pub mod store;

pub use error::TrackerError;
pub use signal_tracker::SignalTracker;
pub use stats::{DailyStats, TrackerStats};
pub use store::SignalStore;
