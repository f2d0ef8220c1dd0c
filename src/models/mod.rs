pub mod candidate;
pub mod direction;
pub mod signal;

pub use candidate::{generate_signal_id, CandidateError, RawCandidate, SignalCandidate};
pub use direction::*;
pub use signal::{Signal, SignalDuration, SignalOutcome};
