pub mod api;
pub mod config;
pub mod dispatch;
pub mod fusion;
pub mod models;
pub mod reporting;
pub mod scheduler;
pub mod strategies;
#[cfg(test)]
pub mod test_helpers;
pub mod tracker;
