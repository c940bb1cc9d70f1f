pub mod api;
pub mod config;
pub mod live_scores;
