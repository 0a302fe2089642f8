//! Library crate for edge-scan: staged latency/download/upload probing of
//! candidate edge IPs, with bounded fan-out and two ranked leaderboards.
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod probe;
pub mod ranges;
pub mod ranking;
pub mod scanner;
pub mod template;
pub mod types;
