use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Where the latency stage connects and which SNI it presents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub port: u16,
    pub server_name: String,
}

impl ProbeTarget {
    pub const DEFAULT_PORT: u16 = 443;
    pub const DEFAULT_SERVER_NAME: &'static str = "google.com";
}

impl Default for ProbeTarget {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            server_name: Self::DEFAULT_SERVER_NAME.to_string(),
        }
    }
}

/// One candidate that survived the latency and download stages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub ip: IpAddr,
    pub latency_ms: f64,
    pub download_mbps: f64,
    /// 0 when the upload stage produced no data.
    pub upload_mbps: f64,
}

/// Progress snapshot emitted once per finished candidate.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanProgress {
    pub processed: u64,
    pub total: u64,
    pub accepted: u64,
}

/// Aggregate results of one run, records in completion order.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanResults {
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub accepted_count: u64,
    pub cancelled: bool,
    pub records: Vec<MeasurementRecord>,
}

/// The two ranked views handed to the exporters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Leaderboards {
    pub top_by_download: Vec<MeasurementRecord>,
    pub top_by_quality: Vec<MeasurementRecord>,
}
