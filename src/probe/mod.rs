//! The three per-candidate measurements.
//!
//! Every probe swallows its own network faults: latency yields `None`,
//! transfers yield [`Throughput::NoData`]. Nothing here returns an error.
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ScanConfig;
use crate::types::ProbeTarget;

pub mod download;
pub mod latency;
pub mod upload;

/// Shortest elapsed time used in throughput math.
pub const MIN_ELAPSED: Duration = Duration::from_millis(10);

/// Outcome of a download or upload stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Throughput {
    Mbps(f64),
    /// Connection failed, timed out before completing, or moved too little data.
    NoData,
}

impl Throughput {
    /// Value recorded in a measurement; "no data" records as 0.
    pub fn mbps(self) -> f64 {
        match self {
            Throughput::Mbps(v) => v,
            Throughput::NoData => 0.0,
        }
    }
}

/// Megabits per second for `bytes` moved in `elapsed`, with `elapsed`
/// floored at [`MIN_ELAPSED`].
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.max(MIN_ELAPSED).as_secs_f64();
    (bytes as f64 * 8.0) / (secs * 1_000_000.0)
}

/// The stage measurements the pipeline sequences.
#[async_trait::async_trait]
pub trait StageProbes: Send + Sync {
    async fn latency(&self, ip: IpAddr) -> Option<Duration>;
    async fn download(&self, ip: IpAddr) -> Throughput;
    async fn upload(&self, ip: IpAddr) -> Throughput;
}

/// Real probes over TCP and TLS.
#[derive(Clone)]
pub struct NetworkProbes {
    config: Arc<ScanConfig>,
    target: Arc<ProbeTarget>,
    tls: tokio_native_tls::TlsConnector,
}

impl NetworkProbes {
    /// Builds the shared TLS connector once; failure here is a setup error.
    pub fn new(config: Arc<ScanConfig>, target: ProbeTarget) -> Result<Self, native_tls::Error> {
        let tls = latency::insecure_connector()?;
        Ok(Self {
            config,
            target: Arc::new(target),
            tls,
        })
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }
}

#[async_trait::async_trait]
impl StageProbes for NetworkProbes {
    async fn latency(&self, ip: IpAddr) -> Option<Duration> {
        latency::probe(
            &self.tls,
            ip,
            &self.target,
            self.config.ssl_timeout(),
        )
        .await
    }

    async fn download(&self, ip: IpAddr) -> Throughput {
        download::probe(ip, &self.config).await
    }

    async fn upload(&self, ip: IpAddr) -> Throughput {
        upload::probe(ip, &self.config).await
    }
}
