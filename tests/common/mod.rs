#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use edge_scan::pipeline::Verdict;
use edge_scan::probe::{StageProbes, Throughput};
use edge_scan::types::MeasurementRecord;

pub fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(104, 16, 0, last))
}

/// The record of a completed candidate, or `None` for a rejection.
pub fn completed(verdict: Verdict) -> Option<MeasurementRecord> {
    match verdict {
        Verdict::Completed(r) => Some(r),
        Verdict::Rejected(_) => None,
    }
}

/// What each stage returns for one address.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub latency: Option<Duration>,
    pub download: Throughput,
    pub upload: Throughput,
}

impl Script {
    pub fn good(latency_ms: u64, download: f64, upload: f64) -> Self {
        Self {
            latency: Some(Duration::from_millis(latency_ms)),
            download: Throughput::Mbps(download),
            upload: Throughput::Mbps(upload),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            latency: None,
            download: Throughput::Mbps(100.0),
            upload: Throughput::Mbps(100.0),
        }
    }
}

/// Probes answering from a table, optionally sleeping in the latency stage,
/// and counting calls and peak concurrency.
#[derive(Default)]
pub struct ScriptedProbes {
    scripts: HashMap<IpAddr, Script>,
    stage_delay: Duration,
    panic_on: Option<IpAddr>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<(IpAddr, &'static str)>>,
}

impl ScriptedProbes {
    pub fn new(scripts: impl IntoIterator<Item = (IpAddr, Script)>) -> Self {
        Self {
            scripts: scripts.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// Panic in the latency stage for `ip`.
    pub fn panicking_on(mut self, ip: IpAddr) -> Self {
        self.panic_on = Some(ip);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, stage: &str) -> Vec<IpAddr> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == stage)
            .map(|(ip, _)| *ip)
            .collect()
    }

    fn script(&self, ip: IpAddr) -> Script {
        self.scripts.get(&ip).copied().unwrap_or_else(Script::unreachable)
    }

    fn record(&self, ip: IpAddr, stage: &'static str) {
        self.calls.lock().unwrap().push((ip, stage));
    }
}

#[async_trait::async_trait]
impl StageProbes for ScriptedProbes {
    async fn latency(&self, ip: IpAddr) -> Option<Duration> {
        self.record(ip, "latency");
        if self.panic_on == Some(ip) {
            panic!("scripted failure for {ip}");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script(ip).latency
    }

    async fn download(&self, ip: IpAddr) -> Throughput {
        self.record(ip, "download");
        self.script(ip).download
    }

    async fn upload(&self, ip: IpAddr) -> Throughput {
        self.record(ip, "upload");
        self.script(ip).upload
    }
}
