//! Per-candidate stage sequencing: latency, then download, then upload,
//! with each stage reserved for survivors of the previous one.
use std::net::IpAddr;
use tracing::debug;

use crate::probe::{StageProbes, Throughput};
use crate::types::MeasurementRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Connect or handshake failed or timed out.
    Unreachable,
    /// Download produced no data or fell under the survival floor.
    WeakDownload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Completed(MeasurementRecord),
    Rejected(Rejection),
}

/// Run the stages for one candidate. `survival_mbps` is the download floor
/// a candidate must reach before its upload is measured.
pub async fn run_candidate<P>(probes: &P, ip: IpAddr, survival_mbps: f64) -> Verdict
where
    P: StageProbes + ?Sized,
{
    let Some(rtt) = probes.latency(ip).await else {
        return Verdict::Rejected(Rejection::Unreachable);
    };
    let latency_ms = rtt.as_secs_f64() * 1000.0;

    let download_mbps = match probes.download(ip).await {
        Throughput::Mbps(v) if v >= survival_mbps => v,
        other => {
            debug!(%ip, latency_ms, download = other.mbps(), "rejected: weak download");
            return Verdict::Rejected(Rejection::WeakDownload);
        }
    };

    // A failed upload is recorded as 0, not rejected.
    let upload_mbps = probes.upload(ip).await.mbps();

    debug!(%ip, latency_ms, download_mbps, upload_mbps, "candidate completed");
    Verdict::Completed(MeasurementRecord {
        ip,
        latency_ms,
        download_mbps,
        upload_mbps,
    })
}
