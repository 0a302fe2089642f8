//! TLS handshake round trip, used as a reachability and RTT proxy.
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_native_tls::TlsConnector;
use tracing::trace;

use crate::types::ProbeTarget;

/// A connector that completes handshakes with any certificate. The latency
/// stage measures reachability, not trust.
pub fn insecure_connector() -> Result<TlsConnector, native_tls::Error> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(TlsConnector::from(connector))
}

/// Connect to `ip:target.port` and complete a TLS handshake presenting
/// `target.server_name`. Connect and handshake share one deadline, `timeout`
/// after the connect starts.
///
/// Returns the time from connect start to handshake completion, or `None`
/// on any failure. The connection is dropped right after the handshake.
pub async fn probe(
    tls: &TlsConnector,
    ip: IpAddr,
    target: &ProbeTarget,
    timeout: Duration,
) -> Option<Duration> {
    let addr = SocketAddr::new(ip, target.port);
    let start = Instant::now();
    let deadline = start + timeout;

    let stream = match time::timeout_at(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "latency: connect failed");
            return None;
        }
        Err(_) => {
            trace!(%addr, "latency: connect timed out");
            return None;
        }
    };

    match time::timeout_at(deadline, tls.connect(&target.server_name, stream)).await {
        Ok(Ok(_session)) => {
            let rtt = start.elapsed();
            trace!(%addr, rtt_ms = rtt.as_secs_f64() * 1000.0, "latency: handshake done");
            Some(rtt)
        }
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "latency: handshake failed");
            None
        }
        Err(_) => {
            trace!(%addr, "latency: handshake timed out");
            None
        }
    }
}
