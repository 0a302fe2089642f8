//! Random-payload HTTP upload to the speed-test endpoint on the candidate.
use rand::RngCore;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use super::{megabits_per_second, Throughput};
use crate::config::ScanConfig;

/// Only the first chunk of the reply is read, as proof the far end started
/// processing the body.
const ACK_CHUNK: usize = 1024;

pub fn request_head(cfg: &ScanConfig, content_length: usize) -> String {
    format!(
        "POST /__up HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        cfg.speed_test_host, cfg.user_agent, content_length
    )
}

pub fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

/// Upload to `ip:cfg.http_port`. The whole stage, from connect to the
/// acknowledgment, is bounded by the read/write timeout.
pub async fn probe(ip: IpAddr, cfg: &ScanConfig) -> Throughput {
    let addr = SocketAddr::new(ip, cfg.http_port);
    let payload = random_payload(cfg.upload_payload_bytes());
    let start = Instant::now();
    let deadline = start + cfg.read_write_timeout();

    match transfer(addr, cfg, &payload, deadline).await {
        Ok(()) => {
            let elapsed = start.elapsed();
            let mbps = megabits_per_second(payload.len() as u64, elapsed);
            trace!(%addr, ?elapsed, mbps, "upload: done");
            Throughput::Mbps(mbps)
        }
        Err(e) => {
            trace!(%addr, error = %e, "upload: transfer failed");
            Throughput::NoData
        }
    }
}

async fn transfer(
    addr: SocketAddr,
    cfg: &ScanConfig,
    payload: &[u8],
    deadline: Instant,
) -> io::Result<()> {
    let mut stream = bounded(deadline, TcpStream::connect(addr)).await?;
    let head = request_head(cfg, payload.len());
    bounded(deadline, stream.write_all(head.as_bytes())).await?;
    bounded(deadline, stream.write_all(payload)).await?;

    let mut ack = [0u8; ACK_CHUNK];
    bounded(deadline, stream.read(&mut ack)).await?;
    Ok(())
}

async fn bounded<T, F>(deadline: Instant, fut: F) -> io::Result<T>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    time::timeout_at(deadline, fut)
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_has_requested_size_and_is_not_constant() {
        let p = random_payload(300 * 1024);
        assert_eq!(p.len(), 300 * 1024);
        assert!(p.iter().any(|&b| b != p[0]));
    }

    #[test]
    fn head_announces_content_length() {
        let cfg = ScanConfig::default();
        let head = request_head(&cfg, 307_200);
        assert!(head.starts_with("POST /__up HTTP/1.1\r\n"));
        assert!(head.contains("Content-Length: 307200\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }
}
