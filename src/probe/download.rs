//! Fixed-size HTTP download against the speed-test endpoint on the candidate.
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use super::{megabits_per_second, Throughput};
use crate::config::ScanConfig;

const READ_CHUNK: usize = 8192;

pub fn request(cfg: &ScanConfig) -> String {
    format!(
        "GET /__down?bytes={} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
        cfg.download_bytes, cfg.speed_test_host, cfg.user_agent
    )
}

/// Throughput for a finished download. Anything under `min_bytes` is
/// treated as a failed transfer, whatever the elapsed time.
pub fn throughput(received: u64, elapsed: Duration, min_bytes: u64) -> Throughput {
    if received < min_bytes {
        return Throughput::NoData;
    }
    Throughput::Mbps(megabits_per_second(received, elapsed))
}

/// Read until EOF or `deadline`, whichever comes first, counting bytes.
/// Hitting the deadline ends the transfer; I/O errors are returned.
pub async fn drain_until<R>(reader: &mut R, deadline: Instant) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut received = 0u64;
    loop {
        match time::timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => received += n as u64,
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }
    Ok(received)
}

/// Download from `ip:cfg.http_port`. The whole stage, connect included,
/// is bounded by the read/write timeout.
pub async fn probe(ip: IpAddr, cfg: &ScanConfig) -> Throughput {
    let addr = SocketAddr::new(ip, cfg.http_port);
    let start = Instant::now();
    let deadline = start + cfg.read_write_timeout();

    let received = match transfer(addr, cfg, deadline).await {
        Ok(n) => n,
        Err(e) => {
            trace!(%addr, error = %e, "download: transfer failed");
            return Throughput::NoData;
        }
    };
    let elapsed = start.elapsed();
    let result = throughput(received, elapsed, cfg.min_download_bytes);
    trace!(%addr, received, ?elapsed, ?result, "download: done");
    result
}

async fn transfer(addr: SocketAddr, cfg: &ScanConfig, deadline: Instant) -> io::Result<u64> {
    let mut stream = time::timeout_at(deadline, TcpStream::connect(addr))
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
    time::timeout_at(deadline, stream.write_all(request(cfg).as_bytes()))
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
    drain_until(&mut stream, deadline).await
}
