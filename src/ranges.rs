use anyhow::{Context, Result};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::error::RangeError;

/// Prefix a bare IPv4 address is widened to.
pub const DEFAULT_V4_PREFIX: u8 = 24;
/// Prefix a bare IPv6 address is widened to (256 hosts, like a v4 /24).
pub const DEFAULT_V6_PREFIX: u8 = 120;

/// Parse one range entry: a CIDR (host bits allowed) or a bare address,
/// which is widened to its default network.
pub fn parse_range(s: &str) -> Result<IpNet, String> {
    let s = s.trim();
    if s.contains('/') {
        return s
            .parse::<IpNet>()
            .map(|n| n.trunc())
            .map_err(|e| e.to_string());
    }
    let ip = s.parse::<IpAddr>().map_err(|e| e.to_string())?;
    Ok(default_network(ip))
}

/// Widen an address to the network that gets scanned around it.
///
/// For example `104.16.1.7` becomes `104.16.1.0/24`.
pub fn default_network(ip: IpAddr) -> IpNet {
    match ip {
        IpAddr::V4(v4) => IpNet::V4(
            Ipv4Net::new(v4, DEFAULT_V4_PREFIX)
                .expect("/24 is always valid")
                .trunc(),
        ),
        IpAddr::V6(v6) => IpNet::V6(
            Ipv6Net::new(v6, DEFAULT_V6_PREFIX)
                .expect("/120 is always valid")
                .trunc(),
        ),
    }
}

/// Parse a ranges file content into a list of networks, in file order.
///
/// Supported formats per line:
/// - CIDR: `104.16.0.0/20`
/// - single address, widened to its /24 (v4) or /120 (v6): `172.67.3.9`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_ranges_str(s: &str) -> Result<Vec<IpNet>, RangeError> {
    let mut out = Vec::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        let net = parse_range(line).map_err(|reason| RangeError::Invalid {
            line: idx + 1,
            input: line.to_string(),
            reason,
        })?;
        out.push(net);
    }
    Ok(out)
}

/// Load a ranges file. Errors if the file cannot be read or any line is malformed.
pub fn load_ranges_from_path(path: impl AsRef<Path>) -> Result<Vec<IpNet>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ranges file: {}", path.as_ref().display()))?;
    let nets = parse_ranges_str(&content)
        .with_context(|| format!("in ranges file: {}", path.as_ref().display()))?;
    Ok(nets)
}

/// Expand networks into candidate host addresses.
///
/// IPv4 excludes network and broadcast addresses (except /31 and /32).
/// Addresses covered by more than one network are kept once, at their
/// first position. Fails instead of allocating past `limit` candidates.
pub fn expand_candidates(nets: &[IpNet], limit: usize) -> Result<Vec<IpAddr>, RangeError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for net in nets {
        for ip in net.hosts() {
            if seen.insert(ip) {
                if out.len() == limit {
                    return Err(RangeError::TooManyCandidates { limit });
                }
                out.push(ip);
            }
        }
    }
    Ok(out)
}
