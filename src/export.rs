use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use ::time::{format_description, OffsetDateTime};

use crate::error::TemplateError;
use crate::template::ConnectionTemplate;
use crate::types::{Leaderboards, MeasurementRecord};

/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .ok()
        .and_then(|fmt| at.format(&fmt).ok())
        .unwrap_or_else(|| String::from("1970-01-01 00:00:00"))
}

pub fn now_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

/// One dated block for the results log: both leaderboards, one line per record.
pub fn format_log_entry(
    timestamp: &str,
    source: &str,
    candidate_count: usize,
    boards: &Leaderboards,
) -> String {
    let mut out = String::new();
    let _ = write!(out, "\n\n=== SCAN DATE: {timestamp} ===\n");
    let _ = writeln!(out, "Source: {source} | Count: {candidate_count}");
    out.push_str("--- High Download ---\n");
    for r in &boards.top_by_download {
        let _ = writeln!(
            out,
            "{} | DL:{:.2} | UL:{:.2} | P:{:.0}",
            r.ip, r.download_mbps, r.upload_mbps, r.latency_ms
        );
    }
    out.push_str("--- High Quality (Balanced) ---\n");
    for r in &boards.top_by_quality {
        let _ = writeln!(
            out,
            "{} | P:{:.0} | UL:{:.2} | DL:{:.2}",
            r.ip, r.latency_ms, r.upload_mbps, r.download_mbps
        );
    }
    out
}

pub fn download_tag(rank: usize, r: &MeasurementRecord, timestamp: &str) -> String {
    // Minutes and seconds of the run, so repeated scans yield distinct names.
    let clock = timestamp.get(timestamp.len().saturating_sub(5)..).unwrap_or("");
    format!("DL_{rank}_{:.1}M_{clock}", r.download_mbps)
}

pub fn quality_tag(rank: usize, r: &MeasurementRecord) -> String {
    format!("Qual_{rank}_P{:.0}_U{:.1}M", r.latency_ms, r.upload_mbps)
}

/// Client configs for every leaderboard entry, download board first, ranks
/// starting at 1.
pub fn render_configs(
    template: &ConnectionTemplate,
    timestamp: &str,
    boards: &Leaderboards,
) -> Result<String, TemplateError> {
    let mut out = format!("\n// === Generated: {timestamp} ===\n");
    for (idx, r) in boards.top_by_download.iter().enumerate() {
        out.push_str(&template.render(r.ip, &download_tag(idx + 1, r, timestamp))?);
        out.push('\n');
    }
    for (idx, r) in boards.top_by_quality.iter().enumerate() {
        out.push_str(&template.render(r.ip, &quality_tag(idx + 1, r))?);
        out.push('\n');
    }
    Ok(out)
}

/// Append `text` to `path`, creating the file if needed.
pub fn append_to_path(path: impl AsRef<Path>, text: &str) -> Result<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn rec(last: u8, latency_ms: f64, download_mbps: f64, upload_mbps: f64) -> MeasurementRecord {
        MeasurementRecord {
            ip: IpAddr::V4(Ipv4Addr::new(172, 67, 0, last)),
            latency_ms,
            download_mbps,
            upload_mbps,
        }
    }

    fn boards() -> Leaderboards {
        Leaderboards {
            top_by_download: vec![rec(1, 120.4, 42.456, 3.21)],
            top_by_quality: vec![rec(2, 38.6, 11.0, 7.04)],
        }
    }

    #[test]
    fn timestamp_format() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(format_timestamp(at), "2023-11-14 22:13:20");
    }

    #[test]
    fn log_entry_lists_both_boards() {
        let text = format_log_entry("2023-11-14 22:13:20", "ranges.txt", 254, &boards());
        let expected = "\n\n=== SCAN DATE: 2023-11-14 22:13:20 ===\n\
            Source: ranges.txt | Count: 254\n\
            --- High Download ---\n\
            172.67.0.1 | DL:42.46 | UL:3.21 | P:120\n\
            --- High Quality (Balanced) ---\n\
            172.67.0.2 | P:39 | UL:7.04 | DL:11.00\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn tags_carry_rank_and_metrics() {
        let r = rec(1, 38.6, 42.456, 7.04);
        assert_eq!(download_tag(1, &r, "2023-11-14 22:13:20"), "DL_1_42.5M_13:20");
        assert_eq!(quality_tag(2, &r), "Qual_2_P39_U7.0M");
    }

    #[test]
    fn configs_rendered_per_entry() {
        let t = ConnectionTemplate::parse("vless://id@edge.example.com:443?sni=a.example.com#x")
            .unwrap();
        let text = render_configs(&t, "2023-11-14 22:13:20", &boards()).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines[0], "// === Generated: 2023-11-14 22:13:20 ===");
        assert_eq!(
            lines[1],
            "vless://id@172.67.0.1:443?sni=a.example.com#DL_1_42.5M_13:20"
        );
        assert_eq!(lines[2], "vless://id@172.67.0.2:443?sni=a.example.com#Qual_1_P39_U7.0M");
    }

    #[test]
    fn append_creates_then_extends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top_ips.txt");
        append_to_path(&path, "one\n").unwrap();
        append_to_path(&path, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
