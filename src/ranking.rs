//! Leaderboards over the accepted records. Pure; no I/O.
use crate::types::{Leaderboards, MeasurementRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingPolicy {
    pub top_n: usize,
    /// Upload rate a record must exceed to be a quality candidate.
    pub quality_upload_mbps: f64,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            top_n: 3,
            quality_upload_mbps: 0.5,
        }
    }
}

impl From<&crate::config::ScanConfig> for RankingPolicy {
    fn from(cfg: &crate::config::ScanConfig) -> Self {
        Self {
            top_n: cfg.top_n,
            quality_upload_mbps: cfg.upload_quality_mbps,
        }
    }
}

/// Highest download first. Equal values keep collection order.
pub fn top_by_download(records: &[MeasurementRecord], n: usize) -> Vec<MeasurementRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.download_mbps.total_cmp(&a.download_mbps));
    sorted.truncate(n);
    sorted
}

/// Lowest latency first among records whose upload beats the quality floor,
/// or among all records when none does. Equal values keep collection order.
pub fn top_by_quality(
    records: &[MeasurementRecord],
    n: usize,
    quality_upload_mbps: f64,
) -> Vec<MeasurementRecord> {
    let mut pool: Vec<MeasurementRecord> = records
        .iter()
        .filter(|r| r.upload_mbps > quality_upload_mbps)
        .cloned()
        .collect();
    if pool.is_empty() {
        pool = records.to_vec();
    }
    pool.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));
    pool.truncate(n);
    pool
}

pub fn rank(records: &[MeasurementRecord], policy: RankingPolicy) -> Leaderboards {
    Leaderboards {
        top_by_download: top_by_download(records, policy.top_n),
        top_by_quality: top_by_quality(records, policy.top_n, policy.quality_upload_mbps),
    }
}

/// End state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// No candidate survived; nothing to rank or export.
    NoSurvivors,
    Ranked(Leaderboards),
}

pub fn outcome(records: &[MeasurementRecord], policy: RankingPolicy) -> ScanOutcome {
    if records.is_empty() {
        ScanOutcome::NoSurvivors
    } else {
        ScanOutcome::Ranked(rank(records, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn rec(last: u8, latency_ms: f64, download_mbps: f64, upload_mbps: f64) -> MeasurementRecord {
        MeasurementRecord {
            ip: IpAddr::V4(Ipv4Addr::new(104, 16, 0, last)),
            latency_ms,
            download_mbps,
            upload_mbps,
        }
    }

    fn last_octets(list: &[MeasurementRecord]) -> Vec<u8> {
        list.iter()
            .map(|r| match r.ip {
                IpAddr::V4(v4) => v4.octets()[3],
                IpAddr::V6(_) => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn download_board_is_descending_and_bounded() {
        let records = vec![
            rec(1, 50.0, 3.0, 1.0),
            rec(2, 40.0, 9.0, 1.0),
            rec(3, 30.0, 1.0, 1.0),
            rec(4, 20.0, 7.0, 1.0),
        ];
        let top = top_by_download(&records, 3);
        assert_eq!(last_octets(&top), vec![2, 4, 1]);
    }

    #[test]
    fn download_ties_keep_collection_order() {
        let records = vec![rec(1, 1.0, 5.0, 0.0), rec(2, 1.0, 5.0, 0.0), rec(3, 1.0, 6.0, 0.0)];
        assert_eq!(last_octets(&top_by_download(&records, 3)), vec![3, 1, 2]);
    }

    #[test]
    fn quality_board_filters_on_upload() {
        let records = vec![
            rec(1, 10.0, 5.0, 0.2),
            rec(2, 80.0, 5.0, 2.0),
            rec(3, 60.0, 5.0, 0.5),
            rec(4, 70.0, 5.0, 0.9),
        ];
        // .1 is fastest but uploads too little; .3 sits exactly on the floor.
        let top = top_by_quality(&records, 3, 0.5);
        assert_eq!(last_octets(&top), vec![4, 2]);
    }

    #[test]
    fn quality_board_falls_back_to_everything() {
        let records = vec![rec(1, 30.0, 5.0, 0.0), rec(2, 10.0, 5.0, 0.1), rec(3, 20.0, 5.0, 0.0)];
        let top = top_by_quality(&records, 2, 0.5);
        assert_eq!(last_octets(&top), vec![2, 3]);
    }

    #[test]
    fn empty_input_gives_empty_boards() {
        let boards = rank(&[], RankingPolicy::default());
        assert!(boards.top_by_download.is_empty());
        assert!(boards.top_by_quality.is_empty());
        assert_eq!(outcome(&[], RankingPolicy::default()), ScanOutcome::NoSurvivors);
    }

    #[test]
    fn ranking_is_idempotent() {
        let records = vec![
            rec(1, 12.0, 3.0, 0.7),
            rec(2, 9.0, 3.0, 0.7),
            rec(3, 15.0, 8.0, 0.1),
            rec(4, 9.0, 1.0, 4.0),
        ];
        let a = rank(&records, RankingPolicy::default());
        let b = rank(&records, RankingPolicy::default());
        assert_eq!(a, b);
        assert_eq!(last_octets(&a.top_by_quality), vec![2, 4, 1]);
    }
}
