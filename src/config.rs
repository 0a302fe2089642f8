use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Run-wide knobs, built once at startup and handed to the probes and the
/// orchestrator. Keys use the camelCase names of the JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanConfig {
    /// Bound on the TCP connect and on the TLS handshake of the latency stage.
    pub ssl_timeout_seconds: f64,
    /// Bound on the download and upload stages.
    pub read_write_timeout_seconds: f64,
    pub max_concurrency: usize,
    #[serde(rename = "uploadPayloadKB")]
    pub upload_payload_kb: usize,
    pub download_bytes: u64,
    /// Transfers below this many bytes count as "no data".
    pub min_download_bytes: u64,
    pub http_port: u16,
    pub speed_test_host: String,
    pub user_agent: String,
    pub download_survival_mbps: f64,
    pub upload_quality_mbps: f64,
    pub top_n: usize,
    /// Upper bound on expanded candidates; sized to hold the full published
    /// Cloudflare IPv4 list (about 1.5M hosts).
    pub max_candidates: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ssl_timeout_seconds: 2.0,
            read_write_timeout_seconds: 5.0,
            max_concurrency: 50,
            upload_payload_kb: 300,
            download_bytes: 1_000_000,
            min_download_bytes: 5_000,
            http_port: 80,
            speed_test_host: "speed.cloudflare.com".to_string(),
            user_agent: concat!("edge-scan/", env!("CARGO_PKG_VERSION")).to_string(),
            download_survival_mbps: 0.1,
            upload_quality_mbps: 0.5,
            top_n: 3,
            max_candidates: 1 << 21,
        }
    }
}

impl ScanConfig {
    pub fn ssl_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ssl_timeout_seconds)
    }

    pub fn read_write_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_write_timeout_seconds)
    }

    pub fn upload_payload_bytes(&self) -> usize {
        self.upload_payload_kb * 1024
    }

    /// Reject values that would make a stage unbounded or a formula meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("sslTimeoutSeconds", self.ssl_timeout_seconds)?;
        positive("readWriteTimeoutSeconds", self.read_write_timeout_seconds)?;
        non_negative("downloadSurvivalMbps", self.download_survival_mbps)?;
        non_negative("uploadQualityMbps", self.upload_quality_mbps)?;
        if self.max_concurrency == 0 {
            return Err(ConfigError::Zero { field: "maxConcurrency" });
        }
        if self.upload_payload_kb == 0 {
            return Err(ConfigError::Zero { field: "uploadPayloadKB" });
        }
        if self.top_n == 0 {
            return Err(ConfigError::Zero { field: "topN" });
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::Zero { field: "maxCandidates" });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    // Also rejects NaN.
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

/// Parse a JSON config document. Missing keys keep their defaults.
pub fn parse_config_str(s: &str) -> Result<ScanConfig> {
    let cfg: ScanConfig = serde_json::from_str(s).context("invalid config JSON")?;
    Ok(cfg)
}

/// Load a config file. Errors if the file cannot be read or parsed.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<ScanConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;
    parse_config_str(&content)
        .with_context(|| format!("in config file: {}", path.as_ref().display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ScanConfig::default();
        assert_eq!(c.ssl_timeout(), Duration::from_secs(2));
        assert_eq!(c.read_write_timeout(), Duration::from_secs(5));
        assert_eq!(c.max_concurrency, 50);
        assert_eq!(c.upload_payload_bytes(), 300 * 1024);
        assert_eq!(c.http_port, 80);
        assert_eq!(c.top_n, 3);
        assert_eq!(c.max_candidates, 2_097_152);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = parse_config_str(r#"{ "maxConcurrency": 8, "uploadPayloadKB": 64 }"#).unwrap();
        assert_eq!(c.max_concurrency, 8);
        assert_eq!(c.upload_payload_kb, 64);
        assert_eq!(c.ssl_timeout_seconds, 2.0);
        assert_eq!(c.speed_test_host, "speed.cloudflare.com");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_config_str("not json").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = ScanConfig::default();
        c.ssl_timeout_seconds = 0.0;
        assert_eq!(
            c.validate(),
            Err(ConfigError::NonPositive { field: "sslTimeoutSeconds", value: 0.0 })
        );

        let mut c = ScanConfig::default();
        c.read_write_timeout_seconds = f64::INFINITY;
        assert!(c.validate().is_err());

        let mut c = ScanConfig::default();
        c.max_concurrency = 0;
        assert_eq!(c.validate(), Err(ConfigError::Zero { field: "maxConcurrency" }));

        let mut c = ScanConfig::default();
        c.upload_quality_mbps = -1.0;
        assert!(c.validate().is_err());
    }
}
