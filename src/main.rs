use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use edge_scan::config::{self, ScanConfig};
use edge_scan::probe::NetworkProbes;
use edge_scan::ranking::{self, RankingPolicy, ScanOutcome};
use edge_scan::template::{self, ConnectionTemplate};
use edge_scan::types::{Leaderboards, MeasurementRecord, ScanProgress, ScanResults};
use edge_scan::{export, ranges, scanner};

/// edge-scan — probe candidate edge IPs for TLS latency, download and upload
/// throughput, and keep the best few.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "edge-scan",
    version,
    about = "Measure candidate edge IPs for TLS latency, download and upload throughput, and rank the best.",
    long_about = None
)]
struct Cli {
    /// File with CIDRs or single IPs (one per line, `#` comments). Repeatable.
    #[arg(long, conflicts_with = "ip")]
    ranges: Vec<PathBuf>,

    /// Scan around a single address (its /24) or an explicit CIDR.
    #[arg(long)]
    ip: Option<String>,

    /// Connection template URL (e.g. vless://...); supplies port and SNI.
    #[arg(long, conflicts_with = "template_file")]
    template: Option<String>,

    /// Read the connection template from this file.
    #[arg(long = "template-file")]
    template_file: Option<PathBuf>,

    /// JSON config file (camelCase keys, e.g. {"maxConcurrency": 100}).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Max candidates scanned at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Deadline in seconds for connect plus TLS handshake.
    #[arg(long = "ssl-timeout")]
    ssl_timeout: Option<f64>,

    /// Deadline in seconds for each whole download or upload.
    #[arg(long = "rw-timeout")]
    rw_timeout: Option<f64>,

    /// Upload payload size in KB.
    #[arg(long = "upload-kb")]
    upload_kb: Option<usize>,

    /// Leaderboard size.
    #[arg(long)]
    top: Option<usize>,

    /// Refuse to scan when the ranges expand to more addresses than this.
    #[arg(long = "max-candidates")]
    max_candidates: Option<usize>,

    /// Results log that leaderboards are appended to.
    #[arg(long = "log-file", default_value = "top_ips.txt")]
    log_file: PathBuf,

    /// File that generated client configs are appended to.
    #[arg(long = "configs-file", default_value = "ready_configs.txt")]
    configs_file: PathBuf,

    /// Write all records and both leaderboards as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip appending to the log and configs files.
    #[arg(long = "no-export", default_value_t = false)]
    no_export: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Everything that can be wrong with the operator's input fails here,
    // before the first probe goes out.
    let cfg = Arc::new(build_config(&cli)?);
    let conn_template = load_template(&cli)?;
    let target = template::probe_target(conn_template.as_ref());
    let (source, nets) = load_networks(&cli)?;
    let candidates = ranges::expand_candidates(&nets, cfg.max_candidates)?;
    let probes = Arc::new(NetworkProbes::new(cfg.clone(), target)?);

    println!("edge-scan configuration:");
    println!("  source       : {source}");
    println!("  candidates   : {}", candidates.len());
    println!("  target       : port {} / sni {}", probes.target().port, probes.target().server_name);
    println!("  concurrency  : {}", cfg.max_concurrency);
    println!("  ssl_timeout  : {}s", cfg.ssl_timeout_seconds);
    println!("  rw_timeout   : {}s", cfg.read_write_timeout_seconds);
    println!("  upload       : {} KB", cfg.upload_payload_kb);
    println!(
        "  template     : {}",
        if conn_template.is_some() { "yes" } else { "<none, default SNI>" }
    );

    if candidates.is_empty() {
        println!("\nNo candidates to scan.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let display = tokio::spawn(show_progress(progress_rx));

    println!("\nProbing {} candidates (latency + download + upload)...", candidates.len());
    let results = scanner::scan_candidates_with_progress(
        probes,
        &candidates,
        &cfg,
        progress_tx,
        cancel,
    )
    .await;
    let _ = display.await;
    eprintln!();

    if results.cancelled {
        println!(
            "Scan interrupted after {}/{} candidates; ranking partial results.",
            results.scanned_done, results.scanned_total
        );
    }

    let boards = match ranking::outcome(&results.records, RankingPolicy::from(&*cfg)) {
        ScanOutcome::NoSurvivors => {
            println!("No working candidates found.");
            return Ok(());
        }
        ScanOutcome::Ranked(boards) => boards,
    };

    print_leaderboards(&boards, cfg.top_n);

    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_results_json(path, &results, &boards) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON results to {}", path.display());
        }
    }

    if !cli.no_export {
        let ts = export::now_timestamp();
        let entry = export::format_log_entry(&ts, &source, candidates.len(), &boards);
        export::append_to_path(&cli.log_file, &entry)?;
        println!("Results appended to {}", cli.log_file.display());

        if let Some(t) = conn_template.as_ref() {
            let configs = export::render_configs(t, &ts, &boards)?;
            export::append_to_path(&cli.configs_file, &configs)?;
            println!("Configs appended to {}", cli.configs_file.display());
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let mut cfg = match cli.config.as_deref() {
        Some(path) => config::load_config_from_path(path)?,
        None => ScanConfig::default(),
    };
    if let Some(v) = cli.concurrency {
        cfg.max_concurrency = v;
    }
    if let Some(v) = cli.ssl_timeout {
        cfg.ssl_timeout_seconds = v;
    }
    if let Some(v) = cli.rw_timeout {
        cfg.read_write_timeout_seconds = v;
    }
    if let Some(v) = cli.upload_kb {
        cfg.upload_payload_kb = v;
    }
    if let Some(v) = cli.top {
        cfg.top_n = v;
    }
    if let Some(v) = cli.max_candidates {
        cfg.max_candidates = v;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn load_template(cli: &Cli) -> Result<Option<ConnectionTemplate>> {
    let raw = match (&cli.template, &cli.template_file) {
        (Some(s), _) => s.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read template file: {}", path.display()))?,
        (None, None) => return Ok(None),
    };
    let t = ConnectionTemplate::parse(&raw).context("invalid connection template")?;
    Ok(Some(t))
}

fn load_networks(cli: &Cli) -> Result<(String, Vec<ipnet::IpNet>)> {
    if let Some(ip) = cli.ip.as_deref() {
        let net = ranges::parse_range(ip)
            .map_err(|reason| anyhow::anyhow!("invalid address `{ip}`: {reason}"))?;
        return Ok((format!("single {net}"), vec![net]));
    }
    if cli.ranges.is_empty() {
        bail!("no candidates given: pass --ranges <FILE> or --ip <ADDR>");
    }
    let mut nets = Vec::new();
    for path in &cli.ranges {
        nets.extend(ranges::load_ranges_from_path(path)?);
    }
    let source = cli
        .ranges
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Ok((source, nets))
}

async fn show_progress(mut rx: mpsc::UnboundedReceiver<ScanProgress>) {
    let mut stderr = std::io::stderr();
    while let Some(p) = rx.recv().await {
        let _ = write!(stderr, "\rProgress: {}/{} | Valid: {}", p.processed, p.total, p.accepted);
        let _ = stderr.flush();
    }
}

fn print_leaderboards(boards: &Leaderboards, n: usize) {
    println!("\n{:=<64}", "");
    println!("TOP {n} DOWNLOAD SPEED (streaming)");
    print_board(&boards.top_by_download, |r| {
        format!(
            "DL: {:>7.2} Mbps | UL: {:>6.2} Mbps | Ping: {:>4.0} ms",
            r.download_mbps, r.upload_mbps, r.latency_ms
        )
    });
    println!("{:-<64}", "");
    println!("TOP {n} QUALITY (low ping + upload)");
    print_board(&boards.top_by_quality, |r| {
        format!(
            "Ping: {:>4.0} ms | UL: {:>6.2} Mbps | DL: {:>7.2} Mbps",
            r.latency_ms, r.upload_mbps, r.download_mbps
        )
    });
    println!("{:=<64}", "");
}

fn print_board(list: &[MeasurementRecord], metrics: impl Fn(&MeasurementRecord) -> String) {
    let ip_w = list
        .iter()
        .map(|r| r.ip.to_string().len())
        .max()
        .unwrap_or(0)
        .max(15);
    for r in list {
        println!("{:<ip_w$} | {}", r.ip, metrics(r), ip_w = ip_w);
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: &'a ScanResults,
    leaderboards: &'a Leaderboards,
}

fn write_results_json(path: &Path, results: &ScanResults, boards: &Leaderboards) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(
        file,
        &JsonReport {
            results,
            leaderboards: boards,
        },
    )?;
    Ok(())
}
