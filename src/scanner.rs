use crate::config::ScanConfig;
use crate::pipeline::{self, Rejection, Verdict};
use crate::probe::StageProbes;
use crate::types::{MeasurementRecord, ScanProgress, ScanResults};
use std::net::IpAddr;
use std::panic;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the stage pipeline for every candidate with bounded parallelism.
///
/// - At most `cfg.max_concurrency` pipelines are in flight (a permit is taken
///   before each task is spawned; 0 is treated as 1).
/// - Finished pipelines report through a channel to a single collector that
///   owns the counters and the record list.
/// - Finished tasks are reaped while spawning, so task bookkeeping stays
///   proportional to the limit rather than to the candidate count.
/// - Records are returned in completion order.
pub async fn scan_candidates<P>(
    probes: Arc<P>,
    candidates: &[IpAddr],
    cfg: &ScanConfig,
) -> ScanResults
where
    P: StageProbes + ?Sized + 'static,
{
    scan_internal(probes, candidates, cfg, None, CancellationToken::new()).await
}

/// Variant that streams a [`ScanProgress`] per finished candidate and stops
/// starting new candidates once `cancel` fires. In-flight candidates still
/// finish and are included in the results.
pub async fn scan_candidates_with_progress<P>(
    probes: Arc<P>,
    candidates: &[IpAddr],
    cfg: &ScanConfig,
    progress: mpsc::UnboundedSender<ScanProgress>,
    cancel: CancellationToken,
) -> ScanResults
where
    P: StageProbes + ?Sized + 'static,
{
    scan_internal(probes, candidates, cfg, Some(progress), cancel).await
}

#[derive(Debug, Default)]
struct Tally {
    processed: u64,
    unreachable: u64,
    weak_download: u64,
    records: Vec<MeasurementRecord>,
}

async fn scan_internal<P>(
    probes: Arc<P>,
    candidates: &[IpAddr],
    cfg: &ScanConfig,
    progress: Option<mpsc::UnboundedSender<ScanProgress>>,
    cancel: CancellationToken,
) -> ScanResults
where
    P: StageProbes + ?Sized + 'static,
{
    let total = candidates.len() as u64;
    let survival_mbps = cfg.download_survival_mbps;
    let (tx, rx) = mpsc::unbounded_channel::<Verdict>();
    let collector = tokio::spawn(collect(rx, total, progress));

    let limit = cfg.max_concurrency.max(1);
    let sem = Arc::new(Semaphore::new(limit));
    let mut set = JoinSet::new();
    let mut cancelled = false;

    for &ip in candidates {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = sem.clone().acquire_owned() => Some(permit.expect("semaphore is never closed")),
        };
        let Some(permit) = permit else {
            cancelled = true;
            break;
        };
        let probes = probes.clone();
        let tx = tx.clone();

        set.spawn(async move {
            let _permit = permit; // keep permit until the pipeline finishes
            let verdict = pipeline::run_candidate(probes.as_ref(), ip, survival_mbps).await;
            // The collector outlives every sender.
            let _ = tx.send(verdict);
        });

        // Reap finished tasks so the set holds about `limit` entries.
        while let Some(res) = set.try_join_next() {
            if let Err(e) = res {
                propagate_panic(e);
            }
        }
    }
    drop(tx);

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            propagate_panic(e);
        }
    }
    let tally = match collector.await {
        Ok(t) => t,
        Err(e) => {
            propagate_panic(e);
            Tally::default()
        }
    };

    info!(
        total,
        processed = tally.processed,
        accepted = tally.records.len(),
        unreachable = tally.unreachable,
        weak_download = tally.weak_download,
        cancelled,
        "scan finished"
    );

    ScanResults {
        scanned_total: total,
        scanned_done: tally.processed,
        accepted_count: tally.records.len() as u64,
        cancelled,
        records: tally.records,
    }
}

async fn collect(
    mut rx: mpsc::UnboundedReceiver<Verdict>,
    total: u64,
    progress: Option<mpsc::UnboundedSender<ScanProgress>>,
) -> Tally {
    let mut tally = Tally::default();
    while let Some(verdict) = rx.recv().await {
        tally.processed += 1;
        match verdict {
            Verdict::Completed(record) => tally.records.push(record),
            Verdict::Rejected(Rejection::Unreachable) => tally.unreachable += 1,
            Verdict::Rejected(Rejection::WeakDownload) => tally.weak_download += 1,
        }
        if let Some(p) = &progress {
            // A dropped receiver only means nobody is displaying progress.
            let _ = p.send(ScanProgress {
                processed: tally.processed,
                total,
                accepted: tally.records.len() as u64,
            });
        }
    }
    tally
}

/// Tasks are never aborted, so a join error is always a panic.
fn propagate_panic(e: JoinError) {
    if e.is_panic() {
        panic::resume_unwind(e.into_panic());
    }
}
