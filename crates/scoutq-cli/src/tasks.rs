//! Ledger command handlers for the CLI.
//!
//! Each handler prints a human-readable summary to stdout and returns the
//! underlying value so callers can inspect it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use scoutq_core::keys::{artifact_dir, validate_subject};
use scoutq_core::Platform;
use scoutq_ledger::{
    ArtifactSequencer, ExpiryReaper, NewTask, ReclaimReport, StatusCounts, SweepReport,
    TaskLedger,
};
use scoutq_store::ObjectStore;

/// Write a pending task record. Refuses to replace an existing record
/// unless `force` is set.
pub(crate) async fn run_submit(
    store: Arc<dyn ObjectStore>,
    task: NewTask,
    force: bool,
) -> anyhow::Result<String> {
    let subject = task.subject.clone();
    let key = TaskLedger::new(store)
        .submit(task, force)
        .await
        .with_context(|| format!("failed to submit {subject}"))?;
    println!("submitted {key}");
    Ok(key)
}

pub(crate) async fn run_status(
    store: Arc<dyn ObjectStore>,
    platform: Platform,
    subject: Option<&str>,
) -> anyhow::Result<Option<StatusCounts>> {
    let ledger = TaskLedger::new(store);

    if let Some(subject) = subject {
        match ledger.get(platform, subject).await? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry.record)?),
            None => println!("no task for {platform}/{subject}"),
        }
        return Ok(None);
    }

    let counts = ledger.status_counts(platform).await?;
    println!(
        "{platform}: {} pending, {} processing, {} processed, {} failed, {} malformed ({} total)",
        counts.pending,
        counts.processing,
        counts.processed,
        counts.failed,
        counts.malformed,
        counts.total()
    );
    Ok(Some(counts))
}

pub(crate) async fn run_sweep(
    store: Arc<dyn ObjectStore>,
    namespace: &str,
) -> anyhow::Result<SweepReport> {
    let report = ExpiryReaper::new(store).sweep(namespace).await?;
    println!(
        "{namespace}: scanned {}, deleted {}, invalid {}, failed {}",
        report.scanned, report.deleted, report.invalid, report.failed
    );
    Ok(report)
}

pub(crate) async fn run_reclaim(
    store: Arc<dyn ObjectStore>,
    platform: Platform,
    lease: Option<Duration>,
    max_attempts: u32,
) -> anyhow::Result<ReclaimReport> {
    let lease = lease.context("lease reclamation is disabled (SCOUTQ_LEASE_SECS=0); pass --lease-secs")?;
    let report = TaskLedger::new(store)
        .with_max_attempts(max_attempts)
        .reclaim_stale(platform, lease)
        .await?;
    println!(
        "{platform}: reclaimed {}, exhausted {}",
        report.reclaimed, report.exhausted
    );
    Ok(report)
}

pub(crate) async fn run_next_seq(
    store: Arc<dyn ObjectStore>,
    kind: &str,
    platform: Platform,
    subject: &str,
) -> anyhow::Result<u64> {
    validate_subject(subject)?;
    let dir = artifact_dir(kind, platform, subject);
    let next = ArtifactSequencer::new(store).next_sequence(&dir, kind).await?;
    println!("{next}");
    Ok(next)
}
