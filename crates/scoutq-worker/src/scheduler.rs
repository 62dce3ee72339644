//! Priority-ordered polling loop over the task ledger.
//!
//! Each iteration claims at most one task, walking platforms in configured
//! order so a higher-priority platform is always drained first. Idle
//! iterations double as maintenance windows for lease reclamation and the
//! expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use scoutq_core::{AppConfig, Platform};
use scoutq_ledger::{
    ClaimedTask, CompleteOutcome, Completion, ExpiryReaper, LedgerError, TaskLedger,
};
use scoutq_store::ObjectStore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Pipeline;
use crate::processor::Processor;

/// Which namespaces the expiry sweep covers and how often it may run.
#[derive(Debug, Clone)]
pub struct ReapSchedule {
    pub namespaces: Vec<String>,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Highest priority first.
    pub platforms: Vec<Platform>,
    pub idle_backoff: Duration,
    pub busy_backoff: Duration,
    /// `None` disables lease reclamation.
    pub lease: Option<Duration>,
    pub max_attempts: u32,
    pub artifact_ttl: Option<Duration>,
    pub reap: Option<ReapSchedule>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            platforms: Platform::ALL.to_vec(),
            idle_backoff: Duration::from_secs(300),
            busy_backoff: Duration::from_secs(10),
            lease: Some(Duration::from_secs(3600)),
            max_attempts: 3,
            artifact_ttl: None,
            reap: None,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let reap = (!config.reap_namespaces.is_empty()).then(|| ReapSchedule {
            namespaces: config.reap_namespaces.clone(),
            interval: Duration::from_secs(config.reap_interval_secs),
        });
        Self {
            platforms: config.platforms.clone(),
            idle_backoff: config.idle_backoff(),
            busy_backoff: config.busy_backoff(),
            lease: config.lease(),
            max_attempts: config.max_attempts,
            artifact_ttl: config.artifact_ttl(),
            reap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Worked(Platform),
    Idle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub iterations: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub idle: u64,
}

pub struct PlatformScheduler {
    ledger: TaskLedger,
    pipeline: Pipeline,
    reaper: ExpiryReaper,
    config: SchedulerConfig,
    last_reap: Option<Instant>,
    stats: SchedulerStats,
}

impl PlatformScheduler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: Arc<dyn Processor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ledger: TaskLedger::new(Arc::clone(&store)).with_max_attempts(config.max_attempts),
            pipeline: Pipeline::new(Arc::clone(&store), processor, config.artifact_ttl),
            reaper: ExpiryReaper::new(store),
            config,
            last_reap: None,
            stats: SchedulerStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Poll until `cancel` fires.
    ///
    /// A task already claimed is always driven to completion before the
    /// token is looked at again; only the back-off sleeps race it.
    pub async fn run_forever(&mut self, cancel: CancellationToken) -> SchedulerStats {
        tracing::info!(
            platforms = ?self.config.platforms,
            idle_backoff_secs = self.config.idle_backoff.as_secs(),
            busy_backoff_secs = self.config.busy_backoff.as_secs(),
            "scheduler: starting"
        );
        self.reclaim_expired_leases().await;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let delay = match self.run_iteration().await {
                IterationOutcome::Worked(_) => self.config.busy_backoff,
                IterationOutcome::Idle => self.config.idle_backoff,
            };
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(
            iterations = self.stats.iterations,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            "scheduler: stopped"
        );
        self.stats
    }

    /// Claim and run at most one task. Runs maintenance when nothing was
    /// claimable on any platform.
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        self.stats.iterations += 1;

        for platform in self.config.platforms.clone() {
            match self.ledger.claim_next(platform).await {
                Ok(Some(task)) => {
                    self.execute(task).await;
                    return IterationOutcome::Worked(platform);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(%platform, error = %e, "scheduler: claim failed");
                }
            }
        }

        self.stats.idle += 1;
        tracing::debug!("scheduler: no pending tasks");
        self.run_maintenance().await;
        IterationOutcome::Idle
    }

    async fn execute(&mut self, task: ClaimedTask) {
        tracing::info!(
            platform = %task.platform,
            subject = %task.subject,
            "scheduler: processing task"
        );

        let completion = self.pipeline.run(&task).await;
        match &completion {
            Completion::Succeeded => self.stats.succeeded += 1,
            Completion::Failed(reason) => {
                self.stats.failed += 1;
                tracing::warn!(
                    platform = %task.platform,
                    subject = %task.subject,
                    reason = %reason,
                    "scheduler: task failed"
                );
            }
        }

        match self.ledger.complete(&task, completion).await {
            Ok(CompleteOutcome::Completed) => {
                tracing::info!(
                    platform = %task.platform,
                    subject = %task.subject,
                    "scheduler: task completed"
                );
            }
            Ok(CompleteOutcome::AlreadyTerminal) => {
                tracing::warn!(
                    key = %task.key,
                    "scheduler: task was already terminal; completion dropped"
                );
            }
            Err(e @ (LedgerError::Conflict { .. } | LedgerError::InvalidTransition { .. })) => {
                tracing::warn!(key = %task.key, error = %e, "scheduler: task changed under us");
            }
            Err(e) => {
                tracing::error!(key = %task.key, error = %e, "scheduler: failed to record completion");
            }
        }
    }

    async fn run_maintenance(&mut self) {
        self.reclaim_expired_leases().await;

        let Some(reap) = &self.config.reap else {
            return;
        };
        let due = self
            .last_reap
            .is_none_or(|last| last.elapsed() >= reap.interval);
        if !due {
            return;
        }
        for namespace in &reap.namespaces {
            if let Err(e) = self.reaper.sweep(namespace).await {
                tracing::error!(namespace = %namespace, error = %e, "scheduler: expiry sweep failed");
            }
        }
        self.last_reap = Some(Instant::now());
    }

    async fn reclaim_expired_leases(&self) {
        let Some(lease) = self.config.lease else {
            return;
        };
        for &platform in &self.config.platforms {
            match self.ledger.reclaim_stale(platform, lease).await {
                Ok(report) if report.reclaimed > 0 || report.exhausted > 0 => {
                    tracing::info!(
                        %platform,
                        reclaimed = report.reclaimed,
                        exhausted = report.exhausted,
                        "scheduler: reclaimed expired leases"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(%platform, error = %e, "scheduler: lease reclamation failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
