//! The task ledger: every state transition of `AccountInfo/<platform>/<subject>/info.json`.
//!
//! All writes are conditional on the version that was read, so two workers
//! pointed at the same bucket cannot both claim a record. A lost race is
//! reported as [`LedgerError::Conflict`] (on completion) or silently skipped
//! (on claim: somebody else owns that record now).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use scoutq_core::keys::{parse_task_key, task_key, task_prefix, validate_subject};
use scoutq_core::{format_timestamp, Platform, TaskRecord, TaskStatus};
use scoutq_store::{ObjectStore, PutOptions, PutOutcome};

use crate::error::LedgerError;

pub const MISSING_REQUIRED_FIELDS: &str = "missing required fields";
pub const LEASE_EXHAUSTED: &str = "lease expired too many times";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A decoded task record together with where and at which version it was read.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub platform: Platform,
    pub subject: String,
    pub key: String,
    pub record: TaskRecord,
    pub version: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl TaskEntry {
    /// FIFO position: the submitter's `timestamp`, or the object's
    /// last-modified time when that is absent or unparseable.
    #[must_use]
    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.record.created_at().or(self.last_modified)
    }
}

/// A record this worker moved to `processing` and now owns.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub platform: Platform,
    pub subject: String,
    pub key: String,
    pub record: TaskRecord,
    /// Version written by the claim.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed,
    /// The record was already `processed` or `failed`; nothing was written.
    AlreadyTerminal,
}

/// A submission as an operator would write it.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub platform: Platform,
    pub subject: String,
    pub account_type: String,
    pub posting_style: String,
    pub competitors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Records returned to `pending`.
    pub reclaimed: usize,
    /// Records failed because they ran out of attempts.
    pub exhausted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub processed: usize,
    pub failed: usize,
    /// Task objects that could not be read or decoded.
    pub malformed: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.processed + self.failed + self.malformed
    }
}

pub struct TaskLedger {
    store: Arc<dyn ObjectStore>,
    max_attempts: u32,
}

impl TaskLedger {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Number of lease reclamations a record may go through before it is
    /// failed instead of being returned to `pending`.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Pending records for `platform`, oldest first. Records with neither a
    /// usable `timestamp` nor a last-modified time come last.
    ///
    /// Unreadable records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the listing fails.
    pub async fn list_pending(&self, platform: Platform) -> Result<Vec<TaskEntry>, LedgerError> {
        let (entries, _) = self.load_platform(platform).await?;
        let mut pending: Vec<TaskEntry> = entries
            .into_iter()
            .filter(|entry| entry.record.status == TaskStatus::Pending)
            .collect();
        // Undated records queue behind every dated one.
        pending.sort_by(|a, b| {
            let a_at = a.queued_at().unwrap_or(DateTime::<Utc>::MAX_UTC);
            let b_at = b.queued_at().unwrap_or(DateTime::<Utc>::MAX_UTC);
            a_at.cmp(&b_at).then_with(|| a.key.cmp(&b.key))
        });
        Ok(pending)
    }

    /// Claim the oldest pending record for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if listing or writing fails.
    pub async fn claim_next(&self, platform: Platform) -> Result<Option<ClaimedTask>, LedgerError> {
        self.claim_next_at(platform, Utc::now()).await
    }

    /// [`Self::claim_next`] with an explicit clock.
    ///
    /// Candidates missing required fields are failed on the spot and
    /// skipped. Candidates whose conditional write loses are skipped too.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if listing or writing fails.
    pub async fn claim_next_at(
        &self,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedTask>, LedgerError> {
        for entry in self.list_pending(platform).await? {
            let TaskEntry {
                platform,
                subject,
                key,
                mut record,
                version,
                ..
            } = entry;

            if record.missing_required_fields(&subject) {
                record.status = TaskStatus::Failed;
                record.failed_at = Some(now);
                record.error = Some(MISSING_REQUIRED_FIELDS.to_string());
                if let PutOutcome::Written { .. } = self.write(&key, &record, &version).await? {
                    tracing::warn!(
                        platform = %platform,
                        subject = %subject,
                        key = %key,
                        "ledger: task rejected, missing required fields"
                    );
                }
                continue;
            }

            record.status = TaskStatus::Processing;
            record.processing_started_at = Some(now);
            match self.write(&key, &record, &version).await? {
                PutOutcome::Written { version } => {
                    tracing::info!(
                        platform = %platform,
                        subject = %subject,
                        key = %key,
                        "ledger: task claimed"
                    );
                    return Ok(Some(ClaimedTask {
                        platform,
                        subject,
                        key,
                        record,
                        version,
                    }));
                }
                PutOutcome::PreconditionFailed => {
                    tracing::debug!(key = %key, "ledger: task claimed elsewhere, skipping");
                }
            }
        }
        Ok(None)
    }

    /// Record the outcome of a claimed task.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the record disappeared.
    /// - [`LedgerError::InvalidTransition`] if it is not `processing`.
    /// - [`LedgerError::Conflict`] if the caller no longer owns the claim,
    ///   or the record changed while being written.
    /// - [`LedgerError::Store`] / [`LedgerError::Json`] on I/O or decode failure.
    pub async fn complete(
        &self,
        task: &ClaimedTask,
        completion: Completion,
    ) -> Result<CompleteOutcome, LedgerError> {
        self.complete_at(task, completion, Utc::now()).await
    }

    /// [`Self::complete`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::complete`].
    pub async fn complete_at(
        &self,
        task: &ClaimedTask,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<CompleteOutcome, LedgerError> {
        let Some(entry) = self.read(task.platform, &task.subject, &task.key).await? else {
            return Err(LedgerError::NotFound {
                key: task.key.clone(),
            });
        };
        let mut record = entry.record;

        if record.status.is_terminal() {
            tracing::info!(
                key = %task.key,
                status = %record.status,
                "ledger: task already terminal, completion ignored"
            );
            return Ok(CompleteOutcome::AlreadyTerminal);
        }
        if record.status != TaskStatus::Processing {
            return Err(LedgerError::InvalidTransition {
                key: task.key.clone(),
                expected: TaskStatus::Processing,
                found: record.status,
            });
        }
        // The lease may have been reclaimed and the record claimed again.
        // Backends that answer a write without an ETag leave only the claim
        // stamp to compare.
        let still_owned = if task.version.is_empty() {
            record.processing_started_at.map(format_timestamp)
                == task.record.processing_started_at.map(format_timestamp)
        } else {
            entry.version == task.version
        };
        if !still_owned {
            tracing::warn!(
                key = %task.key,
                "ledger: claim superseded by another worker, completion rejected"
            );
            return Err(LedgerError::Conflict {
                key: task.key.clone(),
            });
        }

        match &completion {
            Completion::Succeeded => {
                record.status = TaskStatus::Processed;
                record.processed_at = Some(now);
            }
            Completion::Failed(message) => {
                record.status = TaskStatus::Failed;
                record.failed_at = Some(now);
                record.error = Some(message.clone());
            }
        }

        match self.write(&task.key, &record, &entry.version).await? {
            PutOutcome::Written { .. } => {
                tracing::info!(
                    platform = %task.platform,
                    subject = %task.subject,
                    status = %record.status,
                    "ledger: task completed"
                );
                Ok(CompleteOutcome::Completed)
            }
            PutOutcome::PreconditionFailed => Err(LedgerError::Conflict {
                key: task.key.clone(),
            }),
        }
    }

    /// Return records whose processing lease has expired to `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the listing fails. Per-record write
    /// failures are logged and skipped.
    pub async fn reclaim_stale(
        &self,
        platform: Platform,
        lease: Duration,
    ) -> Result<ReclaimReport, LedgerError> {
        self.reclaim_stale_at(platform, lease, Utc::now()).await
    }

    /// [`Self::reclaim_stale`] with an explicit clock.
    ///
    /// A record with no `processing_started_at` is judged by its
    /// last-modified time; with neither it is considered expired.
    ///
    /// # Errors
    ///
    /// See [`Self::reclaim_stale`].
    pub async fn reclaim_stale_at(
        &self,
        platform: Platform,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<ReclaimReport, LedgerError> {
        let (entries, _) = self.load_platform(platform).await?;
        let mut report = ReclaimReport::default();

        for entry in entries {
            if entry.record.status != TaskStatus::Processing {
                continue;
            }
            let started = entry.record.processing_started_at.or(entry.last_modified);
            let expired = started.is_none_or(|at| (now - at).to_std().is_ok_and(|age| age > lease));
            if !expired {
                continue;
            }

            let mut record = entry.record;
            let exhausted = record.attempts >= self.max_attempts;
            if exhausted {
                record.status = TaskStatus::Failed;
                record.failed_at = Some(now);
                record.error = Some(LEASE_EXHAUSTED.to_string());
            } else {
                record.status = TaskStatus::Pending;
                record.attempts += 1;
                record.reclaimed_at = Some(now);
                record.processing_started_at = None;
            }

            match self.write(&entry.key, &record, &entry.version).await {
                Ok(PutOutcome::Written { .. }) => {
                    tracing::warn!(
                        platform = %platform,
                        subject = %entry.subject,
                        attempts = record.attempts,
                        exhausted,
                        "ledger: processing lease expired"
                    );
                    if exhausted {
                        report.exhausted += 1;
                    } else {
                        report.reclaimed += 1;
                    }
                }
                Ok(PutOutcome::PreconditionFailed) => {
                    tracing::debug!(key = %entry.key, "ledger: record changed during reclaim, skipping");
                }
                Err(e) => {
                    tracing::error!(key = %entry.key, error = %e, "ledger: failed to reclaim record");
                }
            }
        }
        Ok(report)
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] or [`LedgerError::Json`].
    pub async fn get(
        &self,
        platform: Platform,
        subject: &str,
    ) -> Result<Option<TaskEntry>, LedgerError> {
        validate_subject(subject)?;
        self.read(platform, subject, &task_key(platform, subject))
            .await
    }

    /// Write a fresh `pending` record. Refuses to replace an existing record
    /// unless `overwrite` is set.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Core`] if the subject is not a valid key segment.
    /// - [`LedgerError::AlreadyExists`] if the record exists and `overwrite` is false.
    /// - [`LedgerError::Store`] on I/O failure.
    pub async fn submit(&self, task: NewTask, overwrite: bool) -> Result<String, LedgerError> {
        self.submit_at(task, overwrite, Utc::now()).await
    }

    /// [`Self::submit`] with an explicit submission time.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn submit_at(
        &self,
        task: NewTask,
        overwrite: bool,
        now: DateTime<Utc>,
    ) -> Result<String, LedgerError> {
        validate_subject(&task.subject)?;
        let key = task_key(task.platform, &task.subject);
        let record = TaskRecord::new_pending(
            task.subject,
            task.account_type,
            task.posting_style,
            task.competitors,
            now,
        );

        let options = if overwrite {
            PutOptions::json()
        } else {
            PutOptions::json().if_absent()
        };
        match self.store.put(&key, encode(&key, &record)?, options).await? {
            PutOutcome::Written { .. } => {
                tracing::info!(key = %key, "ledger: task submitted");
                Ok(key)
            }
            PutOutcome::PreconditionFailed => Err(LedgerError::AlreadyExists { key }),
        }
    }

    /// Count records per status for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the listing fails.
    pub async fn status_counts(&self, platform: Platform) -> Result<StatusCounts, LedgerError> {
        let (entries, malformed) = self.load_platform(platform).await?;
        let mut counts = StatusCounts {
            malformed,
            ..StatusCounts::default()
        };
        for entry in &entries {
            match entry.record.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Processed => counts.processed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    /// Read every task record for `platform`. Returns the decoded entries and
    /// the number of task objects that could not be read.
    async fn load_platform(
        &self,
        platform: Platform,
    ) -> Result<(Vec<TaskEntry>, usize), LedgerError> {
        let listing = self.store.list(&task_prefix(platform)).await?;
        let mut entries = Vec::with_capacity(listing.len());
        let mut unreadable = 0;

        for meta in listing {
            let Some((key_platform, subject)) = parse_task_key(&meta.key) else {
                continue;
            };
            if key_platform != platform {
                continue;
            }
            match self.read(platform, &subject, &meta.key).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %meta.key, error = %e, "ledger: skipping unreadable task record");
                    unreadable += 1;
                }
            }
        }
        Ok((entries, unreadable))
    }

    async fn read(
        &self,
        platform: Platform,
        subject: &str,
        key: &str,
    ) -> Result<Option<TaskEntry>, LedgerError> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(None);
        };
        let record: TaskRecord =
            serde_json::from_slice(&object.data).map_err(|source| LedgerError::Json {
                key: key.to_string(),
                source,
            })?;
        Ok(Some(TaskEntry {
            platform,
            subject: subject.to_string(),
            key: key.to_string(),
            record,
            version: object.meta.version,
            last_modified: object.meta.last_modified,
        }))
    }

    async fn write(
        &self,
        key: &str,
        record: &TaskRecord,
        version: &str,
    ) -> Result<PutOutcome, LedgerError> {
        let body = encode(key, record)?;
        Ok(self
            .store
            .put(key, body, PutOptions::json().if_version(version))
            .await?)
    }
}

fn encode(key: &str, record: &TaskRecord) -> Result<Bytes, LedgerError> {
    serde_json::to_vec_pretty(record)
        .map(Bytes::from)
        .map_err(|source| LedgerError::Json {
            key: key.to_string(),
            source,
        })
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
