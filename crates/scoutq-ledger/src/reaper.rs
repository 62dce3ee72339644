//! Deletes objects whose `expiration-time` metadata has passed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scoutq_core::parse_timestamp;
use scoutq_store::ObjectStore;

use crate::error::LedgerError;

/// Object metadata field carrying an ISO-8601 expiry instant.
pub const EXPIRATION_METADATA: &str = "expiration-time";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    /// Objects whose expiry could not be parsed. They are left in place.
    pub invalid: usize,
    /// Objects that could not be inspected or deleted.
    pub failed: usize,
}

pub struct ExpiryReaper {
    store: Arc<dyn ObjectStore>,
}

impl ExpiryReaper {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Sweep every object under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the listing fails. Failures on
    /// individual objects are logged and counted in [`SweepReport::failed`].
    pub async fn sweep(&self, namespace: &str) -> Result<SweepReport, LedgerError> {
        self.sweep_at(namespace, Utc::now()).await
    }

    /// [`Self::sweep`] treating `now` as the sweep start time.
    ///
    /// # Errors
    ///
    /// See [`Self::sweep`].
    pub async fn sweep_at(
        &self,
        namespace: &str,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, LedgerError> {
        let listing = self.store.list(namespace).await?;
        let mut report = SweepReport {
            scanned: listing.len(),
            ..SweepReport::default()
        };

        for object in listing {
            // Listings do not carry user metadata.
            let meta = match self.store.head(&object.key).await {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %object.key, error = %e, "reaper: head failed");
                    report.failed += 1;
                    continue;
                }
            };
            let Some(raw) = meta.metadata.get(EXPIRATION_METADATA) else {
                continue;
            };
            let Some(expires_at) = parse_timestamp(raw) else {
                tracing::warn!(key = %object.key, value = %raw, "reaper: unparseable expiration-time");
                report.invalid += 1;
                continue;
            };
            if expires_at >= now {
                continue;
            }

            match self.store.delete(&object.key).await {
                Ok(()) => {
                    tracing::debug!(key = %object.key, expires_at = %expires_at, "reaper: deleted expired object");
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %object.key, error = %e, "reaper: delete failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            namespace,
            scanned = report.scanned,
            deleted = report.deleted,
            invalid = report.invalid,
            failed = report.failed,
            "reaper: sweep complete"
        );
        Ok(report)
    }
}
