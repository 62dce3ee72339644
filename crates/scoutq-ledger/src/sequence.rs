//! Sequence-numbered artifacts: `<kind>/<platform>/<subject>/<kind>_<N>.json`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use scoutq_core::keys::{artifact_dir, artifact_file_name, parse_artifact_sequence, validate_subject};
use scoutq_core::{format_timestamp, Platform};
use scoutq_store::{ObjectStore, PutOptions, PutOutcome};

use crate::error::LedgerError;
use crate::reaper::EXPIRATION_METADATA;

/// How many times a write retries with a higher number after losing a race.
const MAX_WRITE_ATTEMPTS: u32 = 5;

pub struct ArtifactSequencer {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactSequencer {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// One more than the highest `<kind>_<N>.json` under `directory`, or `1`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the listing fails.
    pub async fn next_sequence(&self, directory: &str, kind: &str) -> Result<u64, LedgerError> {
        let highest = self
            .store
            .list(directory)
            .await?
            .iter()
            .filter_map(|meta| parse_artifact_sequence(&meta.key, kind))
            .max();
        Ok(highest.map_or(1, |n| n.saturating_add(1)))
    }
}

/// Where an artifact landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub key: String,
    pub sequence: u64,
}

/// Writes artifacts under the next free sequence number.
pub struct ArtifactWriter {
    store: Arc<dyn ObjectStore>,
    sequencer: ArtifactSequencer,
}

impl ArtifactWriter {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            sequencer: ArtifactSequencer::new(Arc::clone(&store)),
            store,
        }
    }

    /// Store `body` as the next artifact of `kind` for `subject`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidArtifactKind`] / [`LedgerError::Core`] for
    ///   names that cannot form a key.
    /// - [`LedgerError::SequenceContention`] if every attempt lost a race.
    /// - [`LedgerError::Store`] on I/O failure.
    pub async fn write(
        &self,
        kind: &str,
        platform: Platform,
        subject: &str,
        body: Bytes,
        ttl: Option<Duration>,
    ) -> Result<WrittenArtifact, LedgerError> {
        self.write_at(kind, platform, subject, body, ttl, Utc::now())
            .await
    }

    /// [`Self::write`] with an explicit clock for the expiry stamp.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub async fn write_at(
        &self,
        kind: &str,
        platform: Platform,
        subject: &str,
        body: Bytes,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<WrittenArtifact, LedgerError> {
        if kind.trim().is_empty() || kind.contains('/') {
            return Err(LedgerError::InvalidArtifactKind(kind.to_string()));
        }
        validate_subject(subject)?;

        let dir = artifact_dir(kind, platform, subject);
        let mut options = PutOptions::json().if_absent();
        if let Some(expires_at) = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl))
        {
            options = options.with_metadata(EXPIRATION_METADATA, format_timestamp(expires_at));
        }

        let mut sequence = self.sequencer.next_sequence(&dir, kind).await?;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let key = format!("{dir}{}", artifact_file_name(kind, sequence));
            match self.store.put(&key, body.clone(), options.clone()).await? {
                PutOutcome::Written { .. } => {
                    tracing::debug!(key = %key, sequence, "ledger: artifact written");
                    return Ok(WrittenArtifact { key, sequence });
                }
                PutOutcome::PreconditionFailed => {
                    tracing::debug!(key = %key, "ledger: artifact number taken, retrying");
                    sequence = self
                        .sequencer
                        .next_sequence(&dir, kind)
                        .await?
                        .max(sequence + 1);
                }
            }
        }

        Err(LedgerError::SequenceContention {
            dir,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use scoutq_store::MemoryStore;

    use super::*;

    fn setup() -> (Arc<MemoryStore>, ArtifactWriter) {
        let store = Arc::new(MemoryStore::new());
        let writer = ArtifactWriter::new(store.clone());
        (store, writer)
    }

    #[tokio::test]
    async fn empty_directory_starts_at_one() {
        let (store, _) = setup();
        let sequencer = ArtifactSequencer::new(store);
        assert_eq!(
            sequencer
                .next_sequence("recommendation/twitter/acme/", "recommendation")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn sequential_writes_number_one_to_n() {
        let (_, writer) = setup();
        let mut numbers = Vec::new();
        for _ in 0..4 {
            let written = writer
                .write("recommendation", Platform::Twitter, "acme", Bytes::from_static(b"{}"), None)
                .await
                .unwrap();
            numbers.push(written.sequence);
        }
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn next_sequence_skips_gaps_and_other_families() {
        let (store, _) = setup();
        for key in [
            "analysis/instagram/acme/analysis_2.json",
            "analysis/instagram/acme/analysis_9.json",
            "analysis/instagram/acme/notes_40.json",
            "analysis/instagram/acme/analysis_x.json",
        ] {
            store
                .put(key, Bytes::new(), PutOptions::default())
                .await
                .unwrap();
        }
        let sequencer = ArtifactSequencer::new(store);
        assert_eq!(
            sequencer
                .next_sequence("analysis/instagram/acme/", "analysis")
                .await
                .unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn existing_artifacts_are_never_overwritten() {
        let (store, writer) = setup();
        store
            .put(
                "analysis/twitter/acme/analysis_1.json",
                Bytes::from_static(b"first"),
                PutOptions::default(),
            )
            .await
            .unwrap();

        let written = writer
            .write("analysis", Platform::Twitter, "acme", Bytes::from_static(b"second"), None)
            .await
            .unwrap();
        assert_eq!(written.key, "analysis/twitter/acme/analysis_2.json");
        let first = store
            .get("analysis/twitter/acme/analysis_1.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.data, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn ttl_stamps_expiration_metadata() {
        let (store, writer) = setup();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let written = writer
            .write_at(
                "recommendation",
                Platform::Instagram,
                "acme",
                Bytes::from_static(b"{}"),
                Some(Duration::from_secs(24 * 3600)),
                now,
            )
            .await
            .unwrap();

        let head = store.head(&written.key).await.unwrap().unwrap();
        assert_eq!(
            head.metadata.get(EXPIRATION_METADATA).map(String::as_str),
            Some("2025-01-02T00:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn rejects_kinds_that_break_the_layout() {
        let (_, writer) = setup();
        for kind in ["", " ", "a/b"] {
            let err = writer
                .write(kind, Platform::Twitter, "acme", Bytes::new(), None)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidArtifactKind(_)));
        }
    }
}
