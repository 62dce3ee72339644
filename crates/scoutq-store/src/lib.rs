//! Object-store adapter used as both queue and ledger.
//!
//! [`ObjectStore`] is the only seam the rest of the workspace talks to.
//! [`MemoryStore`] backs tests and dry runs; [`S3Store`] speaks the S3 API
//! (AWS or Cloudflare R2).

pub mod error;
pub mod memory;
pub(crate) mod retry;
pub mod s3;

mod listing;
mod sigv4;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use scoutq_core::{AppConfig, StoreBackend};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use s3::S3Store;

/// Upper bound on pages fetched by [`ObjectStore::list`] for one prefix.
pub const MAX_LIST_PAGES: usize = 10_000;

/// Metadata describing one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// Opaque token that changes on every write (S3 `ETag`).
    pub version: String,
    pub last_modified: Option<DateTime<Utc>>,
    /// User metadata. Empty in listings; populated by `get` and `head`.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub meta: ObjectMeta,
}

/// Condition a write must satisfy to take effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PutPrecondition {
    #[default]
    None,
    /// Only create; fail if the key exists.
    DoesNotExist,
    /// Only overwrite the exact version previously read.
    MatchesVersion(String),
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub precondition: PutPrecondition,
    pub metadata: BTreeMap<String, String>,
    pub content_type: Option<String>,
}

impl PutOptions {
    /// Options for a JSON document with no precondition.
    #[must_use]
    pub fn json() -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn if_absent(mut self) -> Self {
        self.precondition = PutPrecondition::DoesNotExist;
        self
    }

    #[must_use]
    pub fn if_version(mut self, version: impl Into<String>) -> Self {
        self.precondition = PutPrecondition::MatchesVersion(version.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Written { version: String },
    PreconditionFailed,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub next_continuation: Option<String>,
}

/// Minimal object-store contract: keyed blobs, per-object metadata, prefix
/// listing and conditional writes.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Returns `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    async fn put(&self, key: &str, data: Bytes, options: PutOptions)
        -> Result<PutOutcome, StoreError>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Every object under `prefix`, following continuation tokens.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let page = self.list_page(prefix, continuation.as_deref()).await?;
            objects.extend(page.objects);
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => return Ok(objects),
            }
        }
        Err(StoreError::TooManyPages {
            prefix: prefix.to_string(),
            pages: MAX_LIST_PAGES,
        })
    }
}

/// Build the store selected by `config.store`.
///
/// # Errors
///
/// Returns [`StoreError`] if the S3 client cannot be constructed.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    match &config.store {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::S3(settings) => {
            let store = S3Store::new(
                settings.clone(),
                Duration::from_secs(config.store_request_timeout_secs),
            )?
            .with_retry(config.store_max_retries, config.store_retry_backoff_base_ms);
            Ok(Arc::new(store))
        }
    }
}
