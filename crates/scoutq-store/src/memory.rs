use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
    ListPage, ObjectMeta, ObjectStore, PutOptions, PutOutcome, PutPrecondition, StoreError,
    StoredObject,
};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// In-process object store.
///
/// Thread-safe via `RwLock`. Versions are per-key counters starting at `1`.
/// Listings are returned in key order, `page_size` objects at a time.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Entry>>>,
    page_size: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    version: u64,
    last_modified: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
}

impl Entry {
    fn meta(&self, key: &str) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: self.data.len() as u64,
            version: self.version.to_string(),
            last_modified: Some(self.last_modified),
            metadata: self.metadata.clone(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            objects: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that pages listings after `page_size` objects.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    /// Overwrite the last-modified time of an existing object.
    ///
    /// Returns `false` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if a writer panicked.
    pub fn set_last_modified(&self, key: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut objects = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(objects
            .get_mut(key)
            .map(|entry| entry.last_modified = at)
            .is_some())
    }

    /// Number of stored objects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if a writer panicked.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .objects
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .len())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if a writer panicked.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(objects.get(key).map(|entry| StoredObject {
            data: entry.data.clone(),
            meta: entry.meta(key),
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(objects.get(key).map(|entry| entry.meta(key)))
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<PutOutcome, StoreError> {
        let mut objects = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = objects.get(key);

        let satisfied = match &options.precondition {
            PutPrecondition::None => true,
            PutPrecondition::DoesNotExist => current.is_none(),
            PutPrecondition::MatchesVersion(expected) => {
                current.is_some_and(|entry| entry.version.to_string() == *expected)
            }
        };
        if !satisfied {
            return Ok(PutOutcome::PreconditionFailed);
        }

        let version = current.map_or(1, |entry| entry.version + 1);
        objects.insert(
            key.to_string(),
            Entry {
                data,
                version,
                last_modified: Utc::now(),
                metadata: options.metadata,
            },
        );
        drop(objects);

        Ok(PutOutcome::Written {
            version: version.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut keys: Vec<&String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation.is_none_or(|after| k.as_str() > after))
            .collect();
        keys.sort();

        let truncated = keys.len() > self.page_size;
        keys.truncate(self.page_size);

        let page: Vec<ObjectMeta> = keys
            .iter()
            .filter_map(|k| objects.get(*k).map(|entry| entry.meta(k)))
            .map(|mut meta| {
                meta.metadata.clear();
                meta
            })
            .collect();
        let next_continuation = if truncated {
            page.last().map(|meta| meta.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_continuation,
        })
    }
}
