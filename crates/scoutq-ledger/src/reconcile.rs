//! Profile reconciliation: fold a fresh snapshot into the stored one without
//! letting a degraded scrape erase good data.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use scoutq_core::keys::profile_key;
use scoutq_core::{Platform, ProfileRecord};
use scoutq_store::{ObjectStore, PutOptions};

use crate::error::LedgerError;

/// A snapshot is complete when it carries both counts and an avatar.
#[must_use]
pub fn is_complete(profile: &ProfileRecord) -> bool {
    profile.follower_count > 0
        && profile.following_count > 0
        && (!profile.avatar_url.is_empty() || !profile.avatar_url_hd.is_empty())
}

fn prefer_count(new: u64, existing: u64) -> u64 {
    if new > 0 {
        new
    } else {
        existing
    }
}

fn prefer_text(new: String, existing: &str) -> String {
    if new.trim().is_empty() {
        existing.to_string()
    } else {
        new
    }
}

/// Merge `new` over `existing`.
///
/// A complete snapshot replaces the stored one wholesale. Otherwise each
/// field keeps its stored value wherever the new one is zero or empty.
/// `accountType` and `postingStyle` are sticky either way, and
/// `extractedAt` is always `now`.
#[must_use]
pub fn merge(
    new: ProfileRecord,
    existing: Option<&ProfileRecord>,
    now: DateTime<Utc>,
) -> ProfileRecord {
    let Some(existing) = existing else {
        return ProfileRecord {
            extracted_at: Some(now),
            ..new
        };
    };

    if is_complete(&new) {
        return ProfileRecord {
            account_type: prefer_text(new.account_type, &existing.account_type),
            posting_style: prefer_text(new.posting_style, &existing.posting_style),
            extracted_at: Some(now),
            ..new
        };
    }

    ProfileRecord {
        subject: new.subject,
        platform: new.platform,
        display_name: prefer_text(new.display_name, &existing.display_name),
        biography: prefer_text(new.biography, &existing.biography),
        follower_count: prefer_count(new.follower_count, existing.follower_count),
        following_count: prefer_count(new.following_count, existing.following_count),
        post_count: prefer_count(new.post_count, existing.post_count),
        external_url: prefer_text(new.external_url, &existing.external_url),
        avatar_url: prefer_text(new.avatar_url, &existing.avatar_url),
        avatar_url_hd: prefer_text(new.avatar_url_hd, &existing.avatar_url_hd),
        private: new.private,
        verified: new.verified,
        account_type: prefer_text(new.account_type, &existing.account_type),
        posting_style: prefer_text(new.posting_style, &existing.posting_style),
        business_fields: new
            .business_fields
            .or_else(|| existing.business_fields.clone()),
        extracted_at: Some(now),
    }
}

/// Reads and writes `ProfileInfo/<platform>/<subject>.json`.
pub struct ProfileStore {
    store: Arc<dyn ObjectStore>,
}

impl ProfileStore {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The stored snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] on I/O failure or
    /// [`LedgerError::Json`] if the stored object does not decode.
    pub async fn get(
        &self,
        platform: Platform,
        subject: &str,
    ) -> Result<Option<ProfileRecord>, LedgerError> {
        let key = profile_key(platform, subject);
        let Some(object) = self.store.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&object.data)
            .map(Some)
            .map_err(|source| LedgerError::Json { key, source })
    }

    /// Merge `new` into the stored snapshot and write the result back.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Store`] if the read or write fails.
    pub async fn reconcile(&self, new: ProfileRecord) -> Result<ProfileRecord, LedgerError> {
        self.reconcile_at(new, Utc::now()).await
    }

    /// [`Self::reconcile`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::reconcile`].
    pub async fn reconcile_at(
        &self,
        new: ProfileRecord,
        now: DateTime<Utc>,
    ) -> Result<ProfileRecord, LedgerError> {
        let platform = new.platform;
        let key = profile_key(platform, &new.subject);

        let existing = match self.get(platform, &new.subject).await {
            Ok(existing) => existing,
            Err(LedgerError::Json { key, source }) => {
                tracing::warn!(key = %key, error = %source, "ledger: stored profile unreadable, replacing");
                None
            }
            Err(e) => return Err(e),
        };

        let complete = is_complete(&new);
        let merged = merge(new, existing.as_ref(), now);
        let body = serde_json::to_vec_pretty(&merged).map_err(|source| LedgerError::Json {
            key: key.clone(),
            source,
        })?;
        self.store
            .put(&key, Bytes::from(body), PutOptions::json())
            .await?;

        tracing::info!(
            platform = %platform,
            subject = %merged.subject,
            complete,
            had_existing = existing.is_some(),
            "ledger: profile reconciled"
        );
        Ok(merged)
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
