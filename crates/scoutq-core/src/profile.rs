//! Profile snapshots stored under `ProfileInfo/<platform>/<subject>.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::timestamp;
use crate::{CoreError, Platform};

/// Business metadata some platforms expose for commercial accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessFields {
    #[serde(
        default,
        alias = "businessCategoryName",
        deserialize_with = "lenient_string"
    )]
    pub category_name: String,
    #[serde(default, alias = "isBusinessAccount", deserialize_with = "lenient_bool")]
    pub is_business_account: bool,
}

/// One structured snapshot of a platform account.
///
/// Upstream producers disagree on field names, so every field also accepts
/// the spellings the Instagram and Twitter extractors emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(rename = "username")]
    pub subject: String,

    pub platform: Platform,

    #[serde(default, alias = "fullName", alias = "name", deserialize_with = "lenient_string")]
    pub display_name: String,

    #[serde(default, alias = "bio", deserialize_with = "lenient_string")]
    pub biography: String,

    #[serde(
        default,
        alias = "followersCount",
        alias = "follower_count",
        alias = "followers_count",
        deserialize_with = "lenient_count"
    )]
    pub follower_count: u64,

    #[serde(
        default,
        alias = "followsCount",
        alias = "following_count",
        deserialize_with = "lenient_count"
    )]
    pub following_count: u64,

    #[serde(
        default,
        alias = "postsCount",
        alias = "tweet_count",
        alias = "mediaCount",
        deserialize_with = "lenient_count"
    )]
    pub post_count: u64,

    #[serde(
        default,
        alias = "website",
        alias = "external_url",
        deserialize_with = "lenient_string"
    )]
    pub external_url: String,

    #[serde(
        default,
        alias = "profilePicUrl",
        alias = "profile_image_url",
        deserialize_with = "lenient_string"
    )]
    pub avatar_url: String,

    #[serde(
        rename = "avatarUrlHD",
        default,
        alias = "profilePicUrlHD",
        deserialize_with = "lenient_string"
    )]
    pub avatar_url_hd: String,

    #[serde(default, alias = "isPrivate", deserialize_with = "lenient_bool")]
    pub private: bool,

    #[serde(default, alias = "isVerified", deserialize_with = "lenient_bool")]
    pub verified: bool,

    #[serde(default, alias = "account_type", deserialize_with = "lenient_string")]
    pub account_type: String,

    #[serde(default, alias = "posting_style", deserialize_with = "lenient_string")]
    pub posting_style: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_fields: Option<BusinessFields>,

    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub extracted_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// An empty snapshot for `subject` on `platform`.
    #[must_use]
    pub fn empty(platform: Platform, subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            platform,
            display_name: String::new(),
            biography: String::new(),
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            external_url: String::new(),
            avatar_url: String::new(),
            avatar_url_hd: String::new(),
            private: false,
            verified: false,
            account_type: String::new(),
            posting_style: String::new(),
            business_fields: None,
            extracted_at: None,
        }
    }

    /// Decode a snapshot produced by an upstream extractor.
    ///
    /// The extractor may omit `platform` and `username`; the task's values
    /// are filled in when absent. A `username` that is present wins, so the
    /// caller can detect a mismatched payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProfile`] if the payload is not an object
    /// or a field has an incompatible type.
    pub fn from_upstream(
        platform: Platform,
        subject: &str,
        mut payload: Value,
    ) -> Result<Self, CoreError> {
        if let Value::Object(map) = &mut payload {
            map.insert("platform".into(), Value::String(platform.as_str().into()));
            let has_username = map
                .get("username")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty());
            if !has_username {
                map.insert("username".into(), Value::String(subject.to_string()));
            }
        }
        Ok(serde_json::from_value(payload)?)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_u64().is_some_and(|v| v != 0),
        _ => false,
    })
}

/// Counts arrive as numbers, numeric strings, floats or null. Anything that
/// is not a non-negative number reads as `0` ("unknown").
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map_or(0, |f| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let truncated = f as u64;
                    truncated
                })
        }),
        Value::String(s) => s.trim().replace(',', "").parse::<u64>().unwrap_or(0),
        _ => 0,
    })
}
