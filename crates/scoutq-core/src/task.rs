//! Task records: the durable job descriptors stored under `AccountInfo/`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::timestamp::{self, parse_timestamp};

/// Lifecycle status of a task record.
///
/// `pending -> processing -> {processed, failed}`. Terminal states are never
/// left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Processed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Processed | TaskStatus::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Processed => "processed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `AccountInfo/<platform>/<subject>/info.json`.
///
/// Field names follow the submission format. Fields written back by the
/// ledger use `snake_case`. Any field this type does not model is kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub username: String,

    #[serde(rename = "accountType", default, deserialize_with = "null_as_empty")]
    pub account_type: String,

    #[serde(rename = "postingStyle", default, deserialize_with = "null_as_empty")]
    pub posting_style: String,

    #[serde(default, deserialize_with = "deserialize_competitors")]
    pub competitors: Vec<String>,

    /// Submission time as written by the submitter. Kept verbatim; see
    /// [`TaskRecord::created_at`] for the parsed value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_started_at: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of times an expired processing lease returned this record to
    /// `pending`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,

    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub reclaimed_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Build a fresh pending record as an external submitter would.
    #[must_use]
    pub fn new_pending(
        username: impl Into<String>,
        account_type: impl Into<String>,
        posting_style: impl Into<String>,
        competitors: Vec<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            account_type: account_type.into(),
            posting_style: posting_style.into(),
            competitors,
            timestamp: Some(timestamp::format_timestamp(submitted_at)),
            status: TaskStatus::Pending,
            ..Self::default()
        }
    }

    /// Parsed submission time, if the submitter wrote a recognisable one.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    /// `true` when the record cannot be dispatched: it has no subject (from
    /// either the key or the body) or no account type.
    #[must_use]
    pub fn missing_required_fields(&self, subject: &str) -> bool {
        let has_subject = !subject.trim().is_empty() || !self.username.trim().is_empty();
        !has_subject || self.account_type.trim().is_empty()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // signature dictated by serde
fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompetitorEntry {
    Name(String),
    Object { username: String },
    Other(Value),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompetitorsWire {
    List(Vec<CompetitorEntry>),
    Csv(String),
}

/// Accepts a list of names, a list of `{"username": ...}` objects, a single
/// comma-separated string, or null. Blank entries and unrecognised list
/// items are dropped.
fn deserialize_competitors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Option::<CompetitorsWire>::deserialize(deserializer)?;
    let names = match wire {
        None => Vec::new(),
        Some(CompetitorsWire::Csv(csv)) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(CompetitorsWire::List(entries)) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                CompetitorEntry::Name(name) | CompetitorEntry::Object { username: name } => {
                    let name = name.trim().to_string();
                    (!name.is_empty()).then_some(name)
                }
                CompetitorEntry::Other(_) => None,
            })
            .collect(),
    };
    Ok(names)
}
