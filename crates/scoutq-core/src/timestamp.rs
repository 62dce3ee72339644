//! Lenient ISO-8601 handling for timestamps written by external submitters.
//!
//! Task records arrive from several producers. Some write RFC 3339 with an
//! offset, others write a naive local `isoformat()` string. Naive values are
//! interpreted as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp, accepting both offset-qualified and naive forms.
///
/// Returns `None` for empty or unparseable input.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Format a timestamp the way every scoutq writer stamps records.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for optional timestamps that tolerates naive and malformed
/// input. Malformed values deserialize to `None` rather than failing the
/// whole record.
pub mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    ///
    /// Never fails for string or null input; other JSON types are rejected.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }

    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)] // signature dictated by serde's `with` attribute
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(*ts)),
            None => serializer.serialize_none(),
        }
    }
}
