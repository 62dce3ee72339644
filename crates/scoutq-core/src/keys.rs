//! Object key layout shared by the ledger, the worker and the CLI.
//!
//! ```text
//! AccountInfo/<platform>/<subject>/info.json          task record
//! ProfileInfo/<platform>/<subject>.json               reconciled profile
//! <kind>/<platform>/<subject>/<kind>_<seq>.json       sequenced artifact
//! ```

use crate::{CoreError, Platform};

pub const TASK_ROOT: &str = "AccountInfo";
pub const PROFILE_ROOT: &str = "ProfileInfo";
pub const TASK_FILE_NAME: &str = "info.json";

/// Reject subjects that would escape or collapse their key segment.
///
/// # Errors
///
/// Returns [`CoreError::InvalidSubject`] for empty subjects or subjects
/// containing `/`.
pub fn validate_subject(subject: &str) -> Result<(), CoreError> {
    let reason = if subject.trim().is_empty() {
        "subject is empty"
    } else if subject.contains('/') {
        "subject contains '/'"
    } else if subject == "." || subject == ".." {
        "subject is a relative path segment"
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidSubject {
        subject: subject.to_string(),
        reason,
    })
}

#[must_use]
pub fn task_prefix(platform: Platform) -> String {
    format!("{TASK_ROOT}/{platform}/")
}

#[must_use]
pub fn task_key(platform: Platform, subject: &str) -> String {
    format!("{TASK_ROOT}/{platform}/{subject}/{TASK_FILE_NAME}")
}

/// Split a task key into its platform and subject.
///
/// Returns `None` unless the key is exactly
/// `AccountInfo/<known platform>/<subject>/info.json`.
#[must_use]
pub fn parse_task_key(key: &str) -> Option<(Platform, String)> {
    let mut parts = key.split('/');
    let root = parts.next()?;
    let platform = parts.next()?;
    let subject = parts.next()?;
    let file = parts.next()?;
    if parts.next().is_some() || root != TASK_ROOT || file != TASK_FILE_NAME || subject.is_empty()
    {
        return None;
    }
    let platform = platform.parse::<Platform>().ok()?;
    Some((platform, subject.to_string()))
}

#[must_use]
pub fn profile_key(platform: Platform, subject: &str) -> String {
    format!("{PROFILE_ROOT}/{platform}/{subject}.json")
}

/// Directory holding every artifact of one family for one subject.
#[must_use]
pub fn artifact_dir(kind: &str, platform: Platform, subject: &str) -> String {
    format!("{kind}/{platform}/{subject}/")
}

#[must_use]
pub fn artifact_file_name(kind: &str, sequence: u64) -> String {
    format!("{kind}_{sequence}.json")
}

/// Extract `N` from a file name of the form `<kind>_<N>.json`.
///
/// Any leading directory components are ignored. Names of other families,
/// non-numeric suffixes and `0` yield `None`.
#[must_use]
pub fn parse_artifact_sequence(key: &str, kind: &str) -> Option<u64> {
    let file_name = key.rsplit('/').next()?;
    let digits = file_name
        .strip_prefix(kind)?
        .strip_prefix('_')?
        .strip_suffix(".json")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_key_roundtrip() {
        let key = task_key(Platform::Twitter, "acme");
        assert_eq!(key, "AccountInfo/twitter/acme/info.json");
        assert_eq!(
            parse_task_key(&key),
            Some((Platform::Twitter, "acme".to_string()))
        );
    }

    #[test]
    fn parse_task_key_rejects_other_layouts() {
        assert!(parse_task_key("AccountInfo/twitter/acme/other.json").is_none());
        assert!(parse_task_key("AccountInfo/twitter/acme/").is_none());
        assert!(parse_task_key("AccountInfo/myspace/acme/info.json").is_none());
        assert!(parse_task_key("ProfileInfo/twitter/acme/info.json").is_none());
        assert!(parse_task_key("AccountInfo/twitter/a/b/info.json").is_none());
    }

    #[test]
    fn profile_and_artifact_keys() {
        assert_eq!(
            profile_key(Platform::Instagram, "acme"),
            "ProfileInfo/instagram/acme.json"
        );
        assert_eq!(
            artifact_dir("recommendation", Platform::Twitter, "acme"),
            "recommendation/twitter/acme/"
        );
        assert_eq!(artifact_file_name("recommendation", 7), "recommendation_7.json");
    }

    #[test]
    fn parses_artifact_sequence_numbers() {
        assert_eq!(
            parse_artifact_sequence("recommendation/twitter/acme/recommendation_12.json", "recommendation"),
            Some(12)
        );
        assert_eq!(parse_artifact_sequence("analysis_3.json", "analysis"), Some(3));
    }

    #[test]
    fn ignores_foreign_and_malformed_artifact_names() {
        assert_eq!(parse_artifact_sequence("analysis_3.json", "recommendation"), None);
        assert_eq!(parse_artifact_sequence("analysis_x.json", "analysis"), None);
        assert_eq!(parse_artifact_sequence("analysis_.json", "analysis"), None);
        assert_eq!(parse_artifact_sequence("analysis_3.txt", "analysis"), None);
        assert_eq!(parse_artifact_sequence("analysis_+3.json", "analysis"), None);
        assert_eq!(parse_artifact_sequence("analysis_0.json", "analysis"), None);
        assert_eq!(parse_artifact_sequence("pre_analysis_3.json", "analysis"), None);
    }

    #[test]
    fn subject_validation() {
        assert!(validate_subject("acme").is_ok());
        assert!(validate_subject("").is_err());
        assert!(validate_subject("a/b").is_err());
        assert!(validate_subject("..").is_err());
    }
}
