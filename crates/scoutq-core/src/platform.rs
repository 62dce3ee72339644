use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A social platform whose accounts the worker ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Instagram,
}

impl Platform {
    /// Every supported platform, in default scheduling priority.
    pub const ALL: [Platform; 2] = [Platform::Twitter, Platform::Instagram];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            other => Err(CoreError::InvalidPlatform(other.to_string())),
        }
    }
}

/// Parse a comma-separated priority list such as `"twitter,instagram"`.
///
/// Order is preserved and duplicates are dropped after their first
/// occurrence, so `"instagram,twitter,instagram"` yields
/// `[Instagram, Twitter]`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPlatform`] for an unknown entry or when the
/// list contains no platforms at all.
pub fn parse_platform_list(raw: &str) -> Result<Vec<Platform>, CoreError> {
    let mut platforms = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let platform = entry.parse::<Platform>()?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    if platforms.is_empty() {
        return Err(CoreError::InvalidPlatform(raw.to_string()));
    }
    Ok(platforms)
}
