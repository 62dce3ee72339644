//! Shared domain types and configuration for the scoutq workspace.

pub mod app_config;
pub mod config;
pub mod keys;
pub mod platform;
pub mod profile;
pub mod task;
pub mod timestamp;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, S3Settings, StoreBackend};
pub use config::{load_app_config, load_app_config_from_env};
pub use platform::{parse_platform_list, Platform};
pub use profile::{BusinessFields, ProfileRecord};
pub use task::{TaskRecord, TaskStatus};
pub use timestamp::{format_timestamp, parse_timestamp};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),
    #[error("invalid subject \"{subject}\": {reason}")]
    InvalidSubject { subject: String, reason: &'static str },
    #[error("invalid profile payload: {0}")]
    InvalidProfile(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
