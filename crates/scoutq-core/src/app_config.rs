use std::time::Duration;

use crate::Platform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Connection settings for an S3-compatible bucket (AWS S3, Cloudflare R2).
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[redacted]")
            .finish()
    }
}

/// Which object store backs the ledger.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-process store; contents vanish on exit. Useful for dry runs.
    Memory,
    S3(S3Settings),
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub store: StoreBackend,
    pub store_request_timeout_secs: u64,
    pub store_max_retries: u32,
    pub store_retry_backoff_base_ms: u64,
    pub platforms: Vec<Platform>,
    pub idle_backoff_secs: u64,
    pub busy_backoff_secs: u64,
    /// `0` disables lease reclamation.
    pub lease_secs: u64,
    pub max_attempts: u32,
    pub reap_namespaces: Vec<String>,
    pub reap_interval_secs: u64,
    /// `0` writes artifacts without an expiry.
    pub artifact_ttl_hours: u64,
    pub processor_url: Option<String>,
    pub processor_timeout_secs: u64,
}

impl AppConfig {
    #[must_use]
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    #[must_use]
    pub fn busy_backoff(&self) -> Duration {
        Duration::from_secs(self.busy_backoff_secs)
    }

    #[must_use]
    pub fn lease(&self) -> Option<Duration> {
        (self.lease_secs > 0).then(|| Duration::from_secs(self.lease_secs))
    }

    #[must_use]
    pub fn artifact_ttl(&self) -> Option<Duration> {
        (self.artifact_ttl_hours > 0).then(|| Duration::from_secs(self.artifact_ttl_hours * 3600))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("store", &self.store)
            .field(
                "store_request_timeout_secs",
                &self.store_request_timeout_secs,
            )
            .field("store_max_retries", &self.store_max_retries)
            .field(
                "store_retry_backoff_base_ms",
                &self.store_retry_backoff_base_ms,
            )
            .field("platforms", &self.platforms)
            .field("idle_backoff_secs", &self.idle_backoff_secs)
            .field("busy_backoff_secs", &self.busy_backoff_secs)
            .field("lease_secs", &self.lease_secs)
            .field("max_attempts", &self.max_attempts)
            .field("reap_namespaces", &self.reap_namespaces)
            .field("reap_interval_secs", &self.reap_interval_secs)
            .field("artifact_ttl_hours", &self.artifact_ttl_hours)
            .field("processor_url", &self.processor_url)
            .field("processor_timeout_secs", &self.processor_timeout_secs)
            .finish()
    }
}
