use crate::app_config::{AppConfig, Environment, S3Settings, StoreBackend};
use crate::platform::parse_platform_list;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let env = parse_environment(&or_default("SCOUTQ_ENV", "development"));
    let log_level = or_default("SCOUTQ_LOG_LEVEL", "info");

    let store = match or_default("SCOUTQ_STORE_BACKEND", "s3").trim() {
        "memory" => StoreBackend::Memory,
        "s3" | "r2" => StoreBackend::S3(S3Settings {
            endpoint: require("SCOUTQ_S3_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            bucket: require("SCOUTQ_S3_BUCKET")?,
            region: or_default("SCOUTQ_S3_REGION", "auto"),
            access_key_id: require("SCOUTQ_S3_ACCESS_KEY_ID")?,
            secret_access_key: require("SCOUTQ_S3_SECRET_ACCESS_KEY")?,
        }),
        other => {
            return Err(ConfigError::InvalidEnvVar {
                var: "SCOUTQ_STORE_BACKEND".to_string(),
                reason: format!("unknown backend \"{other}\" (expected s3 or memory)"),
            })
        }
    };

    let store_request_timeout_secs = parse_u64("SCOUTQ_STORE_REQUEST_TIMEOUT_SECS", "30")?;
    let store_max_retries = parse_u32("SCOUTQ_STORE_MAX_RETRIES", "3")?;
    let store_retry_backoff_base_ms = parse_u64("SCOUTQ_STORE_RETRY_BACKOFF_BASE_MS", "500")?;

    let platforms = parse_platform_list(&or_default("SCOUTQ_PLATFORMS", "twitter,instagram"))
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: "SCOUTQ_PLATFORMS".to_string(),
            reason: e.to_string(),
        })?;

    let idle_backoff_secs = parse_u64("SCOUTQ_IDLE_BACKOFF_SECS", "300")?;
    let busy_backoff_secs = parse_u64("SCOUTQ_BUSY_BACKOFF_SECS", "10")?;
    if busy_backoff_secs > idle_backoff_secs {
        return Err(ConfigError::InvalidEnvVar {
            var: "SCOUTQ_BUSY_BACKOFF_SECS".to_string(),
            reason: format!(
                "busy back-off ({busy_backoff_secs}s) must not exceed idle back-off ({idle_backoff_secs}s)"
            ),
        });
    }

    let lease_secs = parse_u64("SCOUTQ_LEASE_SECS", "3600")?;
    let max_attempts = parse_u32("SCOUTQ_MAX_ATTEMPTS", "3")?;

    let reap_namespaces = or_default("SCOUTQ_REAP_NAMESPACES", "")
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string)
        .collect();
    let reap_interval_secs = parse_u64("SCOUTQ_REAP_INTERVAL_SECS", "3600")?;
    let artifact_ttl_hours = parse_u64("SCOUTQ_ARTIFACT_TTL_HOURS", "0")?;

    let processor_url = lookup("SCOUTQ_PROCESSOR_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let processor_timeout_secs = parse_u64("SCOUTQ_PROCESSOR_TIMEOUT_SECS", "1800")?;

    Ok(AppConfig {
        env,
        log_level,
        store,
        store_request_timeout_secs,
        store_max_retries,
        store_retry_backoff_base_ms,
        platforms,
        idle_backoff_secs,
        busy_backoff_secs,
        lease_secs,
        max_attempts,
        reap_namespaces,
        reap_interval_secs,
        artifact_ttl_hours,
        processor_url,
        processor_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
