//! Root engine configuration and loaders.

use std::env::{self, VarError};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{ConnectionPoolConfig, QueueStrategy, WorkerPoolConfig};
use crate::core::AppResult;

/// Prefix for environment overrides, e.g. `TRANSFER_ENGINE_WORKERS=8`.
pub const ENV_PREFIX: &str = "TRANSFER_ENGINE_";

/// Root configuration for the worker pool and connection pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool settings.
    pub pool: WorkerPoolConfig,
    /// Connection pool settings.
    pub connections: ConnectionPoolConfig,
}

impl EngineConfig {
    /// Validate both sections.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field, prefixed with its section.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.connections
            .validate()
            .map_err(|e| format!("connections invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `TRANSFER_ENGINE_*`
    /// environment variables. A `.env` file is loaded first when present.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        override_from_env("WORKERS", &mut cfg.pool.workers)?;
        override_from_env("QUEUE_CAPACITY", &mut cfg.pool.queue_capacity)?;
        override_from_env("JOB_TIMEOUT_MS", &mut cfg.pool.job_timeout_ms)?;
        override_from_env("MAX_RETRIES", &mut cfg.pool.max_retries)?;
        override_from_env("RETRY_BASE_DELAY_MS", &mut cfg.pool.retry_base_delay_ms)?;
        override_from_env("RETRY_MAX_DELAY_MS", &mut cfg.pool.retry_max_delay_ms)?;
        if let Some(raw) = read_env("QUEUE_STRATEGY")? {
            cfg.pool.queue_strategy =
                serde_json::from_value::<QueueStrategy>(serde_json::Value::String(raw.clone()))
                    .with_context(|| format!("{ENV_PREFIX}QUEUE_STRATEGY={raw} is not a strategy"))?;
        }
        override_from_env("MIN_CONNECTIONS", &mut cfg.connections.min_connections)?;
        override_from_env("MAX_CONNECTIONS", &mut cfg.connections.max_connections)?;
        override_from_env("CHECK_INTERVAL_MS", &mut cfg.connections.check_interval_ms)?;
        override_from_env("MAX_IDLE_TIME_MS", &mut cfg.connections.max_idle_time_ms)?;
        override_from_env("MAX_LIFETIME_MS", &mut cfg.connections.max_lifetime_ms)?;

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn read_env(name: &str) -> AppResult<Option<String>> {
    let key = format!("{ENV_PREFIX}{name}");
    match env::var(&key) {
        Ok(raw) => Ok(Some(raw.trim().to_string())),
        Err(VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow::Error::new(err).context(key)),
    }
}

fn override_from_env<T>(name: &str, target: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = read_env(name)? {
        *target = raw
            .parse()
            .with_context(|| format!("{ENV_PREFIX}{name}={raw} is not valid"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "pool": { "workers": 3, "queue_strategy": "work_stealing" } }"#,
        )
        .expect("valid config");
        assert_eq!(cfg.pool.workers, 3);
        assert_eq!(cfg.pool.queue_strategy, QueueStrategy::WorkStealing);
        assert_eq!(cfg.connections, ConnectionPoolConfig::default());
    }

    #[test]
    fn test_json_validation_error_names_section() {
        let err = EngineConfig::from_json_str(
            r#"{ "connections": { "min_connections": 9, "max_connections": 3 } }"#,
        )
        .expect_err("min above max");
        assert!(err.starts_with("connections invalid"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(EngineConfig::from_json_str("{ not json").is_err());
    }
}
