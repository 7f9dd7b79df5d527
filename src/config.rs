//! Configuration for the ledger server and the runner.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Ledger server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, host:port.
    pub bind_addr: String,
    /// Path of the local database file.
    pub db_path: PathBuf,
    /// Age at which a running job with a silent consumer is requeued.
    /// `None` disables the stale sweep entirely.
    pub requeue_after: Option<Duration>,
    /// How often the stale sweep runs when enabled.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8700".to_string(),
            db_path: PathBuf::from("./data/simq.db"),
            requeue_after: None,
            sweep_interval: Duration::from_secs(60), // 1 minute
        }
    }
}

impl ServerConfig {
    /// Read configuration from `SIMQ_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: std::env::var("SIMQ_BIND").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("SIMQ_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            requeue_after: optional_secs("SIMQ_REQUEUE_AFTER_SECS")?,
            sweep_interval: secs_or("SIMQ_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
        })
    }
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL of the ledger server.
    pub ledger_url: String,
    /// Base URL of the execution engine.
    pub engine_url: String,
    /// How often to poll for a claimable job.
    pub poll_interval: Duration,
    /// Upper bound on a single engine dispatch.
    pub dispatch_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ledger_url: "http://127.0.0.1:8700".to_string(),
            engine_url: "http://127.0.0.1:5000".to_string(),
            poll_interval: Duration::from_secs(5),
            dispatch_timeout: Duration::from_secs(1800), // 30 minutes; solver runs are long
        }
    }
}

impl RunnerConfig {
    /// Read configuration from `SIMQ_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            ledger_url: std::env::var("SIMQ_URL").unwrap_or(defaults.ledger_url),
            engine_url: std::env::var("SIMQ_ENGINE_URL").unwrap_or(defaults.engine_url),
            poll_interval: secs_or("SIMQ_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            dispatch_timeout: secs_or("SIMQ_DISPATCH_TIMEOUT_SECS", defaults.dispatch_timeout)?,
        })
    }
}

/// Seconds-valued env var with a default when unset.
fn secs_or(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => Ok(Duration::from_secs(parse_secs(key, &raw)?)),
        Err(_) => Ok(default),
    }
}

/// Seconds-valued env var that may be absent; absent means disabled.
fn optional_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => Ok(Some(Duration::from_secs(parse_secs(key, &raw)?))),
        Err(_) => Ok(None),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a number of seconds, got {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8700");
        assert_eq!(config.db_path, PathBuf::from("./data/simq.db"));
        assert!(config.requeue_after.is_none());
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn runner_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn seconds_parsing_rejects_garbage() {
        assert_eq!(parse_secs("SIMQ_POLL_INTERVAL_SECS", "5").unwrap(), 5);

        let err = parse_secs("SIMQ_POLL_INTERVAL_SECS", "soon").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "SIMQ_POLL_INTERVAL_SECS");
                assert!(message.contains("soon"));
            }
        }
    }
}
