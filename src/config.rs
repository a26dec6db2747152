//! Controller configuration from environment variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `MESHSPLIT_MESH_PROVIDER` | `istio` |
//! | `MESHSPLIT_HEALTH_PORT` | `8080` |
//! | `MESHSPLIT_CONFLICT_RETRIES` | `5` |
//! | `MESHSPLIT_OPERATION_TIMEOUT_SECS` | `30` |
//! | `MESHSPLIT_WATCH_NAMESPACE` | all namespaces |
//!
//! Log filtering is left to `RUST_LOG`.

use crate::router::retry::{
    CallLimits, RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_OPERATION_TIMEOUT,
};
use crate::router::MeshProvider;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Interval between periodic resyncs of a healthy Canary
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub mesh_provider: MeshProvider,
    pub health_port: u16,
    pub retry: RetryPolicy,
    pub operation_timeout: Duration,
    /// Restrict the Canary watch to one namespace
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mesh_provider: MeshProvider::default(),
            health_port: DEFAULT_HEALTH_PORT,
            retry: RetryPolicy::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mesh_provider = parse(
            "MESHSPLIT_MESH_PROVIDER",
            get("MESHSPLIT_MESH_PROVIDER"),
            MeshProvider::default(),
        )?;
        let health_port = parse(
            "MESHSPLIT_HEALTH_PORT",
            get("MESHSPLIT_HEALTH_PORT"),
            DEFAULT_HEALTH_PORT,
        )?;
        let max_attempts: u32 = parse(
            "MESHSPLIT_CONFLICT_RETRIES",
            get("MESHSPLIT_CONFLICT_RETRIES"),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "MESHSPLIT_CONFLICT_RETRIES",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        let timeout_secs: u64 = parse(
            "MESHSPLIT_OPERATION_TIMEOUT_SECS",
            get("MESHSPLIT_OPERATION_TIMEOUT_SECS"),
            DEFAULT_OPERATION_TIMEOUT.as_secs(),
        )?;

        Ok(Self {
            mesh_provider,
            health_port,
            retry: RetryPolicy {
                max_attempts,
                backoff: DEFAULT_BACKOFF,
            },
            operation_timeout: Duration::from_secs(timeout_secs),
            watch_namespace: get("MESHSPLIT_WATCH_NAMESPACE"),
        })
    }

    /// Router call limits without a cancellation signal attached
    pub fn call_limits(&self) -> CallLimits {
        CallLimits {
            retry: self.retry,
            timeout: self.operation_timeout,
            cancel: None,
        }
    }
}

fn parse<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ControllerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(config_from(&[]).unwrap(), ControllerConfig::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("MESHSPLIT_MESH_PROVIDER", "Istio"),
            ("MESHSPLIT_HEALTH_PORT", "9090"),
            ("MESHSPLIT_CONFLICT_RETRIES", "8"),
            ("MESHSPLIT_OPERATION_TIMEOUT_SECS", "5"),
            ("MESHSPLIT_WATCH_NAMESPACE", "apps"),
        ])
        .unwrap();

        assert_eq!(config.mesh_provider, MeshProvider::Istio);
        assert_eq!(config.health_port, 9090);
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.watch_namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("MESHSPLIT_HEALTH_PORT", "  "),
            ("MESHSPLIT_WATCH_NAMESPACE", ""),
        ])
        .unwrap();

        assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = config_from(&[("MESHSPLIT_MESH_PROVIDER", "linkerd")]).unwrap_err();
        assert!(err.to_string().contains("MESHSPLIT_MESH_PROVIDER"));
        assert!(err.to_string().contains("unsupported mesh provider"));
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        assert!(config_from(&[("MESHSPLIT_HEALTH_PORT", "http")]).is_err());
        assert!(config_from(&[("MESHSPLIT_CONFLICT_RETRIES", "0")]).is_err());
        assert!(config_from(&[("MESHSPLIT_OPERATION_TIMEOUT_SECS", "-1")]).is_err());
    }

    #[test]
    fn test_call_limits_follow_config() {
        let config = config_from(&[("MESHSPLIT_OPERATION_TIMEOUT_SECS", "7")]).unwrap();
        let limits = config.call_limits();

        assert_eq!(limits.timeout, Duration::from_secs(7));
        assert_eq!(limits.retry, config.retry);
        assert!(limits.cancel.is_none());
    }
}
