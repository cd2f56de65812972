//! poolgrid.toml configuration parser.
//!
//! Every section and field is optional; omitted values fall back to the
//! defaults the controller has always shipped with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolgridConfig {
    pub controller: ControllerConfig,
    pub convergence: ConvergenceConfig,
    pub autoscaler: AutoscalerConfig,
    pub fleet_manager: FleetManagerConfig,
    pub rollout: RolloutConfig,
    pub status: StatusConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Workers reconciled in parallel.
    pub max_concurrent_reconciles: usize,
    /// How often every known worker is re-enqueued.
    #[serde(with = "duration_str")]
    pub resync_interval: Duration,
    /// Requeue delay after an ordinary reconcile failure.
    #[serde(with = "duration_str")]
    pub error_requeue: Duration,
    /// Requeue delay after the convergence wait timed out.
    #[serde(with = "duration_str")]
    pub timeout_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 5,
            resync_interval: Duration::from_secs(60),
            error_requeue: Duration::from_secs(15),
            timeout_requeue: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Name of the autoscaler component deployment in the worker namespace.
    pub deployment_name: String,
    #[serde(with = "duration_str")]
    pub removal_poll_interval: Duration,
    #[serde(with = "duration_str")]
    pub removal_timeout: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            deployment_name: "cluster-autoscaler".to_string(),
            removal_poll_interval: Duration::from_secs(5),
            removal_timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetManagerConfig {
    pub deployment_name: String,
}

impl Default for FleetManagerConfig {
    fn default() -> Self {
        Self {
            deployment_name: "machine-controller-manager".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub min_ready_seconds: u32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            min_ready_seconds: 500,
        }
    }
}

/// Backoff for status writes that lose an optimistic-concurrency race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub retry_steps: u32,
    #[serde(with = "duration_str")]
    pub retry_initial: Duration,
    pub retry_factor: f64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            retry_steps: 4,
            retry_initial: Duration::from_millis(10),
            retry_factor: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Machine class kind written by the built-in static provider.
    pub class_kind: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            class_kind: "StaticMachineClass".to_string(),
        }
    }
}

impl PoolgridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PoolgridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.max_concurrent_reconciles == 0 {
            return Err(ConfigError::Invalid(
                "controller.max_concurrent_reconciles must be at least 1".to_string(),
            ));
        }
        if self.controller.resync_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "controller.resync_interval must be non-zero".to_string(),
            ));
        }
        if self.convergence.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "convergence.poll_interval must be non-zero".to_string(),
            ));
        }
        if self.autoscaler.removal_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "autoscaler.removal_poll_interval must be non-zero".to_string(),
            ));
        }
        let factor = self.status.retry_factor;
        if self.status.retry_steps == 0 || !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::Invalid(
                "status.retry_steps must be >= 1 and status.retry_factor >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a duration string like "500ms", "5s", "30m" or "1h".
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Invalid(format!("invalid duration: {s:?}"));

    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = number.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs).ok_or_else(invalid),
        "h" => value.checked_mul(3600).map(Duration::from_secs).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Render a duration in the largest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PoolgridConfig::from_toml_str("").unwrap();
        assert_eq!(config, PoolgridConfig::default());
        assert_eq!(config.controller.max_concurrent_reconciles, 5);
        assert_eq!(config.convergence.poll_interval, Duration::from_secs(5));
        assert_eq!(config.convergence.timeout, Duration::from_secs(1800));
        assert_eq!(config.rollout.min_ready_seconds, 500);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml_str = r#"
[controller]
max_concurrent_reconciles = 2

[convergence]
timeout = "10m"

[autoscaler]
deployment_name = "ca"
"#;
        let config = PoolgridConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.controller.max_concurrent_reconciles, 2);
        assert_eq!(config.controller.resync_interval, Duration::from_secs(60));
        assert_eq!(config.convergence.timeout, Duration::from_secs(600));
        assert_eq!(config.convergence.poll_interval, Duration::from_secs(5));
        assert_eq!(config.autoscaler.deployment_name, "ca");
        assert_eq!(config.autoscaler.removal_timeout, Duration::from_secs(300));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = PoolgridConfig::from_toml_str("[controller]\nmax_concurrent_reconciles = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_resync_interval() {
        let err = PoolgridConfig::from_toml_str("[controller]\nresync_interval = \"0s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_finite_retry_factor() {
        for value in ["nan", "inf", "0.5"] {
            let toml_str = format!("[status]\nretry_factor = {value}\n");
            let err = PoolgridConfig::from_toml_str(&toml_str).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "retry_factor = {value}");
        }
    }

    #[test]
    fn rejects_bad_duration() {
        let err = PoolgridConfig::from_toml_str("[convergence]\ntimeout = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("42").unwrap(), Duration::from_secs(42));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn parse_duration_overflow_is_an_error() {
        assert!(parse_duration("18446744073709551615h").is_err());
        assert!(parse_duration("18446744073709551615m").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn toml_round_trip_keeps_durations() {
        let config = PoolgridConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("timeout = \"30m\""));
        assert!(rendered.contains("retry_initial = \"10ms\""));
        let back = PoolgridConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(back, config);
    }
}
