use crate::collectors::disks::{DiskLimits, GIB};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MIN_TOOL_TIMEOUT: Duration = Duration::from_millis(1);
const MAX_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_http_enabled")]
    pub http_enabled: bool,
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    Windows,
    Linux,
    Generic,
}

impl BackendKind {
    /// Maps `Auto` to the backend for the OS this binary was built for.
    pub fn resolve(self) -> Self {
        match self {
            BackendKind::Auto if cfg!(target_os = "windows") => BackendKind::Windows,
            BackendKind::Auto if cfg!(target_os = "linux") => BackendKind::Linux,
            BackendKind::Auto => BackendKind::Generic,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_battery_timeout")]
    pub battery_timeout: String,
    #[serde(default = "default_short_timeout")]
    pub thermal_timeout: String,
    #[serde(default = "default_short_timeout")]
    pub sensors_timeout: String,
    #[serde(default = "default_short_timeout")]
    pub disk_annotate_timeout: String,
    #[serde(default = "default_short_timeout")]
    pub disk_io_timeout: String,
    #[serde(default = "default_short_timeout")]
    pub memory_timeout: String,
    #[serde(default = "default_max_disks")]
    pub max_disks: usize,
    #[serde(default = "default_min_disk_bytes")]
    pub min_disk_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval_secs: default_interval_secs(),
            http_enabled: default_http_enabled(),
            collector: CollectorConfig::default(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            battery_timeout: default_battery_timeout(),
            thermal_timeout: default_short_timeout(),
            sensors_timeout: default_short_timeout(),
            disk_annotate_timeout: default_short_timeout(),
            disk_io_timeout: default_short_timeout(),
            memory_timeout: default_short_timeout(),
            max_disks: default_max_disks(),
            min_disk_bytes: default_min_disk_bytes(),
        }
    }
}

impl CollectorConfig {
    pub fn disk_limits(&self) -> DiskLimits {
        DiskLimits {
            max_disks: self.max_disks,
            min_total_bytes: self.min_disk_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    pub battery: Duration,
    pub thermal: Duration,
    pub sensors: Duration,
    pub disk_annotate: Duration,
    pub disk_io: Duration,
    pub memory: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            battery: Duration::from_secs(3),
            thermal: Duration::from_secs(2),
            sensors: Duration::from_secs(2),
            disk_annotate: Duration::from_secs(2),
            disk_io: Duration::from_secs(2),
            memory: Duration::from_secs(2),
        }
    }
}

impl ToolTimeouts {
    pub fn from_config(cfg: &CollectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            battery: parse_timeout("collector.battery_timeout", &cfg.battery_timeout)?,
            thermal: parse_timeout("collector.thermal_timeout", &cfg.thermal_timeout)?,
            sensors: parse_timeout("collector.sensors_timeout", &cfg.sensors_timeout)?,
            disk_annotate: parse_timeout(
                "collector.disk_annotate_timeout",
                &cfg.disk_annotate_timeout,
            )?,
            disk_io: parse_timeout("collector.disk_io_timeout", &cfg.disk_io_timeout)?,
            memory: parse_timeout("collector.memory_timeout", &cfg.memory_timeout)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path_display,
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document; treat it as all defaults.
        let cfg: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }

        validate_collector(&self.collector)?;

        Ok(())
    }

    pub fn tool_timeouts(&self) -> Result<ToolTimeouts, ConfigError> {
        ToolTimeouts::from_config(&self.collector)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_collector(cfg: &CollectorConfig) -> Result<(), ConfigError> {
    ToolTimeouts::from_config(cfg)?;
    if cfg.max_disks < 1 {
        return Err(ConfigError::Validation(
            "collector.max_disks must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn parse_timeout(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let timeout = humantime::parse_duration(value.trim()).map_err(|err| {
        ConfigError::Validation(format!("{field} '{value}' is not a valid duration: {err}"))
    })?;
    if !(MIN_TOOL_TIMEOUT..=MAX_TOOL_TIMEOUT).contains(&timeout) {
        return Err(ConfigError::Validation(format!(
            "{field} must be between 1ms and 60s"
        )));
    }
    Ok(timeout)
}

fn default_listen() -> String {
    "127.0.0.1:9110".to_string()
}

const fn default_interval_secs() -> u64 {
    2
}

const fn default_http_enabled() -> bool {
    true
}

fn default_battery_timeout() -> String {
    "3s".to_string()
}

fn default_short_timeout() -> String {
    "2s".to_string()
}

const fn default_max_disks() -> usize {
    3
}

const fn default_min_disk_bytes() -> u64 {
    GIB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = Config::from_yaml("").unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9110");
        assert_eq!(cfg.interval_secs, 2);
        assert!(cfg.http_enabled);
        assert_eq!(cfg.collector.backend, BackendKind::Auto);
        assert_eq!(cfg.tool_timeouts().unwrap(), ToolTimeouts::default());
        assert_eq!(cfg.collector.disk_limits(), DiskLimits::default());
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = Config::from_yaml(Config::example_yaml()).unwrap();
        assert_eq!(cfg.tool_timeouts().unwrap(), ToolTimeouts::default());
    }

    #[test]
    fn partial_collector_section() {
        let cfg = Config::from_yaml(
            "interval_secs: 5\ncollector:\n  backend: linux\n  battery_timeout: 750ms\n  max_disks: 5\n",
        )
        .unwrap();
        assert_eq!(cfg.interval_secs, 5);
        assert_eq!(cfg.collector.backend, BackendKind::Linux);
        let timeouts = cfg.tool_timeouts().unwrap();
        assert_eq!(timeouts.battery, Duration::from_millis(750));
        assert_eq!(timeouts.thermal, Duration::from_secs(2));
        assert_eq!(cfg.collector.disk_limits().max_disks, 5);
    }

    #[test]
    fn rejects_bad_listen_and_interval() {
        let mut cfg = Config::default();
        cfg.listen = "localhost".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = Config::default();
        cfg.interval_secs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_out_of_range_timeouts() {
        for bad in ["0s", "2m", "soon"] {
            let mut cfg = Config::default();
            cfg.collector.memory_timeout = bad.to_string();
            assert!(
                matches!(cfg.validate(), Err(ConfigError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_max_disks() {
        let mut cfg = Config::default();
        cfg.collector.max_disks = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let err = Config::from_yaml("collector:\n  backend: solaris\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn auto_backend_resolves_to_concrete_kind() {
        assert_ne!(BackendKind::Auto.resolve(), BackendKind::Auto);
        assert_eq!(BackendKind::Generic.resolve(), BackendKind::Generic);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load_from_file("/nonexistent/hostpulse.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
