//! Typed TierRoute configuration

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tierroute_core::{Error, Result, RouteKey};
use tierroute_observability::LoggingConfig;
use tierroute_routing::FailoverConfig;
use tracing::{error, warn};

/// File formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is YAML
    pub fn from_path(path: &Path) -> Self {
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            ConfigFormat::Toml
        } else {
            ConfigFormat::Yaml
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierrouteConfig {
    #[serde(default)]
    pub failover: FailoverConfig,

    /// Upstream address per route
    #[serde(default)]
    pub targets: BTreeMap<RouteKey, TargetConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// `host:port` of the upstream
    pub address: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl TargetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Seconds between background probes of the primary
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store, `~` is expanded
    #[serde(default = "default_storage_root")]
    pub root: String,

    #[serde(default = "default_marker_suffix")]
    pub marker_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            marker_suffix: default_marker_suffix(),
        }
    }
}

impl StorageConfig {
    pub fn root_path(&self) -> Result<PathBuf> {
        expand_tilde(Path::new(&self.root))
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1:9464".to_string()
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_storage_root() -> String {
    "~/.tierroute/objects".to_string()
}

fn default_marker_suffix() -> String {
    "certificate.pem".to_string()
}

/// Replace a leading `~` with the home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?
            .join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl TierrouteConfig {
    /// Load configuration from a file, choosing the format by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            error!("Failed to read config file {:?}: {}", path, e);
            Error::Io(e)
        })?;

        Self::parse(&contents, ConfigFormat::from_path(path))
    }

    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(contents)
                .map_err(|e| Error::Config(format!("Invalid TOML: {}", e))),
            ConfigFormat::Yaml => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("Invalid YAML: {}", e))),
        }
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("TIERROUTE_FAILURE_THRESHOLD") {
            match val.parse::<i32>() {
                Ok(threshold) => self.failover.failure_threshold = threshold,
                Err(_) => warn!("Invalid TIERROUTE_FAILURE_THRESHOLD '{}', ignoring", val),
            }
        }

        if let Ok(val) = std::env::var("TIERROUTE_BLOCK_DURATION_MS") {
            match val.parse::<u64>() {
                Ok(millis) => self.failover.block_duration_ms = millis,
                Err(_) => warn!("Invalid TIERROUTE_BLOCK_DURATION_MS '{}', ignoring", val),
            }
        }

        if let Ok(val) = std::env::var("TIERROUTE_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("TIERROUTE_LOG_JSON")
            && let Ok(json) = val.parse::<bool>()
        {
            self.logging.json = json;
        }

        if let Ok(val) = std::env::var("TIERROUTE_HEALTH_BIND") {
            self.health.bind_address = val;
        }
    }

    /// Semantic checks, returning every problem found
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = match self.failover.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if !self.targets.contains_key(&RouteKey::Primary) {
            errors.push("targets.primary is required".to_string());
        }

        if !self
            .failover
            .fallback_routes
            .iter()
            .any(|route| self.targets.contains_key(route))
        {
            errors.push(
                "at least one of failover.fallback_routes needs an entry in targets".to_string(),
            );
        }

        for (route, target) in &self.targets {
            if !is_host_port(&target.address) {
                errors.push(format!(
                    "targets.{}.address '{}' is not host:port",
                    route, target.address
                ));
            }
            if target.connect_timeout_ms == 0 {
                errors.push(format!("targets.{}.connect_timeout_ms must be > 0", route));
            }
        }

        if self.logging.parse_level().is_none() {
            errors.push(format!("logging.level '{}' is unknown", self.logging.level));
        }

        if self.health.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "health.bind_address '{}' is not a socket address",
                self.health.bind_address
            ));
        }

        if self.health.probe_interval_secs == 0 {
            errors.push("health.probe_interval_secs must be > 0".to_string());
        }

        if self.storage.marker_suffix.is_empty() {
            errors.push("storage.marker_suffix must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one error
    pub fn validated(self) -> Result<Self> {
        match self.validate() {
            Ok(()) => Ok(self),
            Err(errors) => Err(Error::ConfigValidation(errors.join("; "))),
        }
    }
}

fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p != 0),
        None => false,
    }
}
