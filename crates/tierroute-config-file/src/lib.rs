//! File-based configuration for TierRoute deployments
//!
//! This crate loads the typed TierRoute configuration from a YAML or TOML
//! file, applies `TIERROUTE_*` environment overrides and validates the
//! result. [`FileConfigStore`] also watches the file and yields freshly
//! loaded configurations for hot reload.
//!
//! # Example
//! ```no_run
//! # use tierroute_config_file::FileConfigStore;
//! # async fn example() -> tierroute_core::Result<()> {
//! let store = FileConfigStore::new("~/.tierroute/config.yaml").await?;
//! let config = store.load()?;
//! println!("primary threshold: {}", config.failover.failure_threshold);
//! # Ok(())
//! # }
//! ```

mod config;
mod file_store;

pub use config::{
    ConfigFormat, HealthConfig, StorageConfig, TargetConfig, TierrouteConfig, expand_tilde,
};
pub use file_store::{ConfigReload, ConfigReloadStream, FileConfigStore};
