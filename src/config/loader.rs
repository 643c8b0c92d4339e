//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, and configuration merging: `base.yaml` first, then
//! `{environment}.yaml`, then `FORMSAPP_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::ConfigResult;
use super::FormsConfig;

/// Loads and owns the merged configuration for one embedding host
pub struct ConfigManager {
    config: FormsConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without touching global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let base = config_directory.join("base.yaml");
        let overlay = config_directory.join(format!("{environment}.yaml"));

        let config: FormsConfig = Config::builder()
            .add_source(File::from(base).format(FileFormat::Yaml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Yaml).required(false))
            .add_source(Environment::with_prefix("FORMSAPP").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(environment = %environment, "Configuration loaded successfully");

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &FormsConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &PathBuf {
        &self.config_directory
    }

    /// Detect the current environment from FORMSAPP_ENV or APP_ENV
    fn detect_environment() -> String {
        env::var("FORMSAPP_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }
}
