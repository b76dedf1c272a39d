//! Configuration Loader
//!
//! Environment-aware layering on top of the `config` crate: compiled-in
//! defaults, then the base file, then the environment override file, then
//! environment variables.

use super::error::ConfigResult;
use super::EngineConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of environment variable overrides, e.g. `WORKFLOW__RETRY__MAX_ATTEMPTS=5`
pub const ENV_PREFIX: &str = "WORKFLOW";

const BASE_FILE: &str = "workflow.toml";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment instead of reading `WORKFLOW_ENV`
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layered(config_dir, environment, ENV_PREFIX)
    }

    /// Full layering with a caller-chosen environment variable prefix
    pub fn load_layered(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading engine configuration"
        );

        let config = Self::build(&config_directory, environment, env_prefix)?;
        config.validate()?;

        info!(
            environment = %environment,
            step_budget = config.step_budget,
            max_steps_per_tick = config.max_steps_per_tick,
            max_attempts = config.retry.max_attempts,
            circuit_breaker = config.circuit_breaker.enabled,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build(directory: &Path, environment: &str, env_prefix: &str) -> ConfigResult<EngineConfig> {
        let base = directory.join(BASE_FILE);
        let overrides = directory.join(format!("{environment}.toml"));

        let settings = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(
                File::from(base.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                File::from(overrides.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "test"
    }

    /// `WORKFLOW_ENV`, then `APP_ENV`, then `development`
    pub fn detect_environment() -> String {
        env::var("WORKFLOW_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("WORKFLOW_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_falls_back_to_defaults() {
        let manager = ConfigManager::load_layered(
            Some(PathBuf::from("/nonexistent/workflow-config")),
            "test",
            "WORKFLOW_LOADER_UNIT_UNUSED",
        )
        .unwrap();

        assert_eq!(manager.config(), &EngineConfig::default());
        assert!(manager.is_test_environment());
    }
}
