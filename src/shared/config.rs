use std::fs;
use std::path::Path;

use crate::shared::errors::AppError;
use crate::shared::types::OrchestratorConfig;

/// Loads the orchestrator configuration from TOML
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the given file
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<OrchestratorConfig, AppError> {
        let config_content = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;

        Self::parse(&config_content)
    }

    /// Load `Config.toml` from the working directory, falling back to defaults when absent
    pub fn load_or_default() -> Result<OrchestratorConfig, AppError> {
        if Path::new("Config.toml").exists() {
            Self::load_config("Config.toml")
        } else {
            Ok(OrchestratorConfig::default())
        }
    }

    pub fn parse(raw: &str) -> Result<OrchestratorConfig, AppError> {
        toml::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))
    }
}
