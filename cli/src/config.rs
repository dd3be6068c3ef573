use config::{Config, Environment, File};
use serde::Deserialize;
use server::config::{ConnectionConfig, ProcessorConfig};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration loading failed: {0}. Please check your config.toml file and environment variables.")]
    Load(String),
    #[error("Failed to deserialize config: {0}")]
    Deserialize(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    servicebus: ConnectionConfig,
    #[serde(default)]
    processor: ProcessorConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl AppConfig {
    pub fn servicebus(&self) -> &ConnectionConfig {
        &self.servicebus
    }

    pub fn processor(&self) -> &ProcessorConfig {
        &self.processor
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    level: Option<String>,
    file: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}

/// Loads `.env`, then the config file, then `SECTION__KEY` environment overrides.
///
/// An explicitly given file must exist; the default `config.toml` is optional.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigLoadError> {
    dotenv::dotenv().ok();

    let file_source = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config = Config::builder()
        .add_source(file_source)
        .add_source(Environment::default().separator("__"))
        .build()
        .map_err(|e| ConfigLoadError::Load(e.to_string()))?;

    parse(config)
}

fn parse(config: Config) -> Result<AppConfig, ConfigLoadError> {
    let mut app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigLoadError::Deserialize(e.to_string()))?;
    app_config.servicebus = app_config.servicebus.with_env_fallbacks();
    Ok(app_config)
}

/// Parses TOML text with no environment layering.
#[cfg(test)]
fn from_toml(text: &str) -> Result<AppConfig, ConfigLoadError> {
    let config = Config::builder()
        .add_source(File::from_str(text, config::FileFormat::Toml))
        .build()
        .map_err(|e| ConfigLoadError::Load(e.to_string()))?;
    parse(config)
}
