use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

pub mod app;
pub mod limits;
pub mod servicebus;
pub mod validation;

pub use app::{AppConfig, ListenerConfig};
pub use servicebus::{DestinationsConfig, ServicebusConfig};
pub use validation::{ConfigError, ConfigValidationError};

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Loads `path` (when present) overlaid with `SECTION__KEY` environment
/// variables and `.env`, then validates the result.
///
/// A missing file is only an error when `required` is set, so the binary runs
/// on environment variables alone.
pub fn load_config(path: &Path, required: bool) -> Result<AppConfig, ConfigError> {
    dotenv::dotenv().ok();
    load_config_with_env(path, required, Environment::default().separator("__"))
}

/// [`load_config`] with an explicit environment source.
pub fn load_config_with_env(
    path: &Path,
    required: bool,
    env_source: Environment,
) -> Result<AppConfig, ConfigError> {
    let file_source = File::from(path)
        .format(FileFormat::Toml)
        .required(required);

    let config = Config::builder()
        .add_source(file_source)
        .add_source(env_source) // environment entries override file values
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate().map_err(ConfigError::Validation)?;

    log::debug!("Loaded configuration from {}", path.display());
    Ok(app_config)
}

/// Additional logging configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    level: Option<String>,
    file: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref().filter(|f| !f.trim().is_empty())
    }
}
