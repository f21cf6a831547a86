use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Environment name that turns on detailed error responses
pub const DEVELOPMENT: &str = "development";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub cors_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| DEVELOPMENT.to_string());
        Self::load(&environment, Path::new("config"))
    }

    /// Load settings for `environment` from files under `config_dir`
    pub fn load(environment: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let file = |name: &str| File::from(config_dir.join(name)).required(false);

        let config = Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment)?
            .set_default("application.cors_enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .add_source(file("default"))
            .add_source(file(environment))
            .add_source(file("local"))
            .add_source(
                Environment::with_prefix("POSTMASTER_PROXY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.application.environment == DEVELOPMENT
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}
