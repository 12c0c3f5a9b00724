//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::error::ClientError;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::InvalidConfiguration(e.to_string())
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
