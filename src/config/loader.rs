//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::Settings;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value '{value}' for environment variable {key}")]
    Env { key: &'static str, value: String },
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build settings from defaults, an optional TOML file and the process environment.
pub fn load_settings(file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match file {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => Settings::default(),
    };

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    validate_config(&settings).map_err(ConfigError::Validation)?;

    Ok(settings)
}

/// Overlay environment variables onto `settings`.
///
/// `lookup` abstracts `std::env::var` so overrides can be tested without
/// mutating the process environment.
pub fn apply_env<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("APP_NAME") {
        settings.app_name = value;
    }
    if let Some(value) = lookup("DEBUG") {
        settings.debug = parse_bool("DEBUG", value)?;
    }
    if let Some(value) = lookup("BIND_ADDRESS") {
        settings.bind_address = value;
    }
    if let Some(value) = lookup("MAX_FILE_SIZE_MB") {
        settings.limits.max_file_size_mb = parse_value("MAX_FILE_SIZE_MB", value)?;
    }
    if let Some(value) = lookup("MAX_FILES_PER_REQUEST") {
        settings.limits.max_files_per_request = parse_value("MAX_FILES_PER_REQUEST", value)?;
    }
    if let Some(value) = lookup("REQUEST_TIMEOUT_SECONDS") {
        settings.timeouts.request_secs = parse_value("REQUEST_TIMEOUT_SECONDS", value)?;
    }
    if let Some(value) = lookup("CONVERSION_TIMEOUT_SECONDS") {
        settings.timeouts.conversion_secs = parse_value("CONVERSION_TIMEOUT_SECONDS", value)?;
    }
    if let Some(value) = lookup("SCRATCH_ROOT") {
        settings.scratch.root = PathBuf::from(value);
    }
    if let Some(value) = lookup("SOFFICE_BIN") {
        settings.tools.soffice = value;
    }
    if let Some(value) = lookup("TESSERACT_BIN") {
        settings.tools.tesseract = value;
    }
    if let Some(value) = lookup("PDFTOPPM_BIN") {
        settings.tools.pdftoppm = value;
    }
    if let Some(value) = lookup("METRICS_ADDRESS") {
        settings.observability.metrics_address = Some(value);
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env { key, value }),
    }
}
