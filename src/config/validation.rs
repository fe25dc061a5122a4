//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, timeouts > 0)
//! - Validate the bind address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::Settings;

/// A single semantic problem with the loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic rule and collect all violations.
pub fn validate_config(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.limits.max_file_size_mb == 0 {
        errors.push(ValidationError::new("max_file_size_mb", "must be greater than 0"));
    }
    if settings.limits.max_files_per_request < 2 {
        errors.push(ValidationError::new(
            "max_files_per_request",
            "must allow at least 2 files",
        ));
    }
    if settings.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("request_timeout_seconds", "must be greater than 0"));
    }
    if settings.timeouts.conversion_secs == 0 {
        errors.push(ValidationError::new(
            "conversion_timeout_seconds",
            "must be greater than 0",
        ));
    }
    if settings.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "bind_address",
            format!("'{}' is not a socket address", settings.bind_address),
        ));
    }
    if settings.app_name.trim().is_empty() {
        errors.push(ValidationError::new("app_name", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&Settings::default()).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let mut settings = Settings::default();
        settings.limits.max_file_size_mb = 0;
        settings.timeouts.request_secs = 0;
        settings.bind_address = "not-an-address".into();

        let errors = validate_config(&settings).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["max_file_size_mb", "request_timeout_seconds", "bind_address"]
        );
    }
}
