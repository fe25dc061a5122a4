//! Structured logging.
//!
//! # Responsibilities
//! - Install the global subscriber once at startup
//! - Pick the output format from the debug flag
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - JSON format for production, human-readable format for development
//! - `RUST_LOG` overrides the default filter
//! - Span events and targets are off; the audit line carries its own fields

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;

/// Error type for logging initialization.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingError(String);

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "notrace_pdf=debug,warn"
    } else {
        "notrace_pdf=info,warn"
    }
}

/// Install the global subscriber according to `settings`.
pub fn init(settings: &Settings) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(settings.debug)));

    let installed = if settings.debug {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false).with_current_span(false))
            .try_init()
    };
    installed.map_err(|err| LoggingError(err.to_string()))
}
