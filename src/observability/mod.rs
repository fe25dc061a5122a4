//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events through `tracing`)
//!     → metrics.rs (counters and histograms through the `metrics` facade)
//!
//! Consumers:
//!     → stdout (JSON lines, or human-readable in debug mode)
//!     → Prometheus scrape endpoint (opt-in)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - No event or metric label ever carries client-supplied data
//! - Without an installed recorder metric updates are no-ops

pub mod logging;
pub mod metrics;
