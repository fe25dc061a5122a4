//! NoTracePDF: a zero-trace document processing service.
//!
//! Uploads are validated at the boundary, transformed in memory (or in
//! tracked RAM-backed scratch space when an external tool needs a
//! filesystem) and streamed back. Nothing about a request outlives it except
//! one redacted audit line.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod transform;
pub mod validation;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod scratch;
pub mod security;

pub use config::Settings;
pub use error::AppError;
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown, ShutdownCoordinator};
pub use scratch::ResourceTracker;
