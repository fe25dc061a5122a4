//! Response header policy.
//!
//! # Data Flow
//! ```text
//! Every outbound response (success, error, 404, panic, deadline):
//!     → headers.rs (no-cache and nosniff directives)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - No configuration surface: the directives apply to every route
//! - Download names are generated server-side; client filenames never reach
//!   a response header

pub mod headers;
