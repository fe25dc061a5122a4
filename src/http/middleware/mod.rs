//! Request/response interceptors.
//!
//! # Data Flow
//! ```text
//! request
//!     → no_cache.rs     (outermost: stamps headers on whatever comes back)
//!     → privacy_log.rs  (correlation id, audit line, request metrics)
//!     → panic catcher   (tower-http, JSON 500)
//!     → deadline.rs     (request timeout, JSON 504)
//!     → router
//! ```
//!
//! # Design Decisions
//! - Each interceptor is an `(request, next) -> response` function composed
//!   with `axum::middleware::from_fn`, ordered once in `server.rs`
//! - The guard sits outside the logger so the `X-Request-ID` response is
//!   covered too; the logger sits outside the panic catcher and the deadline
//!   so it records the status they produce

pub mod deadline;
pub mod no_cache;
pub mod privacy_log;

pub use deadline::enforce_deadline;
pub use no_cache::no_cache_guard;
pub use privacy_log::{privacy_log, X_REQUEST_ID};
