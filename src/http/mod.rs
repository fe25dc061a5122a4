//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, interceptor chain)
//!     → middleware/ (no-cache guard, audit log, panic catcher, deadline)
//!     → request.rs (form fields and uploads)
//!     → handlers/ (boundary validation, option parsing, dispatch)
//!     → response.rs (attachment or JSON body)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::X_REQUEST_ID;
pub use request::{FormData, Upload};
pub use response::Download;
pub use server::{AppState, HttpServer};
