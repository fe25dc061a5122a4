//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Probe scratch root → Build services → Bind
//!
//! Shutdown (shutdown.rs):
//!     Trigger → RUNNING → SHUTTING_DOWN → sweep scratch → TERMINATED → notify server
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownCoordinator::trigger
//!     end of main   → ExitGuard → ShutdownCoordinator::trigger (no-op if already done)
//! ```
//!
//! # Design Decisions
//! - The coordinator is pure logic and testable without real signals
//! - One sweep per process, whichever path gets there first
//! - In-flight requests drain after the sweep; their scopes find nothing left

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownCause, ShutdownCoordinator, ShutdownState};
pub use signals::ExitGuard;
pub use startup::{Services, StartupError};
