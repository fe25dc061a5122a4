//! Ephemeral scratch storage subsystem.
//!
//! # Data Flow
//! ```text
//! transform needs a filesystem or a child process
//!     → scope.rs (ScratchScope::directory / track)
//!     → tracker.rs (ResourceTracker::register)
//! transform returns, fails, or its future is dropped
//!     → ScratchScope::close / Drop
//!     → ResourceTracker::unregister (release)
//! shutdown
//!     → ResourceTracker::sweep_all (release whatever is left)
//! ```
//!
//! # Design Decisions
//! - Directories live under a RAM-backed root (tmpfs), never durable disk
//! - In-memory buffers are plain owned values and are not tracked
//! - The tracker is injected, never global

pub mod scope;
pub mod tracker;

pub use scope::ScratchScope;
pub use tracker::{EphemeralHandle, HandleId, ProcessHandle, ResourceTracker, ScratchResource};
