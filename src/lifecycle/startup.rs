//! Startup orchestration.
//!
//! # Responsibilities
//! - Check the scratch root before any traffic arrives
//! - Build the shared services in dependency order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The tracker is created once here and injected everywhere else

use std::sync::Arc;

use crate::config::Settings;
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::scratch::ResourceTracker;

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("scratch root {path} is not usable: {source}")]
    ScratchRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Process-wide services shared by the server and the lifecycle.
#[derive(Debug, Clone)]
pub struct Services {
    pub settings: Arc<Settings>,
    pub tracker: ResourceTracker,
    pub coordinator: ShutdownCoordinator,
}

impl Services {
    pub fn new(settings: Settings) -> Result<Self, StartupError> {
        check_scratch_root(&settings)?;

        let tracker = ResourceTracker::new();
        let coordinator = ShutdownCoordinator::new(tracker.clone());

        tracing::info!(
            scratch_on_tmpfs = settings.scratch.root.starts_with("/dev/shm"),
            max_file_size_mb = settings.limits.max_file_size_mb,
            request_timeout_secs = settings.timeouts.request_secs,
            conversion_timeout_secs = settings.timeouts.conversion_secs,
            "Services initialized"
        );

        Ok(Self {
            settings: Arc::new(settings),
            tracker,
            coordinator,
        })
    }
}

/// Create and remove a throwaway directory under the scratch root.
fn check_scratch_root(settings: &Settings) -> Result<(), StartupError> {
    let root = &settings.scratch.root;
    let to_error = |source| StartupError::ScratchRoot {
        path: root.display().to_string(),
        source,
    };
    std::fs::create_dir_all(root).map_err(to_error)?;
    tempfile::Builder::new()
        .prefix("ntp-check-")
        .tempdir_in(root)
        .and_then(|dir| dir.close())
        .map_err(to_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_services_over_a_writable_root() {
        let root = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.scratch.root = root.path().join("scratch");

        let services = Services::new(settings).unwrap();
        assert!(services.tracker.is_empty());
        assert!(services.coordinator.is_running());
        assert!(root.path().join("scratch").is_dir());
    }

    #[test]
    fn rejects_unusable_root() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut settings = Settings::default();
        settings.scratch.root = file.path().join("nested");

        let err = Services::new(settings).unwrap_err();
        assert!(err.to_string().contains("scratch root"));
    }
}
