//! Request-scoped scratch acquisition.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::scratch::tracker::{EphemeralHandle, HandleId, ResourceTracker, ScratchResource};

/// Guard over the scratch resources one transform invocation acquired.
///
/// Everything tracked through the scope is unregistered (and therefore
/// released) when the scope is closed or dropped, so success, error and a
/// cancelled request future all end with the same cleanup.
#[derive(Debug)]
pub struct ScratchScope {
    tracker: ResourceTracker,
    root: PathBuf,
    handles: Mutex<Vec<HandleId>>,
}

impl ScratchScope {
    pub fn new(tracker: ResourceTracker, root: impl Into<PathBuf>) -> Self {
        Self {
            tracker,
            root: root.into(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register `resource` for the lifetime of this scope.
    pub fn track(&self, resource: ScratchResource) -> HandleId {
        let id = self.tracker.register(EphemeralHandle::new(resource));
        self.handles_mut().push(id);
        id
    }

    /// Create a fresh directory under the scratch root and track it.
    pub fn directory(&self) -> std::io::Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("ntp-")
            .tempdir_in(&self.root)?;
        let path = dir.path().to_path_buf();
        self.track(ScratchResource::Directory(dir));
        Ok(path)
    }

    /// Release one handle early.
    pub fn release(&self, id: HandleId) {
        self.handles_mut().retain(|h| *h != id);
        self.tracker.unregister(id);
    }

    /// Release everything still held; returns how many handles were live.
    pub fn close(&self) -> usize {
        let ids: Vec<HandleId> = std::mem::take(&mut *self.handles_mut());
        ids.into_iter().filter(|id| self.tracker.unregister(*id)).count()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn held(&self) -> usize {
        self.handles_mut().len()
    }

    fn handles_mut(&self) -> std::sync::MutexGuard<'_, Vec<HandleId>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ScratchScope {
    fn drop(&mut self) {
        let released = self.close();
        if released > 0 {
            tracing::trace!(released, "Scratch scope dropped with live handles");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_releases_directories() {
        let tracker = ResourceTracker::new();
        let scope = ScratchScope::new(tracker.clone(), std::env::temp_dir());

        let a = scope.directory().unwrap();
        let b = scope.directory().unwrap();
        assert!(a.is_dir() && b.is_dir());
        assert_eq!(tracker.len(), 2);

        assert_eq!(scope.close(), 2);
        assert!(!a.exists() && !b.exists());
        assert!(tracker.is_empty());
        assert_eq!(scope.close(), 0);
    }

    #[test]
    fn drop_releases_on_unwind() {
        let tracker = ResourceTracker::new();
        let created = std::sync::Arc::new(Mutex::new(None));
        let outcome = {
            let tracker = tracker.clone();
            let created = created.clone();
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                let scope = ScratchScope::new(tracker, std::env::temp_dir());
                let path = scope.directory().unwrap();
                std::fs::write(path.join("input.pdf"), b"%PDF-").unwrap();
                *created.lock().unwrap() = Some(path);
                panic!("transform failed midway");
            }))
        };
        assert!(outcome.is_err());
        assert!(tracker.is_empty());
        let path = created.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn already_swept_handles_are_not_counted() {
        let tracker = ResourceTracker::new();
        let scope = ScratchScope::new(tracker.clone(), std::env::temp_dir());
        scope.directory().unwrap();

        // Shutdown got there first.
        assert_eq!(tracker.sweep_all(), 1);
        assert_eq!(scope.close(), 0);
    }
}
