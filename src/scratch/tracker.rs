//! Process-wide registry of live scratch resources.
//!
//! # Responsibilities
//! - Hold every scratch directory and external process a transform is using
//! - Release single handles on demand (`unregister`)
//! - Release everything at once (`sweep_all`) for shutdown
//!
//! # Design Decisions
//! - One mutex around the live set; the lock covers insert/remove/drain only
//! - Release actions run after the lock is dropped
//! - A failing or panicking release is logged and the sweep continues

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempDir;
use tokio::sync::oneshot;

use crate::observability::metrics;

/// Global counter for handle IDs; relaxed ordering is enough for uniqueness.
static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a registered scratch resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new() -> Self {
        Self(HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scratch-{}", self.0)
    }
}

/// Something that must be discarded before a request (or the process) ends.
pub enum ScratchResource {
    /// RAM-backed directory; released by recursive removal.
    Directory(TempDir),
    /// Running external process; released by killing it.
    Process(ProcessHandle),
    /// Arbitrary release action.
    Custom(Box<dyn FnOnce() -> std::io::Result<()> + Send>),
}

impl ScratchResource {
    pub fn custom<F>(release: F) -> Self
    where
        F: FnOnce() -> std::io::Result<()> + Send + 'static,
    {
        ScratchResource::Custom(Box::new(release))
    }

    fn kind(&self) -> &'static str {
        match self {
            ScratchResource::Directory(_) => "directory",
            ScratchResource::Process(_) => "process",
            ScratchResource::Custom(_) => "custom",
        }
    }

    fn release(self) -> std::io::Result<()> {
        match self {
            ScratchResource::Directory(dir) => dir.close(),
            ScratchResource::Process(process) => {
                process.kill();
                Ok(())
            }
            ScratchResource::Custom(release) => release(),
        }
    }
}

impl std::fmt::Debug for ScratchResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScratchResource").field(&self.kind()).finish()
    }
}

/// Kill switch for a spawned child process.
///
/// The process runner selects on the paired receiver and drops the child
/// (spawned with `kill_on_drop`) once this handle fires or is dropped.
#[derive(Debug)]
pub struct ProcessHandle {
    kill: oneshot::Sender<()>,
}

impl ProcessHandle {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (kill, rx) = oneshot::channel();
        (Self { kill }, rx)
    }

    fn kill(self) {
        // The runner may already have finished and dropped its receiver.
        let _ = self.kill.send(());
    }
}

/// A resource paired with its identifier, ready for registration.
#[derive(Debug)]
pub struct EphemeralHandle {
    id: HandleId,
    resource: ScratchResource,
}

impl EphemeralHandle {
    pub fn new(resource: ScratchResource) -> Self {
        Self {
            id: HandleId::new(),
            resource,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }
}

/// Shared live set of scratch resources.
///
/// Cheap to clone; all clones observe the same set. Each test builds its own
/// instance instead of sharing a global.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    live: Arc<Mutex<HashMap<HandleId, ScratchResource>>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the live set. A handle whose id is already live is ignored.
    pub fn register(&self, handle: EphemeralHandle) -> HandleId {
        let id = handle.id;
        self.lock().entry(id).or_insert(handle.resource);
        tracing::trace!(handle_id = %id, "Scratch resource registered");
        id
    }

    /// Remove a handle and release it. Returns false when the handle was not live.
    pub fn unregister(&self, id: HandleId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(resource) => {
                release_logged(id, resource);
                true
            }
            None => false,
        }
    }

    /// Release every live handle and return how many were swept.
    pub fn sweep_all(&self) -> usize {
        let drained: Vec<(HandleId, ScratchResource)> = self.lock().drain().collect();
        let count = drained.len();
        for (id, resource) in drained {
            release_logged(id, resource);
        }
        metrics::record_swept(count);
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.lock().contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<HandleId, ScratchResource>> {
        // A panic while holding this lock cannot leave the map half-updated.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn release_logged(id: HandleId, resource: ScratchResource) {
    let kind = resource.kind();
    match catch_unwind(AssertUnwindSafe(|| resource.release())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(
                event = "release_failed",
                handle_id = %id,
                kind,
                error_kind = ?err.kind(),
                "Scratch release failed"
            );
        }
        Err(_) => {
            tracing::warn!(
                event = "release_failed",
                handle_id = %id,
                kind,
                "Scratch release panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> ScratchResource {
        let counter = Arc::clone(counter);
        ScratchResource::custom(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn handle_ids_are_unique() {
        assert_ne!(HandleId::new(), HandleId::new());
    }

    #[test]
    fn register_unregister_roundtrip() {
        let tracker = ResourceTracker::new();
        let released = Arc::new(AtomicUsize::new(0));

        let id = tracker.register(EphemeralHandle::new(counting(&released)));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains(id));

        assert!(tracker.unregister(id));
        assert!(tracker.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        // Missing handles are ignored.
        assert!(!tracker.unregister(id));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sweep_releases_everything_even_when_one_fails() {
        let tracker = ResourceTracker::new();
        let released = Arc::new(AtomicUsize::new(0));

        tracker.register(EphemeralHandle::new(counting(&released)));
        tracker.register(EphemeralHandle::new(ScratchResource::custom(|| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "busy"))
        })));
        tracker.register(EphemeralHandle::new(ScratchResource::custom(|| {
            panic!("release blew up")
        })));
        tracker.register(EphemeralHandle::new(counting(&released)));

        assert_eq!(tracker.sweep_all(), 4);
        assert!(tracker.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.sweep_all(), 0);
    }

    #[test]
    fn directory_release_removes_it() {
        let tracker = ResourceTracker::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("page.png"), b"scratch").unwrap();

        let id = tracker.register(EphemeralHandle::new(ScratchResource::Directory(dir)));
        assert!(path.exists());

        tracker.unregister(id);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn process_release_fires_kill_switch() {
        let tracker = ResourceTracker::new();
        let (handle, rx) = ProcessHandle::new();
        tracker.register(EphemeralHandle::new(ScratchResource::Process(handle)));

        assert_eq!(tracker.sweep_all(), 1);
        assert!(rx.await.is_ok());
    }

    #[test]
    fn concurrent_registration_is_safe() {
        let tracker = ResourceTracker::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let id = tracker.register(EphemeralHandle::new(ScratchResource::custom(|| Ok(()))));
                        tracker.unregister(id);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert!(tracker.is_empty());
    }
}
