//! Shutdown coordination for the service.
//!
//! # Responsibilities
//! - Run the scratch sweep exactly once per termination event
//! - Drive the state machine RUNNING → SHUTTING_DOWN → TERMINATED
//! - Fan the event out to the HTTP server and other listeners
//!
//! # Design Decisions
//! - Pure logic: no OS signal handling here (see signals.rs)
//! - A compare-and-swap on the state is the one-shot guard
//! - Nothing here panics or returns errors; shutdown always completes

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::scratch::ResourceTracker;

/// Broadcast fan-out of the shutdown event.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Terminated,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::ShuttingDown,
            _ => ShutdownState::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ShutdownState::Running => 0,
            ShutdownState::ShuttingDown => 1,
            ShutdownState::Terminated => 2,
        }
    }
}

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGTERM (container stop).
    Terminate,
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// `main` returned or unwound.
    ProcessExit,
    /// Programmatic request (tests, embedding).
    Requested,
}

impl std::fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShutdownCause::Terminate => "SIGTERM",
            ShutdownCause::Interrupt => "SIGINT",
            ShutdownCause::ProcessExit => "process_exit",
            ShutdownCause::Requested => "requested",
        };
        f.write_str(name)
    }
}

type Callback = Box<dyn FnOnce() + Send>;

struct Inner {
    state: AtomicU8,
    armed: AtomicBool,
    tracker: ResourceTracker,
    callbacks: Mutex<Vec<Callback>>,
    notify: Shutdown,
}

/// Guarantees one sweep of the resource tracker per termination event.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl ShutdownCoordinator {
    pub fn new(tracker: ResourceTracker) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ShutdownState::Running.as_u8()),
                armed: AtomicBool::new(false),
                tracker,
                callbacks: Mutex::new(Vec::new()),
                notify: Shutdown::new(),
            }),
        }
    }

    /// Mark the coordinator as armed. Returns true only for the first call,
    /// so process adapters install their handlers at most once.
    pub fn start(&self) -> bool {
        !self.inner.armed.swap(true, Ordering::SeqCst)
    }

    /// Register a callback to run after the sweep.
    ///
    /// Callbacks registered after termination run immediately.
    pub fn on_shutdown<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state() == ShutdownState::Terminated {
            run_callback(Box::new(callback));
            return;
        }
        self.callbacks().push(Box::new(callback));
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Run the shutdown sequence.
    ///
    /// Returns `Some(swept)` for the call that performed the sweep and `None`
    /// for every later call.
    pub fn trigger(&self, cause: ShutdownCause) -> Option<usize> {
        let won = self
            .inner
            .state
            .compare_exchange(
                ShutdownState::Running.as_u8(),
                ShutdownState::ShuttingDown.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !won {
            tracing::debug!(cause = %cause, "Shutdown already in progress");
            return None;
        }

        let swept = self.inner.tracker.sweep_all();
        tracing::info!(event = "cleanup", resource_count = swept, cause = %cause, "Scratch resources swept");

        let callbacks: Vec<Callback> = std::mem::take(&mut *self.callbacks());
        for callback in callbacks {
            run_callback(callback);
        }

        self.inner
            .state
            .store(ShutdownState::Terminated.as_u8(), Ordering::SeqCst);
        self.inner.notify.trigger();
        Some(swept)
    }

    /// Subscribe to the post-sweep broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.notify.subscribe()
    }

    /// Resolve once the coordinator has terminated.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.state() == ShutdownState::Terminated {
            return;
        }
        let _ = rx.recv().await;
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.inner.tracker
    }

    fn callbacks(&self) -> std::sync::MutexGuard<'_, Vec<Callback>> {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

fn run_callback(callback: Callback) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::warn!(event = "shutdown_callback_failed", "Shutdown callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::{EphemeralHandle, ScratchResource};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn second_trigger_is_a_no_op() {
        let tracker = ResourceTracker::new();
        tracker.register(EphemeralHandle::new(ScratchResource::custom(|| Ok(()))));
        tracker.register(EphemeralHandle::new(ScratchResource::custom(|| Ok(()))));
        let coordinator = ShutdownCoordinator::new(tracker.clone());

        assert_eq!(coordinator.trigger(ShutdownCause::Terminate), Some(2));
        assert_eq!(coordinator.trigger(ShutdownCause::Interrupt), None);
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
        assert!(tracker.is_empty());
    }

    #[test]
    fn start_arms_once() {
        let coordinator = ShutdownCoordinator::new(ResourceTracker::new());
        assert!(coordinator.start());
        assert!(!coordinator.start());
        assert!(coordinator.is_running());
    }

    #[test]
    fn callbacks_run_once_after_sweep() {
        let tracker = ResourceTracker::new();
        let coordinator = ShutdownCoordinator::new(tracker.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let seen = calls.clone();
        let observed = tracker.clone();
        coordinator.on_shutdown(move || {
            assert!(observed.is_empty());
            seen.fetch_add(1, Ordering::SeqCst);
        });
        coordinator.on_shutdown(|| panic!("listener failed"));

        coordinator.trigger(ShutdownCause::Requested);
        coordinator.trigger(ShutdownCause::ProcessExit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_triggers_sweep_once() {
        let tracker = ResourceTracker::new();
        let released = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let released = released.clone();
            tracker.register(EphemeralHandle::new(ScratchResource::custom(move || {
                released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })));
        }
        let coordinator = ShutdownCoordinator::new(tracker);

        let winners: usize = (0..4)
            .map(|_| {
                let coordinator = coordinator.clone();
                std::thread::spawn(move || coordinator.trigger(ShutdownCause::Terminate))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|t| t.join().unwrap())
            .count();

        assert_eq!(winners, 1);
        assert_eq!(released.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let coordinator = ShutdownCoordinator::new(ResourceTracker::new());
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait().await })
        };
        tokio::task::yield_now().await;
        coordinator.trigger(ShutdownCause::Requested);
        waiter.await.unwrap();

        // Late waiters return immediately.
        coordinator.wait().await;
    }
}
