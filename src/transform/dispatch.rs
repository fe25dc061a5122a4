//! Transform invocation with scoped scratch release.
//!
//! # Responsibilities
//! - Open a `ScratchScope` per invocation and close it on every exit path
//! - Hand transforms a context for scratch directories, blocking work and
//!   external processes
//! - Bound external processes by the conversion timeout
//! - Normalize failures into `AppError`
//!
//! # Design Decisions
//! - Success and error close the scope explicitly; a dropped request future
//!   closes it through `Drop`
//! - A registered process is killed either by its timeout (`kill_on_drop`)
//!   or by the tracker firing its handle during a sweep

use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::config::{Settings, ToolsConfig};
use crate::error::AppError;
use crate::observability::metrics;
use crate::scratch::{ProcessHandle, ResourceTracker, ScratchResource, ScratchScope};
use crate::transform::archive::ArchiveLimits;
use crate::transform::{Transform, TransformError, TransformResult};

/// Runs transforms on behalf of handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tracker: ResourceTracker,
    settings: Arc<Settings>,
}

impl Dispatcher {
    pub fn new(tracker: ResourceTracker, settings: Arc<Settings>) -> Self {
        Self { tracker, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Invoke `transform` and release whatever scratch it acquired.
    pub async fn run<T: Transform>(
        &self,
        transform: &T,
        input: T::Input,
        options: T::Options,
    ) -> Result<TransformResult, AppError> {
        let scope = ScratchScope::new(self.tracker.clone(), self.settings.scratch.root.clone());
        let ctx = TransformContext::new(&scope, &self.settings);

        let started = Instant::now();
        let outcome = transform.run(&ctx, input, options).await;
        let released = scope.close();

        let label = match &outcome {
            Ok(_) => "success",
            Err(err) => err.outcome(),
        };
        metrics::record_transform(transform.operation(), label, started.elapsed());
        tracing::debug!(
            operation = transform.operation(),
            outcome = label,
            released,
            "Transform finished"
        );

        outcome.map_err(AppError::from)
    }
}

/// What a running transform may use besides its input.
pub struct TransformContext<'a> {
    scope: &'a ScratchScope,
    tools: &'a ToolsConfig,
    conversion_timeout: Duration,
    max_upload_bytes: usize,
    max_files: usize,
}

impl<'a> TransformContext<'a> {
    pub fn new(scope: &'a ScratchScope, settings: &'a Settings) -> Self {
        Self {
            scope,
            tools: &settings.tools,
            conversion_timeout: settings.conversion_timeout(),
            max_upload_bytes: settings.max_upload_bytes(),
            max_files: settings.limits.max_files_per_request,
        }
    }

    pub fn tools(&self) -> &ToolsConfig {
        self.tools
    }

    pub fn conversion_timeout(&self) -> Duration {
        self.conversion_timeout
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Uploaded archives may hold as much as a multi-file request.
    pub fn archive_limits(&self) -> ArchiveLimits {
        let max_entry_bytes = self.max_upload_bytes as u64;
        ArchiveLimits {
            max_entry_bytes,
            max_total_bytes: max_entry_bytes.saturating_mul(self.max_files as u64),
            max_entries: self.max_files,
        }
    }

    pub fn scope(&self) -> &ScratchScope {
        self.scope
    }

    /// A fresh tracked directory under the scratch root.
    pub fn scratch_dir(&self) -> Result<std::path::PathBuf, TransformError> {
        self.scope.directory().map_err(|err| {
            tracing::warn!(error_kind = ?err.kind(), "Scratch directory unavailable");
            TransformError::failure("Scratch storage is not available")
        })
    }

    /// Run CPU-bound work off the async workers.
    pub async fn blocking<F, R>(&self, work: F) -> Result<R, TransformError>
    where
        F: FnOnce() -> Result<R, TransformError> + Send + 'static,
        R: Send + 'static,
    {
        match tokio::task::spawn_blocking(work).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(TransformError::failure("Processing failed")),
            Err(_) => Err(TransformError::Cancelled),
        }
    }

    /// Spawn `command`, track it, and wait at most the conversion timeout.
    pub async fn run_command(&self, command: Command) -> Result<Output, TransformError> {
        let secs = self.conversion_timeout.as_secs();
        self.run_command_for(command, self.conversion_timeout, || {
            TransformError::Timeout(format!("Conversion timed out after {secs} seconds"))
        })
        .await
    }

    /// Like `run_command` with an explicit bound and timeout error.
    pub async fn run_command_for<E>(
        &self,
        mut command: Command,
        limit: Duration,
        on_timeout: E,
    ) -> Result<Output, TransformError>
    where
        E: FnOnce() -> TransformError,
    {
        command
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                TransformError::ToolUnavailable
            }
            _ => TransformError::failure("Failed to start conversion tool"),
        })?;

        let (handle, kill) = ProcessHandle::new();
        let id = self.scope.track(ScratchResource::Process(handle));

        let outcome = tokio::select! {
            waited = tokio::time::timeout(limit, child.wait_with_output()) => match waited {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(_)) => Err(TransformError::failure("Conversion tool failed")),
                Err(_) => Err(on_timeout()),
            },
            _ = kill => Err(TransformError::Cancelled),
        };

        self.scope.release(id);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn dispatcher() -> (Dispatcher, ResourceTracker) {
        let tracker = ResourceTracker::new();
        let mut settings = Settings::default();
        settings.scratch.root = std::env::temp_dir();
        settings.timeouts.conversion_secs = 1;
        (Dispatcher::new(tracker.clone(), Arc::new(settings)), tracker)
    }

    /// Acquires scratch space and then fails.
    struct FailingAfterScratch {
        registered: AtomicUsize,
        dirs: Mutex<Vec<std::path::PathBuf>>,
    }

    #[async_trait]
    impl Transform for FailingAfterScratch {
        type Input = ();
        type Options = ();

        fn operation(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, ctx: &TransformContext<'_>, _: (), _: ()) -> Result<TransformResult, TransformError> {
            for _ in 0..3 {
                let dir = ctx.scratch_dir()?;
                std::fs::write(dir.join("input.pdf"), b"%PDF-1.4").map_err(|_| TransformError::failure("io"))?;
                self.dirs.lock().unwrap().push(dir);
            }
            ctx.scope().track(ScratchResource::custom(|| Ok(())));
            self.registered.fetch_add(4, Ordering::SeqCst);
            Err(TransformError::failure("tool crashed"))
        }
    }

    #[tokio::test]
    async fn scratch_is_released_on_failure() {
        let (dispatcher, tracker) = dispatcher();
        let spy = FailingAfterScratch {
            registered: AtomicUsize::new(0),
            dirs: Mutex::new(Vec::new()),
        };

        let err = dispatcher.run(&spy, (), ()).await.unwrap_err();
        assert_eq!(err.kind(), "conversion_failure");
        assert_eq!(spy.registered.load(Ordering::SeqCst), 4);
        assert!(tracker.is_empty());
        assert_eq!(tracker.sweep_all(), 0);
        for dir in spy.dirs.lock().unwrap().iter() {
            assert!(!dir.exists());
        }
    }

    struct Hangs;

    #[async_trait]
    impl Transform for Hangs {
        type Input = ();
        type Options = ();

        fn operation(&self) -> &'static str {
            "hangs"
        }

        async fn run(&self, ctx: &TransformContext<'_>, _: (), _: ()) -> Result<TransformResult, TransformError> {
            ctx.scratch_dir()?;
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn scratch_is_released_when_the_request_is_dropped() {
        let (dispatcher, tracker) = dispatcher();
        let timed_out = tokio::time::timeout(Duration::from_millis(50), dispatcher.run(&Hangs, (), ())).await;
        assert!(timed_out.is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn archive_limits_follow_request_limits() {
        let mut settings = Settings::default();
        settings.limits.max_file_size_mb = 2;
        settings.limits.max_files_per_request = 5;
        let scope = ScratchScope::new(ResourceTracker::new(), std::env::temp_dir());
        let limits = TransformContext::new(&scope, &settings).archive_limits();
        assert_eq!(limits.max_entry_bytes, 2 << 20);
        assert_eq!(limits.max_total_bytes, 10 << 20);
        assert_eq!(limits.max_entries, 5);
    }

    #[tokio::test]
    async fn missing_tool_is_unavailable() {
        let (dispatcher, _) = dispatcher();
        let scope = ScratchScope::new(ResourceTracker::new(), std::env::temp_dir());
        let ctx = TransformContext::new(&scope, dispatcher.settings());

        let err = ctx
            .run_command(Command::new("notrace-definitely-missing-tool"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::ToolUnavailable));
        assert_eq!(scope.held(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_process_times_out_and_is_untracked() {
        let (dispatcher, _) = dispatcher();
        let tracker = ResourceTracker::new();
        let scope = ScratchScope::new(tracker.clone(), std::env::temp_dir());
        let ctx = TransformContext::new(&scope, dispatcher.settings());

        let mut command = Command::new("sleep");
        command.arg("5");
        let err = ctx.run_command(command).await.unwrap_err();
        assert_eq!(err.to_string(), "Conversion timed out after 1 seconds");
        assert!(tracker.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sweep_kills_running_process() {
        let (dispatcher, _) = dispatcher();
        let tracker = ResourceTracker::new();
        let scope = ScratchScope::new(tracker.clone(), std::env::temp_dir());
        let ctx = TransformContext::new(&scope, dispatcher.settings());

        let sweeper = {
            let tracker = tracker.clone();
            async move {
                while tracker.is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                tracker.sweep_all()
            }
        };
        let mut command = Command::new("sleep");
        command.arg("5");
        let (result, swept) = tokio::join!(ctx.run_command(command), sweeper);
        assert!(matches!(result, Err(TransformError::Cancelled)));
        assert_eq!(swept, 1);
    }
}
