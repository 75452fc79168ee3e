//! Debounced local file watching.
//!
//! [`LocalFileWatcher`] bridges the synchronous `notify` debouncer to the
//! async notification channel. Local change events are trusted, so there is
//! no hashing: every debounced batch that touches the file re-reads it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Blocking Thread (spawn_blocking)                │
//! │  ┌──────────────────┐   ┌────────────────┐   ┌──────────────┐  │
//! │  │ RecommendedWatcher│ ->│ Debouncer      │ ->│ Callback     │  │
//! │  │ (parent dir)     │   │ (300ms window) │   │ filter, read │  │
//! │  └──────────────────┘   └────────────────┘   └──────┬───────┘  │
//! └─────────────────────────────────────────────────────│──────────┘
//!                                                       │ blocking_send
//!                                                       ▼
//!                                  mpsc::Sender<Notification> (shared)
//! ```
//!
//! The parent directory is watched rather than the file so that editors
//! which save by rename-and-replace keep producing events.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use mdv_core::WatchConfig;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::WatchError;
use crate::events::Notification;
use crate::filter::{FileFilter, SingleFileFilter};

/// Watches one local file and reports `modified`, `deleted`, or
/// `file-error` notifications.
///
/// # Lifecycle
///
/// 1. **Creation**: [`LocalFileWatcher::new`] validates the path and spawns
///    the notify debouncer on the blocking pool.
/// 2. **Events**: notifications go to the sender given at creation.
/// 3. **Shutdown**: call [`LocalFileWatcher::shutdown`], or drop the watcher.
///
/// # Examples
///
/// ```no_run
/// use mdv_watcher::LocalFileWatcher;
/// use mdv_core::WatchConfig;
/// use camino::Utf8Path;
/// use tokio::sync::mpsc;
///
/// # async fn example() -> Result<(), mdv_watcher::WatchError> {
/// let (tx, mut rx) = mpsc::channel(100);
/// let watcher = LocalFileWatcher::new(Utf8Path::new("notes/today.md"), &WatchConfig::default(), tx)?;
///
/// if let Some(notification) = rx.recv().await {
///     println!("{}", notification.name());
/// }
/// watcher.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct LocalFileWatcher {
    /// Sending on this stops the blocking task. `None` once stopping.
    shutdown_tx: Option<oneshot::Sender<()>>,

    task_handle: Option<JoinHandle<Result<(), WatchError>>>,

    /// Canonical path of the watched file.
    file_path: Utf8PathBuf,
}

impl std::fmt::Debug for LocalFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileWatcher")
            .field("file_path", &self.file_path)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl LocalFileWatcher {
    /// Starts watching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if the file does not exist, or
    /// [`WatchError::Io`] if it cannot be canonicalized.
    pub fn new(
        path: &Utf8Path,
        config: &WatchConfig,
        events: mpsc::Sender<Notification>,
    ) -> Result<Self, WatchError> {
        if !path.is_file() {
            return Err(WatchError::path_not_found(path));
        }

        let file_path = path.canonicalize_utf8()?;
        let watch_dir = file_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .ok_or_else(|| WatchError::path_not_found(path))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let filter = SingleFileFilter::new(file_path.clone());
        let debounce = config.debounce();

        let task_handle = tokio::task::spawn_blocking(move || {
            run_watcher_loop(&watch_dir, debounce, &events, shutdown_rx, filter)
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            file_path,
        })
    }

    /// The canonical path being watched.
    #[must_use]
    pub fn file_path(&self) -> &Utf8Path {
        &self.file_path
    }

    /// Returns `true` while the blocking task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the watcher and waits for the blocking task.
    ///
    /// # Errors
    ///
    /// Returns the watcher thread's error, or [`WatchError::ChannelClosed`]
    /// if it panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(_join_error) => return Err(WatchError::ChannelClosed),
            }
        }

        Ok(())
    }
}

impl Drop for LocalFileWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Re-reads the file and turns the result into a notification.
fn inspect(path: &Utf8Path) -> Notification {
    match std::fs::read_to_string(path) {
        Ok(content) => Notification::modified(content, false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Notification::deleted(false),
        Err(e) => Notification::file_error(e.to_string(), path.as_str()),
    }
}

/// Runs the notify debouncer until shutdown. Called from `spawn_blocking`.
fn run_watcher_loop<F: FileFilter>(
    dir: &Utf8Path,
    debounce: std::time::Duration,
    events: &mpsc::Sender<Notification>,
    shutdown_rx: oneshot::Receiver<()>,
    filter: F,
) -> Result<(), WatchError> {
    let tx = events.clone();
    let debouncer_result: Result<Debouncer<notify::RecommendedWatcher>, notify::Error> =
        new_debouncer(debounce, move |res: DebounceEventResult| match res {
            Ok(batch) => {
                let Some(path) = batch.into_iter().find_map(|event| {
                    let path = Utf8PathBuf::try_from(event.path).ok()?;
                    filter.should_process(&path).then_some(path)
                }) else {
                    return;
                };

                let notification = inspect(&path);
                tracing::debug!(path = %path, event = notification.name(), "Local file changed");
                if tx.blocking_send(notification).is_err() {
                    tracing::debug!("Notification channel closed");
                }
            }
            Err(error) => tracing::warn!(error = %error, "Debouncer error"),
        });

    let mut debouncer = debouncer_result?;
    debouncer
        .watcher()
        .watch(dir.as_std_path(), RecursiveMode::NonRecursive)?;

    tracing::info!(dir = %dir, debounce_ms = debounce.as_millis(), "Local file watcher started");

    let _ = shutdown_rx.blocking_recv();

    tracing::info!(dir = %dir, "Local file watcher stopped");
    Ok(())
}
