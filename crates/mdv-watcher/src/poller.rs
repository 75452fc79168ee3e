//! Remote change detection by polling.
//!
//! [`ChangeDetector`] is the check-cycle state machine. [`RemoteWatcher`]
//! drives it from a tokio task on a fixed cadence.
//!
//! # States
//!
//! ```text
//! Initializing ──► Active ◄──► Retrying
//!                    │            │
//!                    ├────────────┴──► Deleted   (not-found class)
//!                    ├───────────────► Failed    (retries exhausted)
//!                    └───────────────► Stopped   (stop())
//! ```
//!
//! # Cycle
//!
//! Each timer fire fetches the marker. An unchanged marker ends the cycle.
//! A changed marker fetches the content and compares its hash. Only a hash
//! change produces a `modified` notification; the stored marker is updated
//! either way.
//!
//! Cycles run one at a time inside the task, so a slow cycle can never
//! overlap the next fire: missed fires are skipped. A cycle's result is
//! applied only if the watch was not stopped while it was in flight.

use std::sync::Arc;
use std::time::Duration;

use mdv_core::{ContentHash, ModifiedMarker, WatchConfig, clamp_poll_interval};
use mdv_remote::{ErrorClass, RemoteError, RemoteFs};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WatchError;
use crate::events::Notification;

/// Lifecycle state of a remote watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchState {
    /// Fetching the initial marker and content.
    Initializing,
    /// Polling; the last cycle succeeded.
    Active,
    /// Polling; recent cycles hit connection errors.
    Retrying,
    /// Stopped by the consumer.
    Stopped,
    /// The file was removed. Terminal.
    Deleted,
    /// Retries were exhausted. Terminal.
    Failed,
}

impl WatchState {
    /// Returns `true` for [`WatchState::Deleted`] and [`WatchState::Failed`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }

    /// Returns `true` while the poll timer is running.
    #[must_use]
    pub const fn is_polling(self) -> bool {
        matches!(self, Self::Active | Self::Retrying)
    }
}

/// What one check cycle fetched, before it is applied.
#[derive(Debug)]
pub enum Observation {
    /// The marker matched the stored one.
    Unchanged,
    /// The marker differed; the content was fetched.
    Changed {
        /// The new marker.
        marker: ModifiedMarker,
        /// The fetched content.
        content: String,
        /// Hash of `content`.
        hash: ContentHash,
    },
    /// A call failed.
    Error(RemoteError),
}

/// The decision taken for one check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Marker unchanged; nothing to report.
    Unchanged,
    /// Marker changed but content did not; marker stored, nothing reported.
    MarkerOnly,
    /// Content changed.
    Modified(String),
    /// The file is gone.
    Deleted,
    /// A connection error below the retry bound.
    ConnectionLost {
        /// Consecutive failures, including this one.
        retry_count: u32,
        /// The bound.
        max_retries: u32,
    },
    /// The retry bound was reached.
    Failed {
        /// Consecutive failures, equal to the bound.
        retry_count: u32,
        /// The bound.
        max_retries: u32,
    },
    /// A non-actionable error; logged only.
    Ignored,
}

/// Marker, hash, and retry bookkeeping for one watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDetector {
    path: String,
    marker: ModifiedMarker,
    hash: ContentHash,
    retry_count: u32,
    max_retries: u32,
}

impl ChangeDetector {
    /// Creates a detector from known marker and content hash.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        marker: ModifiedMarker,
        hash: ContentHash,
        max_retries: u32,
    ) -> Self {
        Self {
            path: path.into(),
            marker,
            hash,
            retry_count: 0,
            max_retries: max_retries.max(1),
        }
    }

    /// Fetches the current marker, then the content, and builds a detector.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error.
    pub async fn initialize(
        fs: &dyn RemoteFs,
        path: &str,
        max_retries: u32,
    ) -> Result<Self, RemoteError> {
        let marker = fs.modified_marker(path).await?;
        let content = fs.read_file(path).await?;
        Ok(Self::new(path, marker, ContentHash::of(&content), max_retries))
    }

    /// Runs the I/O half of a check cycle without touching any state.
    pub async fn observe(&self, fs: &dyn RemoteFs) -> Observation {
        let marker = match fs.modified_marker(&self.path).await {
            Ok(marker) => marker,
            Err(e) => return Observation::Error(e),
        };
        if marker == self.marker {
            return Observation::Unchanged;
        }
        match fs.read_file(&self.path).await {
            Ok(content) => Observation::Changed {
                marker,
                hash: ContentHash::of(&content),
                content,
            },
            Err(e) => Observation::Error(e),
        }
    }

    /// Applies an observation and decides what to report.
    pub fn apply(&mut self, observation: Observation) -> CycleOutcome {
        match observation {
            Observation::Unchanged => {
                self.retry_count = 0;
                CycleOutcome::Unchanged
            }
            Observation::Changed {
                marker,
                content,
                hash,
            } => {
                self.retry_count = 0;
                self.marker = marker;
                if hash == self.hash {
                    CycleOutcome::MarkerOnly
                } else {
                    self.hash = hash;
                    CycleOutcome::Modified(content)
                }
            }
            Observation::Error(error) => self.classify(&error),
        }
    }

    /// Observes and applies in one step.
    pub async fn check(&mut self, fs: &dyn RemoteFs) -> CycleOutcome {
        let observation = self.observe(fs).await;
        self.apply(observation)
    }

    fn classify(&mut self, error: &RemoteError) -> CycleOutcome {
        match error.class() {
            ErrorClass::NotFound => CycleOutcome::Deleted,
            ErrorClass::Connection => {
                self.retry_count = self.retry_count.saturating_add(1);
                if self.retry_count >= self.max_retries {
                    CycleOutcome::Failed {
                        retry_count: self.retry_count,
                        max_retries: self.max_retries,
                    }
                } else {
                    CycleOutcome::ConnectionLost {
                        retry_count: self.retry_count,
                        max_retries: self.max_retries,
                    }
                }
            }
            ErrorClass::Other => {
                warn!(path = %self.path, error = %error, "Ignoring check cycle error");
                CycleOutcome::Ignored
            }
        }
    }

    /// The watched path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last stored marker.
    #[must_use]
    pub const fn marker(&self) -> ModifiedMarker {
        self.marker
    }

    /// Hash of the last reported content.
    #[must_use]
    pub const fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Consecutive connection failures.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Connection failures tolerated before giving up.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// [`WatchState::Retrying`] while failures are outstanding, else
    /// [`WatchState::Active`].
    #[must_use]
    pub const fn polling_state(&self) -> WatchState {
        if self.retry_count > 0 {
            WatchState::Retrying
        } else {
            WatchState::Active
        }
    }
}

/// A running poll task for one remote file.
///
/// Dropping the watcher stops it.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mdv_core::WatchConfig;
/// use mdv_remote::RemoteFs;
/// use mdv_watcher::RemoteWatcher;
/// use tokio::sync::mpsc;
///
/// # async fn example(connection: Arc<dyn RemoteFs>) -> Result<(), mdv_watcher::WatchError> {
/// let (tx, mut rx) = mpsc::channel(100);
/// let mut watcher = RemoteWatcher::start(connection, "/docs/a.md", &WatchConfig::default(), tx).await?;
/// watcher.set_poll_interval(5_000);
///
/// while let Some(notification) = rx.recv().await {
///     if notification.is_terminal() {
///         break;
///     }
/// }
/// watcher.stop();
/// # Ok(())
/// # }
/// ```
pub struct RemoteWatcher {
    path: String,
    cancel: CancellationToken,
    interval_tx: watch::Sender<Duration>,
    state: Arc<watch::Sender<WatchState>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RemoteWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWatcher")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("poll_interval", &self.poll_interval())
            .finish_non_exhaustive()
    }
}

impl RemoteWatcher {
    /// Initializes a detector for `path` and starts polling.
    ///
    /// The first check runs one poll interval after start.
    ///
    /// # Errors
    ///
    /// If the initial marker or content fetch fails, a `file-error`
    /// notification is sent and the error is returned; nothing keeps running.
    pub async fn start(
        fs: Arc<dyn RemoteFs>,
        path: impl Into<String>,
        config: &WatchConfig,
        events: mpsc::Sender<Notification>,
    ) -> Result<Self, WatchError> {
        let path = path.into();
        let (state_tx, _) = watch::channel(WatchState::Initializing);
        let state = Arc::new(state_tx);

        let detector = match ChangeDetector::initialize(fs.as_ref(), &path, config.max_retries).await
        {
            Ok(detector) => detector,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to start remote watch");
                if events
                    .send(Notification::file_error(e.to_string(), path.as_str()))
                    .await
                    .is_err()
                {
                    debug!("Notification channel closed");
                }
                return Err(WatchError::Remote(e));
            }
        };

        let period = config.poll_interval();
        let (interval_tx, interval_rx) = watch::channel(period);
        let cancel = CancellationToken::new();
        state.send_replace(WatchState::Active);

        let task = tokio::spawn(run_poll_loop(PollTask {
            fs,
            detector,
            events,
            cancel: cancel.clone(),
            interval_rx,
            state: Arc::clone(&state),
        }));

        info!(path = %path, interval_ms = period.as_millis(), "Remote watch started");
        Ok(Self {
            path,
            cancel,
            interval_tx,
            state,
            task: Some(task),
        })
    }

    /// Changes the poll cadence, clamped to 500..=30000 ms. The timer is
    /// restarted; marker and hash are kept. Returns the effective interval.
    pub fn set_poll_interval(&self, ms: u64) -> Duration {
        let interval = clamp_poll_interval(ms);
        self.interval_tx.send_replace(interval);
        interval
    }

    /// The effective poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// A receiver that observes state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// The watched remote path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stops polling. Idempotent and safe in any state: an in-flight cycle
    /// is abandoned and its result discarded. Terminal states are kept.
    pub fn stop(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == WatchState::Stopped {
                false
            } else {
                *state = WatchState::Stopped;
                true
            }
        });
        info!(path = %self.path, "Remote watch stopped");
    }

    /// Stops polling and waits for the task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] if the task panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        self.stop();
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| WatchError::ChannelClosed)?;
        }
        Ok(())
    }
}

impl Drop for RemoteWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PollTask {
    fs: Arc<dyn RemoteFs>,
    detector: ChangeDetector,
    events: mpsc::Sender<Notification>,
    cancel: CancellationToken,
    interval_rx: watch::Receiver<Duration>,
    state: Arc<watch::Sender<WatchState>>,
}

impl PollTask {
    fn set_state(&self, next: WatchState) {
        self.state.send_if_modified(|state| {
            if *state == next || *state == WatchState::Stopped {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Sends unless the watch is stopped first. Returns `false` if the
    /// notification was not delivered.
    async fn deliver(&self, notification: Notification) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.events.send(notification) => sent.is_ok(),
        }
    }

    /// Applies one observation. Returns `false` when the watch has ended.
    async fn settle(&mut self, observation: Observation) -> bool {
        let path = self.detector.path().to_owned();
        match self.detector.apply(observation) {
            CycleOutcome::Unchanged | CycleOutcome::Ignored => {
                self.set_state(self.detector.polling_state());
                true
            }
            CycleOutcome::MarkerOnly => {
                debug!(path = %path, "Marker changed, content identical");
                self.set_state(WatchState::Active);
                true
            }
            CycleOutcome::Modified(content) => {
                debug!(path = %path, bytes = content.len(), "Remote file modified");
                self.set_state(WatchState::Active);
                self.deliver(Notification::modified(content, true)).await
            }
            CycleOutcome::Deleted => {
                info!(path = %path, "Remote file deleted");
                self.set_state(WatchState::Deleted);
                self.deliver(Notification::deleted(true)).await;
                false
            }
            CycleOutcome::ConnectionLost {
                retry_count,
                max_retries,
            } => {
                warn!(path = %path, retry = retry_count, max_retries, "Connection lost");
                self.set_state(WatchState::Retrying);
                self.deliver(Notification::connection_lost(&path, retry_count, max_retries))
                    .await
            }
            CycleOutcome::Failed {
                retry_count,
                max_retries,
            } => {
                warn!(path = %path, retry = retry_count, "Retries exhausted, giving up");
                self.set_state(WatchState::Failed);
                if self
                    .deliver(Notification::connection_lost(&path, retry_count, max_retries))
                    .await
                {
                    self.deliver(Notification::connection_failed(&path)).await;
                }
                false
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn run_poll_loop(mut task: PollTask) {
    let mut interval = ticker(*task.interval_rx.borrow_and_update());

    loop {
        tokio::select! {
            biased;
            () = task.cancel.cancelled() => break,
            changed = task.interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *task.interval_rx.borrow_and_update();
                debug!(path = %task.detector.path(), interval_ms = period.as_millis(), "Poll interval changed");
                interval = ticker(period);
                continue;
            }
            _ = interval.tick() => {}
        }

        let observation = tokio::select! {
            biased;
            () = task.cancel.cancelled() => break,
            observation = task.detector.observe(task.fs.as_ref()) => observation,
        };
        if task.cancel.is_cancelled() {
            break;
        }
        if !task.settle(observation).await {
            break;
        }
    }

    debug!(path = %task.detector.path(), "Poll task finished");
}
