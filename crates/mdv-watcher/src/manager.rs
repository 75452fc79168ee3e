//! One active watch per consumer.
//!
//! [`WatchManager`] owns the consumer's notification stream and at most one
//! running watch, local or remote. Starting a watch replaces the previous
//! one; notifications still queued from the replaced watch are discarded.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use mdv_core::{RemoteTarget, WatchConfig, clamp_poll_interval, parse};
use mdv_remote::{ConnectionRegistry, RemoteFs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::WatchError;
use crate::events::Notification;
use crate::poller::{RemoteWatcher, WatchState};
use crate::watcher::LocalFileWatcher;

/// Capacity of the notification channel.
pub const NOTIFICATION_CAPACITY: usize = 100;

#[derive(Debug)]
enum ActiveWatch {
    Local(LocalFileWatcher),
    Remote(RemoteWatcher),
}

impl ActiveWatch {
    async fn shutdown(self) -> Result<(), WatchError> {
        match self {
            Self::Local(watcher) => watcher.shutdown().await,
            Self::Remote(watcher) => watcher.shutdown().await,
        }
    }
}

/// Starts, replaces, and stops watches for one consumer.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mdv_core::Config;
/// use mdv_remote::{ConnectionRegistry, CredentialManager, MemoryCredentialStore};
/// use mdv_watcher::WatchManager;
///
/// # async fn example() -> Result<(), mdv_watcher::WatchError> {
/// let config = Config::default();
/// let credentials = Arc::new(CredentialManager::new(
///     Arc::new(MemoryCredentialStore::new()),
///     config.remote.prompt_timeout(),
/// ));
/// let registry = Arc::new(ConnectionRegistry::new(credentials, config.remote.clone()));
/// let mut manager = WatchManager::new(registry, config.watch);
///
/// manager.watch("sftp://alice:pw@docs.example.com/notes.md").await?;
/// while let Some(notification) = manager.recv().await {
///     if notification.is_terminal() {
///         break;
///     }
/// }
/// manager.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct WatchManager {
    registry: Arc<ConnectionRegistry>,
    config: WatchConfig,
    active: Option<ActiveWatch>,
    events_tx: mpsc::Sender<Notification>,
    events_rx: mpsc::Receiver<Notification>,
}

impl std::fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("config", &self.config)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl WatchManager {
    /// Creates a manager with no active watch.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, config: WatchConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        Self {
            registry,
            config,
            active: None,
            events_tx,
            events_rx,
        }
    }

    /// Parses `input` and watches it locally or remotely.
    ///
    /// # Errors
    ///
    /// See [`WatchManager::watch_local`] and [`WatchManager::watch_remote`].
    pub async fn watch(&mut self, input: &str) -> Result<(), WatchError> {
        let target = parse(input);
        if target.is_local() {
            self.watch_local(Utf8Path::new(&target.resource_path)).await
        } else {
            self.watch_remote(&target).await
        }
    }

    /// Replaces the active watch with a debounced watch on a local file.
    ///
    /// # Errors
    ///
    /// [`WatchError::LiveUpdatesDisabled`] when live updates are off, or the
    /// error from [`LocalFileWatcher::new`].
    pub async fn watch_local(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        self.ensure_enabled()?;
        self.stop().await;

        let watcher = LocalFileWatcher::new(path, &self.config, self.events_tx.clone())?;
        info!(path = %watcher.file_path(), "Watching local file");
        self.active = Some(ActiveWatch::Local(watcher));
        Ok(())
    }

    /// Connects through the registry and polls the target's file.
    ///
    /// # Errors
    ///
    /// [`WatchError::LiveUpdatesDisabled`], a connect error, or an initial
    /// fetch error (which is also reported as a `file-error` notification).
    pub async fn watch_remote(&mut self, target: &RemoteTarget) -> Result<(), WatchError> {
        self.ensure_enabled()?;
        let connection = self.registry.connect(target, None).await?;
        self.watch_connection(connection, &target.resource_path).await
    }

    /// Polls `path` through an already established connection.
    ///
    /// # Errors
    ///
    /// [`WatchError::LiveUpdatesDisabled`] or an initial fetch error.
    pub async fn watch_connection(
        &mut self,
        fs: Arc<dyn RemoteFs>,
        path: &str,
    ) -> Result<(), WatchError> {
        self.ensure_enabled()?;
        self.stop().await;

        let watcher = RemoteWatcher::start(fs, path, &self.config, self.events_tx.clone()).await?;
        self.active = Some(ActiveWatch::Remote(watcher));
        Ok(())
    }

    /// Stops the active watch, if any, and discards its queued notifications.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if let Err(e) = active.shutdown().await {
            warn!(error = %e, "Watch did not shut down cleanly");
        }

        let mut discarded = 0_usize;
        while self.events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        debug!(discarded, "Watch stopped");
    }

    /// Sets the poll interval for the active remote watch and any later one.
    /// Returns the clamped interval.
    pub fn set_poll_interval(&mut self, ms: u64) -> Duration {
        self.config.poll_interval_ms = ms;
        match &self.active {
            Some(ActiveWatch::Remote(watcher)) => watcher.set_poll_interval(ms),
            _ => clamp_poll_interval(ms),
        }
    }

    /// The interval that remote watches use.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    /// Turns live updates on or off. Turning them off stops the active watch.
    pub async fn set_enabled(&mut self, enabled: bool) {
        self.config.live_updates = enabled;
        if !enabled {
            self.stop().await;
        }
    }

    /// Returns `true` if live updates are on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.live_updates
    }

    /// Waits for the next notification.
    ///
    /// The manager keeps a sender alive, so this only returns `None` if the
    /// channel is closed from this side. With no active watch it waits.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.events_rx.recv().await
    }

    /// Returns a queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.events_rx.try_recv().ok()
    }

    /// State of the active remote watch. `None` for local or no watch.
    #[must_use]
    pub fn state(&self) -> Option<WatchState> {
        match &self.active {
            Some(ActiveWatch::Remote(watcher)) => Some(watcher.state()),
            _ => None,
        }
    }

    /// Returns `true` if a watch is active.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.active.is_some()
    }

    /// Returns `true` if the active watch is remote.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.active, Some(ActiveWatch::Remote(_)))
    }

    fn ensure_enabled(&self) -> Result<(), WatchError> {
        if self.config.live_updates {
            Ok(())
        } else {
            Err(WatchError::LiveUpdatesDisabled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mdv_core::{DirEntry, ModifiedMarker, Protocol, RemoteConfig};
    use mdv_remote::{CredentialProvider, RemoteError};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct NoCredentials;

    #[async_trait]
    impl CredentialProvider for NoCredentials {
        async fn get_credentials(&self, _target: &RemoteTarget) -> Option<mdv_core::Credentials> {
            None
        }
    }

    /// A single remote file that tests can edit or break.
    struct EditableFs {
        content: Mutex<String>,
        marker: AtomicU64,
        broken: AtomicBool,
    }

    impl EditableFs {
        fn new(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: Mutex::new(content.to_owned()),
                marker: AtomicU64::new(1_000),
                broken: AtomicBool::new(false),
            })
        }

        fn edit(&self, content: &str) {
            *self.content.lock() = content.to_owned();
            self.marker.fetch_add(1_000, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), RemoteError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(RemoteError::connection_lost("connection reset"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteFs for EditableFs {
        fn protocol(&self) -> Protocol {
            Protocol::Sftp
        }

        fn is_connected(&self) -> bool {
            !self.broken.load(Ordering::SeqCst)
        }

        async fn read_file(&self, _path: &str) -> Result<String, RemoteError> {
            self.check()?;
            Ok(self.content.lock().clone())
        }

        async fn modified_marker(&self, _path: &str) -> Result<ModifiedMarker, RemoteError> {
            self.check()?;
            Ok(ModifiedMarker::from_millis(self.marker.load(Ordering::SeqCst)))
        }

        async fn list_directory(&self, _path: &str) -> Result<Vec<DirEntry>, RemoteError> {
            Ok(Vec::new())
        }
    }

    fn manager(config: WatchConfig) -> WatchManager {
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(NoCredentials),
            RemoteConfig::default(),
        ));
        WatchManager::new(registry, config)
    }

    async fn next(manager: &mut WatchManager) -> Notification {
        tokio::time::timeout(Duration::from_secs(60), manager.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_modification_is_delivered() {
        let fs = EditableFs::new("v1");
        let mut manager = manager(WatchConfig::default());
        manager.watch_connection(Arc::<EditableFs>::clone(&fs), "/docs/a.md").await.unwrap();
        assert!(manager.is_remote());
        assert_eq!(manager.state(), Some(WatchState::Active));

        fs.edit("v2");
        assert_eq!(next(&mut manager).await, Notification::modified("v2", true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_refuses_to_watch() {
        let mut manager = manager(WatchConfig {
            live_updates: false,
            ..WatchConfig::default()
        });
        let err = manager
            .watch_connection(EditableFs::new("x"), "/docs/a.md")
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::LiveUpdatesDisabled));
        assert!(!manager.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_enabled_false_stops_active_watch() {
        let mut manager = manager(WatchConfig::default());
        manager
            .watch_connection(EditableFs::new("x"), "/docs/a.md")
            .await
            .unwrap();

        manager.set_enabled(false).await;
        assert!(!manager.is_enabled());
        assert!(!manager.is_watching());
        assert_eq!(manager.state(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_queued_notifications() {
        let fs = EditableFs::new("v1");
        let mut manager = manager(WatchConfig::default());
        manager.watch_connection(Arc::<EditableFs>::clone(&fs), "/docs/a.md").await.unwrap();

        fs.edit("v2");
        tokio::time::sleep(Duration::from_secs(5)).await;
        manager.stop().await;
        assert!(manager.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_is_remembered() {
        let mut manager = manager(WatchConfig::default());
        assert_eq!(manager.set_poll_interval(100), Duration::from_millis(500));
        assert_eq!(manager.poll_interval(), Duration::from_millis(500));

        manager
            .watch_connection(EditableFs::new("x"), "/docs/a.md")
            .await
            .unwrap();
        let Some(ActiveWatch::Remote(watcher)) = &manager.active else {
            panic!("expected remote watch");
        };
        assert_eq!(watcher.poll_interval(), Duration::from_millis(500));

        assert_eq!(manager.set_poll_interval(7_000), Duration::from_millis(7_000));
        let Some(ActiveWatch::Remote(watcher)) = &manager.active else {
            panic!("expected remote watch");
        };
        assert_eq!(watcher.poll_interval(), Duration::from_millis(7_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_reports_file_error() {
        let fs = EditableFs::new("x");
        fs.broken.store(true, Ordering::SeqCst);
        let mut manager = manager(WatchConfig::default());

        let err = manager
            .watch_connection(fs, "/docs/a.md")
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(!manager.is_watching());
        assert!(matches!(
            manager.try_recv(),
            Some(Notification::FileError { path, .. }) if path == "/docs/a.md"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_is_reported_until_failure() {
        let fs = EditableFs::new("x");
        let mut manager = manager(WatchConfig {
            max_retries: 2,
            ..WatchConfig::default()
        });
        manager.watch_connection(Arc::<EditableFs>::clone(&fs), "/docs/a.md").await.unwrap();

        fs.broken.store(true, Ordering::SeqCst);
        assert_eq!(
            next(&mut manager).await,
            Notification::connection_lost("/docs/a.md", 1, 2)
        );
        assert_eq!(
            next(&mut manager).await,
            Notification::connection_lost("/docs/a.md", 2, 2)
        );
        assert!(next(&mut manager).await.is_terminal());
        assert_eq!(manager.state(), Some(WatchState::Failed));
    }

    #[tokio::test]
    async fn test_local_watch_replaces_remote_watch() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = Utf8Path::from_path(dir.path()).unwrap().join("a.md");
        std::fs::write(&file, "# local").unwrap();

        let mut manager = manager(WatchConfig::default());
        manager
            .watch_connection(EditableFs::new("x"), "/docs/a.md")
            .await
            .unwrap();
        manager.watch(file.as_str()).await.unwrap();

        assert!(manager.is_watching());
        assert!(!manager.is_remote());
        assert_eq!(manager.state(), None);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_watch_missing_local_file() {
        let mut manager = manager(WatchConfig::default());
        let err = manager.watch("/nonexistent/a.md").await.unwrap_err();
        assert!(matches!(err, WatchError::PathNotFound(_)));
    }
}
