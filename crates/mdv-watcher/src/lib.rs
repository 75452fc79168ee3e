//! Change detection for files shown by mdview.
//!
//! Remote files are polled: each cycle compares a cheap modification marker
//! and, only when it moved, a content hash. Local files are watched with
//! `notify`, debounced through `notify-debouncer-mini`. Both report through
//! the same [`Notification`] stream.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   watch(input)  │ WatchManager                 │  recv() / try_recv()
//!  ─────────────► │  one active watch            │ ◄────────────────────
//!                 └──────┬───────────────┬───────┘
//!                        │               │
//!              local     ▼               ▼     remote
//! ┌────────────────────────────┐   ┌──────────────────────────────────┐
//! │ LocalFileWatcher           │   │ RemoteWatcher (tokio task)       │
//! │  notify + debouncer        │   │  interval ─► ChangeDetector      │
//! │  (spawn_blocking)          │   │   marker ─► content ─► hash      │
//! └─────────────┬──────────────┘   └────────────────┬─────────────────┘
//!               │ blocking_send                     │ send
//!               └──────────────► mpsc ◄─────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! mdv-cli ──► mdv-watcher ──► mdv-remote ──► mdv-core
//! ```
//!
//! # Remote watch lifecycle
//!
//! ```text
//! Initializing ─► Active ◄──► Retrying ─► Failed
//!                   │            │
//!                   ▼            ▼
//!                Deleted      Stopped (from any non-terminal state)
//! ```
//!
//! A connection-class error bumps the retry counter and emits
//! `remote-connection-lost`; reaching the limit emits
//! `remote-connection-failed` and ends the watch. A not-found error ends the
//! watch with a remote `deleted` change. Any successful check resets the
//! counter.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mdv_core::WatchConfig;
//! use mdv_remote::RemoteFs;
//! use mdv_watcher::{Notification, RemoteWatcher};
//! use tokio::sync::mpsc;
//!
//! # async fn example(connection: Arc<dyn RemoteFs>) -> Result<(), mdv_watcher::WatchError> {
//! let (tx, mut rx) = mpsc::channel(100);
//! let watcher = RemoteWatcher::start(connection, "/docs/a.md", &WatchConfig::default(), tx).await?;
//!
//! while let Some(notification) = rx.recv().await {
//!     match &notification {
//!         Notification::FileChanged(change) => println!("{change:?}"),
//!         other if other.is_terminal() => break,
//!         other => println!("{}", other.name()),
//!     }
//! }
//! watcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod manager;
pub mod poller;
pub mod watcher;

pub use error::WatchError;
pub use events::{FileChange, Notification};
pub use filter::{FileFilter, SingleFileFilter};
pub use manager::{NOTIFICATION_CAPACITY, WatchManager};
pub use poller::{ChangeDetector, CycleOutcome, Observation, RemoteWatcher, WatchState};
pub use watcher::LocalFileWatcher;
