//! Notifications delivered to the consumer.
//!
//! Every watch, local or remote, reports through one [`Notification`]
//! stream. The serialized form is the UI wire format:
//!
//! ```text
//! {"event": "file-changed",             "payload": {"type": "modified", "remote": true, "content": "..."}}
//! {"event": "file-changed",             "payload": {"type": "deleted", "remote": true}}
//! {"event": "remote-connection-lost",   "payload": {"path": "...", "retryCount": 1, "maxRetries": 3}}
//! {"event": "remote-connection-failed", "payload": {"path": "..."}}
//! {"event": "file-error",               "payload": {"message": "...", "path": "..."}}
//! ```

use serde::{Deserialize, Serialize};

/// Payload of a `file-changed` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileChange {
    /// The file has new content.
    Modified {
        /// Whether the file is remote.
        remote: bool,
        /// The full new content.
        content: String,
    },
    /// The file was removed.
    Deleted {
        /// Whether the file is remote.
        remote: bool,
    },
}

/// A notification emitted by a watch.
///
/// # Examples
///
/// ```
/// use mdv_watcher::Notification;
///
/// let lost = Notification::connection_lost("/docs/a.md", 1, 3);
/// assert_eq!(lost.name(), "remote-connection-lost");
/// assert!(!lost.is_terminal());
/// assert!(Notification::connection_failed("/docs/a.md").is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum Notification {
    /// The watched file changed or was deleted.
    FileChanged(FileChange),

    /// A check cycle hit a connection error; polling continues.
    #[serde(rename_all = "camelCase")]
    RemoteConnectionLost {
        /// Remote path being watched.
        path: String,
        /// Consecutive connection failures so far.
        retry_count: u32,
        /// Failures tolerated before giving up.
        max_retries: u32,
    },

    /// Retries are exhausted; the watch has stopped.
    RemoteConnectionFailed {
        /// Remote path that was being watched.
        path: String,
    },

    /// Reading the file failed.
    FileError {
        /// Human-readable description.
        message: String,
        /// Path of the file.
        path: String,
    },
}

impl Notification {
    /// A `file-changed` notification of type `modified`.
    #[must_use]
    pub fn modified(content: impl Into<String>, remote: bool) -> Self {
        Self::FileChanged(FileChange::Modified {
            remote,
            content: content.into(),
        })
    }

    /// A `file-changed` notification of type `deleted`.
    #[must_use]
    pub const fn deleted(remote: bool) -> Self {
        Self::FileChanged(FileChange::Deleted { remote })
    }

    /// A `remote-connection-lost` notification.
    #[must_use]
    pub fn connection_lost(path: impl Into<String>, retry_count: u32, max_retries: u32) -> Self {
        Self::RemoteConnectionLost {
            path: path.into(),
            retry_count,
            max_retries,
        }
    }

    /// A `remote-connection-failed` notification.
    #[must_use]
    pub fn connection_failed(path: impl Into<String>) -> Self {
        Self::RemoteConnectionFailed { path: path.into() }
    }

    /// A `file-error` notification.
    #[must_use]
    pub fn file_error(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::FileError {
            message: message.into(),
            path: path.into(),
        }
    }

    /// The wire name of this notification.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FileChanged(_) => "file-changed",
            Self::RemoteConnectionLost { .. } => "remote-connection-lost",
            Self::RemoteConnectionFailed { .. } => "remote-connection-failed",
            Self::FileError { .. } => "file-error",
        }
    }

    /// Returns `true` if the watch that sent this has ended.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FileChanged(FileChange::Deleted { remote: true }) | Self::RemoteConnectionFailed { .. }
        )
    }
}
