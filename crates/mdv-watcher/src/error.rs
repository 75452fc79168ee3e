//! Error types for the mdv-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors raised while
//! starting or stopping a watch. Errors that happen inside a running watch
//! are reported as notifications, not returned.

use camino::Utf8PathBuf;
use mdv_remote::{ErrorClass, RemoteError};

/// Errors that can occur when starting or stopping a watch.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the OS watcher is unavailable
/// - **Path not found** ([`WatchError::PathNotFound`]): Fatal - the file must exist
/// - **Channel closed** ([`WatchError::ChannelClosed`]): Fatal - the watcher task died
/// - **Disabled** ([`WatchError::LiveUpdatesDisabled`]): Recoverable - re-enable and retry
/// - **Remote errors** ([`WatchError::Remote`]): Recoverable when connection-class
/// - **I/O errors** ([`WatchError::Io`]): Fatal - propagate immediately
///
/// # Examples
///
/// ```
/// use mdv_watcher::WatchError;
/// use mdv_remote::RemoteError;
///
/// let err = WatchError::from(RemoteError::connection_lost("refused"));
/// assert!(err.is_recoverable());
/// assert!(WatchError::path_not_found("/gone.md").is_fatal());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The file to watch does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The watcher task ended unexpectedly.
    #[error("watcher task ended unexpectedly")]
    ChannelClosed,

    /// Live updates are switched off.
    #[error("live updates are disabled")]
    LiveUpdatesDisabled,

    /// The remote side failed while starting the watch.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Returns `true` if retrying the same watch later may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::LiveUpdatesDisabled => true,
            Self::Remote(e) => e.class() == ErrorClass::Connection,
            Self::Notify(_) | Self::PathNotFound(_) | Self::ChannelClosed | Self::Io(_) => false,
        }
    }

    /// Returns `true` if this error is fatal.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the local file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_path_not_found() {
        let err = WatchError::path_not_found("notes/missing.md");
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("notes/missing.md"));
        assert_eq!(err.to_string(), "path does not exist: notes/missing.md");
    }

    #[test]
    fn test_remote_recoverability_follows_class() {
        assert!(WatchError::from(RemoteError::NotConnected).is_recoverable());
        assert!(WatchError::from(RemoteError::not_found("/a.md")).is_fatal());
        assert!(WatchError::from(RemoteError::AuthenticationCancelled).is_fatal());
    }

    #[test]
    fn test_remote_display_is_transparent() {
        let err = WatchError::from(RemoteError::not_found("/a.md"));
        assert_eq!(err.to_string(), "not found: /a.md");
    }

    #[test]
    fn test_io_error() {
        let err = WatchError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(err.is_fatal());
        assert!(err.path().is_none());
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_disabled_is_recoverable() {
        assert!(WatchError::LiveUpdatesDisabled.is_recoverable());
        assert!(WatchError::ChannelClosed.is_fatal());
    }
}
