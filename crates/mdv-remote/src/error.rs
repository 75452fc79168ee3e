//! Error types for the mdv-remote crate.
//!
//! [`RemoteError`] covers connection establishment, file access, and
//! credential resolution. [`RemoteError::class`] reduces it to the three
//! classes a change detector acts on.
//!
//! # Error Recovery Strategy
//!
//! - **Not found** ([`ErrorClass::NotFound`]): the resource is gone; terminal
//! - **Connection** ([`ErrorClass::Connection`]): link refused or dropped; retry
//! - **Other** ([`ErrorClass::Other`]): log and carry on
//!
//! # Examples
//!
//! ```
//! use mdv_remote::{ErrorClass, RemoteError};
//! use std::io;
//!
//! let err = RemoteError::from_io("/docs/a.md", io::Error::from(io::ErrorKind::ConnectionReset));
//! assert_eq!(err.class(), ErrorClass::Connection);
//!
//! let gone = RemoteError::not_found("/docs/a.md");
//! assert_eq!(gone.class(), ErrorClass::NotFound);
//! ```

use std::io;

/// How a failure should be treated by code that polls a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The resource was removed.
    NotFound,
    /// The connection was refused, dropped, timed out, or is not established.
    Connection,
    /// Anything else.
    Other,
}

/// Errors raised by remote connections and the registry.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The remote resource does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// Remote path that was requested.
        path: String,
    },

    /// Access to the remote resource was denied.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// Remote path that was requested.
        path: String,
    },

    /// The connection was refused, dropped, or timed out.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The connection is not established (never connected or disconnected).
    #[error("not connected")]
    NotConnected,

    /// The user declined, or did not answer, the credential prompt.
    #[error("authentication cancelled")]
    AuthenticationCancelled,

    /// The server rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Mounting an NFS export failed.
    #[error("NFS mount failed: {0}")]
    MountFailed(String),

    /// No connection variant handles this protocol.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// An I/O error that does not map onto a more specific variant.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Any other failure reported by a protocol backend.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Creates a new [`RemoteError::NotFound`] error.
    #[inline]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a new [`RemoteError::PermissionDenied`] error.
    #[inline]
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// Creates a new [`RemoteError::ConnectionLost`] error.
    #[inline]
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    /// Creates a new [`RemoteError::Other`] error.
    #[inline]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Maps an I/O error to the most specific variant.
    pub fn from_io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
            | io::ErrorKind::StaleNetworkFileHandle => {
                Self::ConnectionLost(format!("{path}: {source}"))
            }
            _ => Self::Io { path, source },
        }
    }

    /// Returns the class used by change detection.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::ConnectionLost(_) | Self::NotConnected => ErrorClass::Connection,
            Self::PermissionDenied { .. }
            | Self::AuthenticationCancelled
            | Self::AuthenticationFailed(_)
            | Self::MountFailed(_)
            | Self::UnsupportedProtocol(_)
            | Self::Io { .. }
            | Self::Other(_) => ErrorClass::Other,
        }
    }

    /// Returns the remote path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path } | Self::PermissionDenied { path } | Self::Io { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classification() {
        let cases = [
            (io::ErrorKind::NotFound, ErrorClass::NotFound),
            (io::ErrorKind::ConnectionRefused, ErrorClass::Connection),
            (io::ErrorKind::TimedOut, ErrorClass::Connection),
            (io::ErrorKind::BrokenPipe, ErrorClass::Connection),
            (io::ErrorKind::PermissionDenied, ErrorClass::Other),
            (io::ErrorKind::InvalidData, ErrorClass::Other),
        ];
        for (kind, class) in cases {
            let err = RemoteError::from_io("/x.md", io::Error::from(kind));
            assert_eq!(err.class(), class, "kind: {kind:?}");
        }
    }

    #[test]
    fn test_not_connected_is_connection_class() {
        assert_eq!(RemoteError::NotConnected.class(), ErrorClass::Connection);
    }

    #[test]
    fn test_path_accessor() {
        assert_eq!(RemoteError::not_found("/a.md").path(), Some("/a.md"));
        assert_eq!(RemoteError::permission_denied("/b.md").path(), Some("/b.md"));
        assert!(RemoteError::AuthenticationCancelled.path().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(RemoteError::not_found("/a.md").to_string(), "not found: /a.md");
        assert_eq!(
            RemoteError::MountFailed("exit status 32".to_owned()).to_string(),
            "NFS mount failed: exit status 32"
        );
    }
}
