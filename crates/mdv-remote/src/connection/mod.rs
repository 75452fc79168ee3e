//! Protocol connections behind one capability interface.
//!
//! Every variant implements [`RemoteFs`]: read a file, fetch its
//! modification marker, list a directory. [`Connection`] is the closed set
//! of variants the registry hands out.
//!
//! # Lifecycle
//!
//! ```text
//! created ──connect──► connected ──disconnect──► disconnected
//!                          ▲                          │
//!                          └────────reconnect─────────┘
//! ```
//!
//! Operations on a connection that is not connected fail with
//! [`RemoteError::NotConnected`].

mod nfs;
mod sftp;
mod smb;

use async_trait::async_trait;
use mdv_core::{Credentials, DirEntry, ModifiedMarker, Protocol, RemoteConfig, RemoteTarget};

use crate::error::RemoteError;

pub use nfs::NfsConnection;
pub use sftp::SftpConnection;
pub use smb::SmbConnection;


/// Read access to files on a remote host.
///
/// Paths are remote absolute paths as carried in
/// [`RemoteTarget::resource_path`].
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// The protocol this connection speaks.
    fn protocol(&self) -> Protocol;

    /// Whether the connection is currently established.
    fn is_connected(&self) -> bool;

    /// Reads a whole file as UTF-8 text.
    async fn read_file(&self, path: &str) -> Result<String, RemoteError>;

    /// Returns the value used to detect changes cheaply.
    async fn modified_marker(&self, path: &str) -> Result<ModifiedMarker, RemoteError>;

    /// Lists a directory, keeping only directories and markdown files,
    /// directories first.
    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, RemoteError>;

    /// Returns `true` if `path` exists. Errors count as absent.
    async fn exists(&self, path: &str) -> bool {
        self.modified_marker(path).await.is_ok()
    }
}

/// Per-connection settings resolved from a target.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Host name or address.
    pub host: String,
    /// Port, defaulted from the protocol when the target has none.
    pub port: u16,
    /// SMB share name.
    pub share: Option<String>,
    /// NFS export name (first segment of the resource path).
    pub export: Option<String>,
    /// Credentials, absent for NFS.
    pub credentials: Option<Credentials>,
    /// Timeouts and helper programs.
    pub settings: RemoteConfig,
}

impl ConnectConfig {
    /// Resolves connection settings for a remote target.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::UnsupportedProtocol`] for local or unknown
    /// protocols, or [`RemoteError::Other`] when the target has no host or
    /// no port can be determined.
    pub fn from_target(
        target: &RemoteTarget,
        credentials: Option<Credentials>,
        settings: &RemoteConfig,
    ) -> Result<Self, RemoteError> {
        if !target.protocol.is_known_remote() {
            return Err(RemoteError::UnsupportedProtocol(
                target.protocol.to_string(),
            ));
        }
        let host = target
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RemoteError::other("target has no host"))?;
        let port = target
            .port
            .or_else(|| target.protocol.default_port())
            .ok_or_else(|| RemoteError::other("target has no port"))?;
        let export = if target.protocol == Protocol::Nfs {
            first_segment(&target.resource_path).map(str::to_owned)
        } else {
            None
        };

        Ok(Self {
            host,
            port,
            share: target.share.clone(),
            export,
            credentials,
            settings: settings.clone(),
        })
    }
}

fn first_segment(path: &str) -> Option<&str> {
    path.split('/').find(|s| !s.is_empty())
}

/// A connection of one of the supported protocols.
#[derive(Debug)]
pub enum Connection {
    /// SSH file transfer.
    Sftp(SftpConnection),
    /// Windows/Samba share via `smbclient`.
    Smb(SmbConnection),
    /// NFS export mounted to a temporary directory.
    Nfs(NfsConnection),
}

impl Connection {
    /// Creates an unconnected connection for `target`.
    ///
    /// `ssh` and `sftp` both select the SFTP variant.
    ///
    /// # Errors
    ///
    /// See [`ConnectConfig::from_target`].
    pub fn for_target(
        target: &RemoteTarget,
        credentials: Option<Credentials>,
        settings: &RemoteConfig,
    ) -> Result<Self, RemoteError> {
        let config = ConnectConfig::from_target(target, credentials, settings)?;
        match target.protocol {
            Protocol::Ssh | Protocol::Sftp => Ok(Self::Sftp(SftpConnection::new(config))),
            Protocol::Smb => Ok(Self::Smb(SmbConnection::new(config))),
            Protocol::Nfs => Ok(Self::Nfs(NfsConnection::new(config))),
            Protocol::Local | Protocol::Other(_) => Err(RemoteError::UnsupportedProtocol(
                target.protocol.to_string(),
            )),
        }
    }

    /// Establishes the connection. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns a connection, authentication, or mount error.
    pub async fn connect(&self) -> Result<(), RemoteError> {
        match self {
            Self::Sftp(c) => c.connect().await,
            Self::Smb(c) => c.connect().await,
            Self::Nfs(c) => c.connect().await,
        }
    }

    /// Tears the connection down. A no-op when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the protocol reported a failure while closing;
    /// the connection is considered disconnected regardless.
    pub async fn disconnect(&self) -> Result<(), RemoteError> {
        match self {
            Self::Sftp(c) => c.disconnect().await,
            Self::Smb(c) => c.disconnect().await,
            Self::Nfs(c) => c.disconnect().await,
        }
    }

    /// Disconnects, then connects again with the same settings.
    ///
    /// # Errors
    ///
    /// Returns the error from [`Connection::connect`].
    pub async fn reconnect(&self) -> Result<(), RemoteError> {
        if let Err(e) = self.disconnect().await {
            tracing::debug!(error = %e, "Ignoring disconnect failure before reconnect");
        }
        self.connect().await
    }

    fn inner(&self) -> &dyn RemoteFs {
        match self {
            Self::Sftp(c) => c,
            Self::Smb(c) => c,
            Self::Nfs(c) => c,
        }
    }
}

#[async_trait]
impl RemoteFs for Connection {
    fn protocol(&self) -> Protocol {
        self.inner().protocol()
    }

    fn is_connected(&self) -> bool {
        self.inner().is_connected()
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        self.inner().read_file(path).await
    }

    async fn modified_marker(&self, path: &str) -> Result<ModifiedMarker, RemoteError> {
        self.inner().modified_marker(path).await
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, RemoteError> {
        self.inner().list_directory(path).await
    }

    async fn exists(&self, path: &str) -> bool {
        self.inner().exists(path).await
    }
}
