//! The process-wide table of live connections.
//!
//! Connections are keyed by `protocol://host:port` and shared as
//! `Arc<Connection>`. The table lock is never held across an await: a
//! connect runs unlocked and its result is inserted afterwards. If two
//! connects to the same key race, the first one to finish is kept. The
//! later one finds a live entry, disconnects its own connection, and
//! returns the kept one, so no caller is ever handed a closed connection.

use std::sync::Arc;

use futures_util::future::join_all;
use mdv_core::{ConnectionKey, Credentials, DirEntry, Protocol, RemoteConfig, RemoteTarget, parse};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::connection::{Connection, RemoteFs};
use crate::credentials::CredentialProvider;
use crate::error::RemoteError;

/// The result of [`ConnectionRegistry::open_file`].
#[derive(Debug)]
pub enum OpenedFile {
    /// A local path, untouched. The caller reads it.
    Local {
        /// The path as given.
        path: String,
    },
    /// A remote file and the connection it was read through.
    Remote {
        /// Parsed target, credentials removed.
        target: RemoteTarget,
        /// File content.
        content: String,
        /// The live connection.
        connection: Arc<Connection>,
    },
}

/// Creates, caches, and closes connections.
pub struct ConnectionRegistry {
    connections: Mutex<FxHashMap<ConnectionKey, Arc<Connection>>>,
    credentials: Arc<dyn CredentialProvider>,
    settings: RemoteConfig,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialProvider>, settings: RemoteConfig) -> Self {
        Self {
            connections: Mutex::new(FxHashMap::default()),
            credentials,
            settings,
        }
    }

    /// Returns a live connection for `target`, creating one if needed.
    ///
    /// Credentials are taken from `provided`, then from the target itself,
    /// then from the credential provider. NFS connects without credentials.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::UnsupportedProtocol`] for local or unknown targets
    /// - [`RemoteError::AuthenticationCancelled`] if the provider returns none
    /// - any connect error from the protocol variant
    pub async fn connect(
        &self,
        target: &RemoteTarget,
        provided: Option<Credentials>,
    ) -> Result<Arc<Connection>, RemoteError> {
        let key = target
            .connection_key()
            .ok_or_else(|| RemoteError::UnsupportedProtocol(target.protocol.to_string()))?;
        if !target.protocol.is_known_remote() {
            return Err(RemoteError::UnsupportedProtocol(target.protocol.to_string()));
        }

        if let Some(existing) = self.live(&key) {
            debug!(key = %key, "Reusing connection");
            return Ok(existing);
        }

        let credentials = self.resolve_credentials(target, provided).await?;
        let connection = Arc::new(Connection::for_target(target, credentials, &self.settings)?);
        connection.connect().await?;

        let winner = {
            let mut connections = self.connections.lock();
            match connections.get(&key).filter(|c| c.is_connected()) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    connections.insert(key.clone(), Arc::clone(&connection));
                    None
                }
            }
        };

        if let Some(existing) = winner {
            debug!(key = %key, "Concurrent connect finished first, closing duplicate");
            if let Err(e) = connection.disconnect().await {
                warn!(key = %key, error = %e, "Failed to close duplicate connection");
            }
            return Ok(existing);
        }

        info!(key = %key, "Connected");
        Ok(connection)
    }

    /// Opens a path or URI. Local inputs are returned untouched; remote
    /// ones are connected and read.
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::connect`] and [`RemoteFs::read_file`].
    pub async fn open_file(
        &self,
        input: &str,
        provided: Option<Credentials>,
    ) -> Result<OpenedFile, RemoteError> {
        let target = parse(input);
        if target.is_local() {
            return Ok(OpenedFile::Local { path: input.to_owned() });
        }

        let connection = self.connect(&target, provided).await?;
        let content = connection.read_file(&target.resource_path).await?;
        Ok(OpenedFile::Remote {
            target: target.without_credentials(),
            content,
            connection,
        })
    }

    /// Lists a directory through an existing connection.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotConnected`] if there is no live connection
    /// for the target, or the listing error.
    pub async fn list_directory(&self, target: &RemoteTarget) -> Result<Vec<DirEntry>, RemoteError> {
        let connection = self.get_client(target).ok_or(RemoteError::NotConnected)?;
        connection.list_directory(&target.resource_path).await
    }

    /// Returns the live connection for a target, if any.
    #[must_use]
    pub fn get_client(&self, target: &RemoteTarget) -> Option<Arc<Connection>> {
        self.live(&target.connection_key()?)
    }

    /// Disconnects and forgets the connection for a target.
    ///
    /// # Errors
    ///
    /// Returns the disconnect error; the entry is removed regardless.
    pub async fn close_client(&self, target: &RemoteTarget) -> Result<(), RemoteError> {
        let Some(key) = target.connection_key() else {
            return Ok(());
        };
        let removed = self.connections.lock().remove(&key);
        match removed {
            Some(connection) => {
                connection.disconnect().await?;
                info!(key = %key, "Disconnected");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Disconnects everything concurrently. Errors are logged, not returned.
    pub async fn close_all(&self) {
        let drained: Vec<(ConnectionKey, Arc<Connection>)> =
            self.connections.lock().drain().collect();
        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        let closing = drained.into_iter().map(|(key, connection)| async move {
            if let Err(e) = connection.disconnect().await {
                warn!(key = %key, error = %e, "Error while disconnecting");
            }
        });
        join_all(closing).await;
        info!(count, "Closed all connections");
    }

    /// Number of cached connections, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if no connections are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    fn live(&self, key: &ConnectionKey) -> Option<Arc<Connection>> {
        self.connections
            .lock()
            .get(key)
            .filter(|c| c.is_connected())
            .cloned()
    }

    async fn resolve_credentials(
        &self,
        target: &RemoteTarget,
        provided: Option<Credentials>,
    ) -> Result<Option<Credentials>, RemoteError> {
        if target.protocol == Protocol::Nfs {
            return Ok(None);
        }
        if let Some(credentials) = provided {
            return Ok(Some(credentials));
        }
        if let Some(username) = &target.username {
            let mut credentials = Credentials::username_only(username.clone());
            credentials.password = target.password.clone();
            return Ok(Some(credentials));
        }
        self.credentials
            .get_credentials(target)
            .await
            .map(Some)
            .ok_or(RemoteError::AuthenticationCancelled)
    }
}
