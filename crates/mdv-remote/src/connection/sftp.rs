//! SFTP over SSH, using libssh2.
//!
//! libssh2 is blocking, so every session call runs on tokio's blocking pool.
//! The marker is the server-reported modification time.

use std::fmt;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mdv_core::{Credentials, DirEntry, ModifiedMarker, Protocol, normalize_listing};
use parking_lot::Mutex;
use ssh2::{ErrorCode, Session, Sftp};
use tracing::{debug, info};

use super::{ConnectConfig, RemoteFs};
use crate::error::RemoteError;

/// `LIBSSH2_FX_NO_SUCH_FILE`
const FX_NO_SUCH_FILE: i32 = 2;
/// `LIBSSH2_FX_PERMISSION_DENIED`
const FX_PERMISSION_DENIED: i32 = 3;
/// `LIBSSH2_FX_NO_CONNECTION`
const FX_NO_CONNECTION: i32 = 6;
/// `LIBSSH2_FX_CONNECTION_LOST`
const FX_CONNECTION_LOST: i32 = 7;
/// `LIBSSH2_FX_NO_SUCH_PATH`
const FX_NO_SUCH_PATH: i32 = 10;

struct SftpSession {
    session: Session,
    sftp: Sftp,
}

type SharedSession = Arc<Mutex<SftpSession>>;

/// A connection to an SSH server's SFTP subsystem.
pub struct SftpConnection {
    config: ConnectConfig,
    session: Mutex<Option<SharedSession>>,
}

impl SftpConnection {
    pub(crate) fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub(crate) async fn connect(&self) -> Result<(), RemoteError> {
        if self.is_connected() {
            return Ok(());
        }

        let config = self.config.clone();
        let established = tokio::task::spawn_blocking(move || establish(&config))
            .await
            .map_err(|e| RemoteError::other(format!("SFTP connect task failed: {e}")))??;

        *self.session.lock() = Some(Arc::new(Mutex::new(established)));
        info!(host = %self.config.host, port = self.config.port, "SFTP session established");
        Ok(())
    }

    pub(crate) async fn disconnect(&self) -> Result<(), RemoteError> {
        let Some(shared) = self.session.lock().take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || {
            let guard = shared.lock();
            guard
                .session
                .disconnect(None, "closing", None)
                .map_err(|e| RemoteError::connection_lost(format!("SSH disconnect failed: {e}")))
        })
        .await
        .map_err(|e| RemoteError::other(format!("SFTP disconnect task failed: {e}")))??;

        debug!(host = %self.config.host, "SFTP session closed");
        Ok(())
    }

    /// Runs `op` against the live SFTP channel on the blocking pool.
    async fn with_sftp<T, F>(&self, op: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T, RemoteError> + Send + 'static,
    {
        let shared = self
            .session
            .lock()
            .clone()
            .ok_or(RemoteError::NotConnected)?;

        tokio::task::spawn_blocking(move || {
            let guard = shared.lock();
            op(&guard.sftp)
        })
        .await
        .map_err(|e| RemoteError::other(format!("SFTP task failed: {e}")))?
    }
}

impl fmt::Debug for SftpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl RemoteFs for SftpConnection {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        let path = path.to_owned();
        self.with_sftp(move |sftp| {
            let mut file = sftp
                .open(Path::new(&path))
                .map_err(|e| map_ssh_error(&path, &e))?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .map_err(|e| RemoteError::from_io(path.as_str(), e))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
        .await
    }

    async fn modified_marker(&self, path: &str) -> Result<ModifiedMarker, RemoteError> {
        let path = path.to_owned();
        self.with_sftp(move |sftp| {
            let stat = sftp
                .stat(Path::new(&path))
                .map_err(|e| map_ssh_error(&path, &e))?;
            stat.mtime
                .map(ModifiedMarker::from_unix_secs)
                .ok_or_else(|| RemoteError::other(format!("server reported no mtime for {path}")))
        })
        .await
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, RemoteError> {
        let dir = path.to_owned();
        self.with_sftp(move |sftp| {
            let raw = sftp
                .readdir(Path::new(&dir))
                .map_err(|e| map_ssh_error(&dir, &e))?;
            let entries = raw.into_iter().filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                Some(
                    DirEntry::new(&dir, name, stat.is_dir())
                        .with_size(stat.size)
                        .with_modified(stat.mtime.map(|secs| secs.saturating_mul(1000))),
                )
            });
            Ok(normalize_listing(entries))
        })
        .await
    }
}

fn establish(config: &ConnectConfig) -> Result<SftpSession, RemoteError> {
    let endpoint = format!("{}:{}", config.host, config.port);
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| RemoteError::connection_lost(format!("cannot resolve {endpoint}: {e}")))?
        .next()
        .ok_or_else(|| RemoteError::connection_lost(format!("no address for {endpoint}")))?;

    let timeout = config.settings.connect_timeout();
    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| RemoteError::connection_lost(format!("connect to {endpoint} failed: {e}")))?;

    let mut session = Session::new()
        .map_err(|e| RemoteError::other(format!("SSH session init failed: {e}")))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| RemoteError::connection_lost(format!("SSH handshake failed: {e}")))?;

    authenticate(&session, config.credentials.as_ref())?;

    let sftp = session
        .sftp()
        .map_err(|e| RemoteError::other(format!("SFTP subsystem unavailable: {e}")))?;
    Ok(SftpSession { session, sftp })
}

/// Tries a private key, then a password, then the SSH agent.
fn authenticate(session: &Session, credentials: Option<&Credentials>) -> Result<(), RemoteError> {
    let credentials = credentials
        .ok_or_else(|| RemoteError::AuthenticationFailed("no credentials supplied".to_owned()))?;
    let user = credentials.username.as_str();

    let attempt = if let Some(key) = &credentials.private_key {
        session.userauth_pubkey_memory(user, None, key, credentials.passphrase.as_deref())
    } else if let Some(password) = &credentials.password {
        session.userauth_password(user, password)
    } else {
        session.userauth_agent(user)
    };

    attempt.map_err(|e| RemoteError::AuthenticationFailed(e.message().to_owned()))?;
    if !session.authenticated() {
        return Err(RemoteError::AuthenticationFailed(format!(
            "server rejected credentials for {user}"
        )));
    }
    Ok(())
}

fn map_ssh_error(path: &str, err: &ssh2::Error) -> RemoteError {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH) => RemoteError::not_found(path),
        ErrorCode::SFTP(FX_PERMISSION_DENIED) => RemoteError::permission_denied(path),
        ErrorCode::SFTP(FX_NO_CONNECTION | FX_CONNECTION_LOST) | ErrorCode::Session(_) => {
            RemoteError::connection_lost(format!("{path}: {err}"))
        }
        ErrorCode::SFTP(_) => RemoteError::other(format!("{path}: {err}")),
    }
}
