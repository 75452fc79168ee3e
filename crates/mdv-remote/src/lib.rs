//! Remote file access for mdview.
//!
//! This crate provides:
//!
//! - [`RemoteFs`] - the capability interface every connection implements
//! - [`Connection`] - the SFTP, SMB, and NFS variants
//! - [`ConnectionRegistry`] - the shared table of live connections
//! - [`CredentialManager`] - cached, stored, and prompted credentials
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mdv_core::RemoteConfig;
//! use mdv_remote::{
//!     ConnectionRegistry, CredentialManager, MemoryCredentialStore, OpenedFile,
//! };
//!
//! # async fn example() -> Result<(), mdv_remote::RemoteError> {
//! let settings = RemoteConfig::default();
//! let credentials = Arc::new(CredentialManager::new(
//!     Arc::new(MemoryCredentialStore::new()),
//!     settings.prompt_timeout(),
//! ));
//! let registry = ConnectionRegistry::new(credentials, settings);
//!
//! if let OpenedFile::Remote { content, .. } =
//!     registry.open_file("sftp://alice:pw@docs.example.com/notes.md", None).await?
//! {
//!     println!("{content}");
//! }
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod connection;
pub mod credentials;
pub mod error;
pub mod registry;

pub use connection::{
    ConnectConfig, Connection, NfsConnection, RemoteFs, SftpConnection, SmbConnection,
};
pub use credentials::{
    CredentialManager, CredentialPrompter, CredentialProvider, CredentialStore,
    MemoryCredentialStore, PromptRequest, PromptResponse,
};
pub use error::{ErrorClass, RemoteError};
pub use registry::{ConnectionRegistry, OpenedFile};
