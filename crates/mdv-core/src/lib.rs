//! Core types, target parsing, and configuration for mdview remote access.
//!
//! This crate is free of I/O. It provides:
//!
//! - The target parser ([`parse`], [`is_remote`], [`build_url`])
//! - Domain types ([`RemoteTarget`], [`Credentials`], [`DirEntry`], [`ModifiedMarker`])
//! - Content hashing ([`ContentHash`])
//! - Configuration ([`Config`], [`WatchConfig`], [`RemoteConfig`])
//!
//! # Crate Dependencies
//!
//! ```text
//! mdv-cli ──► mdv-watcher ──► mdv-remote ──► mdv-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod digest;
pub mod error;
pub mod parser;
pub mod types;

pub use config::{
    Config, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_MS,
    MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS, RemoteConfig, WatchConfig, clamp_poll_interval,
};
pub use digest::ContentHash;
pub use error::ConfigError;
pub use parser::{build_url, is_remote, parse};
pub use types::{
    ConnectionKey, Credentials, DirEntry, MARKDOWN_EXTENSIONS, ModifiedMarker, Protocol,
    RemoteTarget, is_markdown_name, join_remote_path, normalize_listing,
};
