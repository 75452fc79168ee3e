//! Configuration structures for remote access and live updates.
//!
//! - [`WatchConfig`] - live update settings (poll interval, retries, debounce)
//! - [`RemoteConfig`] - connection settings (timeouts, helper programs)
//! - [`Config`] - root configuration combining both
//!
//! All types implement [`Default`] and deserialize with missing fields filled
//! from the defaults.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lower bound for the remote poll interval, in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

/// Upper bound for the remote poll interval, in milliseconds.
pub const MAX_POLL_INTERVAL_MS: u64 = 30_000;

/// Default remote poll interval, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default number of consecutive connection failures tolerated by a watch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default debounce window for local file notifications, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Clamps a poll interval to [`MIN_POLL_INTERVAL_MS`]..=[`MAX_POLL_INTERVAL_MS`].
///
/// # Examples
///
/// ```
/// use mdv_core::clamp_poll_interval;
///
/// assert_eq!(clamp_poll_interval(10).as_millis(), 500);
/// assert_eq!(clamp_poll_interval(999_999).as_millis(), 30_000);
/// assert_eq!(clamp_poll_interval(1_500).as_millis(), 1_500);
/// ```
#[must_use]
pub fn clamp_poll_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS))
}

/// Live update settings.
///
/// # Examples
///
/// ```
/// use mdv_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert!(config.live_updates);
/// assert_eq!(config.poll_interval_ms, 2_000);
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Whether files are watched for changes at all.
    pub live_updates: bool,

    /// Remote poll interval in milliseconds. Clamped on use.
    pub poll_interval_ms: u64,

    /// Consecutive connection failures before a remote watch gives up.
    pub max_retries: u32,

    /// Debounce window for local change notifications, in milliseconds.
    pub debounce_ms: u64,
}

impl WatchConfig {
    /// The effective, clamped poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        clamp_poll_interval(self.poll_interval_ms)
    }

    /// The local debounce window.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            live_updates: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Connection settings shared by all protocol variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// TCP connect and SSH handshake timeout, in milliseconds.
    pub connect_timeout_ms: u64,

    /// How long an interactive credential prompt may stay unanswered.
    pub prompt_timeout_secs: u64,

    /// Program used for SMB access.
    pub smbclient_program: String,

    /// Domain used for SMB when the credentials carry none.
    pub smb_domain: String,

    /// Program used to mount NFS exports.
    pub mount_program: String,

    /// Program used to unmount NFS exports.
    pub umount_program: String,

    /// Options passed to the NFS mount.
    pub nfs_mount_options: String,
}

impl RemoteConfig {
    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Prompt timeout as a [`Duration`].
    #[must_use]
    pub const fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            prompt_timeout_secs: 300,
            smbclient_program: "smbclient".to_owned(),
            smb_domain: "WORKGROUP".to_owned(),
            mount_program: "mount".to_owned(),
            umount_program: "umount".to_owned(),
            nfs_mount_options: "ro,soft,timeo=10".to_owned(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live update configuration.
    pub watch: WatchConfig,

    /// Remote connection configuration.
    pub remote: RemoteConfig,
}

impl Config {
    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if the file does not exist, or an
    /// I/O, parse, or validation error.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_owned()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parses and validates a JSON configuration string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or
    /// [`ConfigError::InvalidOption`] for out-of-range values.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that cannot be corrected by clamping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.max_retries == 0 {
            return Err(ConfigError::invalid_option(
                "watch.max_retries",
                "must be at least 1",
            ));
        }
        if self.remote.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "remote.connect_timeout_ms",
                "must be positive",
            ));
        }
        for (option, value) in [
            ("remote.smbclient_program", &self.remote.smbclient_program),
            ("remote.mount_program", &self.remote.mount_program),
            ("remote.umount_program", &self.remote.umount_program),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid_option(option, "must not be empty"));
            }
        }
        Ok(())
    }
}
