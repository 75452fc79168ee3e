//! Remote target types.
//!
//! A [`RemoteTarget`] is the structured form of a user-supplied path or URI.
//! Targets are produced by [`crate::parse`] and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol of a [`RemoteTarget`].
///
/// The four known remote schemes carry default ports. Any other URI scheme
/// still parses structurally and is kept verbatim in [`Protocol::Other`].
///
/// # Examples
///
/// ```
/// use mdv_core::Protocol;
///
/// assert_eq!(Protocol::from_scheme("SFTP"), Protocol::Sftp);
/// assert_eq!(Protocol::Smb.default_port(), Some(445));
/// assert_eq!(Protocol::from_scheme("http").default_port(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Protocol {
    /// SSH file access (served over SFTP).
    Ssh,
    /// SFTP.
    Sftp,
    /// SMB/CIFS share.
    Smb,
    /// NFS export.
    Nfs,
    /// A plain local filesystem path.
    Local,
    /// Any other URI scheme, lowercased.
    Other(String),
}

impl Protocol {
    /// Maps a URI scheme to a protocol, ignoring ASCII case.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme.to_ascii_lowercase().as_str() {
            "ssh" => Self::Ssh,
            "sftp" => Self::Sftp,
            "smb" => Self::Smb,
            "nfs" => Self::Nfs,
            "local" => Self::Local,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the scheme string for this protocol.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ssh => "ssh",
            Self::Sftp => "sftp",
            Self::Smb => "smb",
            Self::Nfs => "nfs",
            Self::Local => "local",
            Self::Other(scheme) => scheme,
        }
    }

    /// Returns the default port for the four known remote schemes.
    #[must_use]
    pub const fn default_port(&self) -> Option<u16> {
        match self {
            Self::Ssh | Self::Sftp => Some(22),
            Self::Smb => Some(445),
            Self::Nfs => Some(2049),
            Self::Local | Self::Other(_) => None,
        }
    }

    /// Returns `true` for ssh, sftp, smb and nfs.
    #[must_use]
    pub const fn is_known_remote(&self) -> bool {
        matches!(self, Self::Ssh | Self::Sftp | Self::Smb | Self::Nfs)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.as_str().to_owned()
    }
}

impl From<String> for Protocol {
    fn from(scheme: String) -> Self {
        Self::from_scheme(&scheme)
    }
}

/// A parsed remote (or local) file target.
///
/// # Invariants
///
/// When `protocol` is [`Protocol::Local`], every field other than
/// `resource_path` is `None`. Use [`RemoteTarget::local`] to build one.
///
/// The password is never serialized and never shown by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTarget {
    /// Transport protocol.
    pub protocol: Protocol,

    /// Host name or address.
    pub host: Option<String>,

    /// Port, filled with the protocol default when the input omitted it.
    pub port: Option<u16>,

    /// Path of the resource on the remote side, always starting with `/`
    /// for remote protocols. For SMB this excludes the share segment.
    pub resource_path: String,

    /// SMB share name.
    pub share: Option<String>,

    /// Username embedded in the URI, unescaped.
    pub username: Option<String>,

    /// Password embedded in the URI, unescaped.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl RemoteTarget {
    /// Creates a local target for `path`.
    #[must_use]
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Local,
            host: None,
            port: None,
            resource_path: path.into(),
            share: None,
            username: None,
            password: None,
        }
    }

    /// Returns `true` if this target refers to the local filesystem.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.protocol == Protocol::Local
    }

    /// Returns the registry key for this target, or `None` for local targets.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdv_core::parse;
    ///
    /// let target = parse("sftp://alice@docs.example.com/notes/todo.md");
    /// let key = target.connection_key().unwrap();
    /// assert_eq!(key.as_str(), "sftp://docs.example.com:22");
    /// ```
    #[must_use]
    pub fn connection_key(&self) -> Option<ConnectionKey> {
        if self.is_local() {
            return None;
        }
        Some(ConnectionKey::new(
            &self.protocol,
            self.host.as_deref().unwrap_or_default(),
            self.port,
        ))
    }

    /// Returns the same target without embedded credentials.
    #[must_use]
    pub fn without_credentials(&self) -> Self {
        Self {
            username: None,
            password: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("resource_path", &self.resource_path)
            .field("share", &self.share)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = Self {
            password: None,
            ..self.clone()
        };
        f.write_str(&crate::parser::build_url(&redacted))
    }
}

/// Identity of a pooled connection: `protocol://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    /// Builds a key from its parts. A missing port leaves the port slot empty.
    #[must_use]
    pub fn new(protocol: &Protocol, host: &str, port: Option<u16>) -> Self {
        let port = port.map(|p| p.to_string()).unwrap_or_default();
        Self(format!("{protocol}://{host}:{port}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_round_trips_through_string() {
        for scheme in ["ssh", "sftp", "smb", "nfs", "local", "gopher"] {
            let protocol = Protocol::from_scheme(scheme);
            assert_eq!(String::from(protocol), scheme);
        }
    }

    #[test]
    fn test_protocol_default_ports() {
        assert_eq!(Protocol::Ssh.default_port(), Some(22));
        assert_eq!(Protocol::Sftp.default_port(), Some(22));
        assert_eq!(Protocol::Smb.default_port(), Some(445));
        assert_eq!(Protocol::Nfs.default_port(), Some(2049));
        assert_eq!(Protocol::Local.default_port(), None);
        assert_eq!(Protocol::Other("ftp".to_owned()).default_port(), None);
    }

    #[test]
    fn test_local_target_has_no_remote_fields() {
        let target = RemoteTarget::local("/home/me/readme.md");
        assert!(target.is_local());
        assert!(target.host.is_none());
        assert!(target.port.is_none());
        assert!(target.share.is_none());
        assert!(target.connection_key().is_none());
    }

    #[test]
    fn test_connection_key_without_port() {
        let key = ConnectionKey::new(&Protocol::Other("webdav".to_owned()), "host", None);
        assert_eq!(key.as_str(), "webdav://host:");
    }

    #[test]
    fn test_debug_and_display_hide_password() {
        let target = RemoteTarget {
            protocol: Protocol::Ssh,
            host: Some("box".to_owned()),
            port: Some(22),
            resource_path: "/a.md".to_owned(),
            share: None,
            username: Some("bob".to_owned()),
            password: Some("hunter2".to_owned()),
        };
        assert!(!format!("{target:?}").contains("hunter2"));
        assert!(!target.to_string().contains("hunter2"));
        assert_eq!(target.to_string(), "ssh://bob@box/a.md");
    }

    #[test]
    fn test_serialization_skips_password() {
        let mut target = RemoteTarget::local("x");
        target.password = Some("secret".to_owned());
        let json = serde_json::to_string(&target).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(r#""protocol":"local""#));
    }
}
