//! Authentication material for remote connections.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credentials used to establish a remote connection.
///
/// Credentials are owned by the credential collaborator and handed to a
/// connection by value. Secret fields are wiped from memory on drop and are
/// never printed by `Debug`.
///
/// # Examples
///
/// ```
/// use mdv_core::Credentials;
///
/// let creds = Credentials::password("alice", "s3cret").with_domain("CORP");
/// assert_eq!(creds.username, "alice");
/// assert_eq!(creds.domain.as_deref(), Some("CORP"));
/// assert!(!format!("{creds:?}").contains("s3cret"));
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Login name.
    pub username: String,

    /// Password, if password authentication is used.
    #[serde(default)]
    pub password: Option<String>,

    /// PEM-encoded private key contents.
    #[serde(default)]
    pub private_key: Option<String>,

    /// Passphrase for `private_key`.
    #[serde(default)]
    pub passphrase: Option<String>,

    /// Windows domain for SMB.
    #[serde(default)]
    pub domain: Option<String>,
}

impl Credentials {
    /// Creates username/password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            private_key: None,
            passphrase: None,
            domain: None,
        }
    }

    /// Creates credentials with only a username.
    #[must_use]
    pub fn username_only(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            private_key: None,
            passphrase: None,
            domain: None,
        }
    }

    /// Sets the private key (and optional passphrase).
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>, passphrase: Option<String>) -> Self {
        self.private_key = Some(key.into());
        self.passphrase = passphrase;
        self
    }

    /// Sets the SMB domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Returns `true` if a password or private key is present.
    #[must_use]
    pub fn has_secret(&self) -> bool {
        self.password.is_some() || self.private_key.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |field: &Option<String>| field.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("private_key", &redact(&self.private_key))
            .field("passphrase", &redact(&self.passphrase))
            .field("domain", &self.domain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_secret() {
        assert!(Credentials::password("a", "b").has_secret());
        assert!(!Credentials::username_only("a").has_secret());
        let keyed = Credentials::username_only("a").with_private_key("KEY", None);
        assert!(keyed.has_secret());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{"username":"u","privateKey":"k","passphrase":"p"}"#;
        let creds: Credentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.private_key.as_deref(), Some("k"));
        assert!(creds.password.is_none());
    }

    #[test]
    fn test_debug_redacts_every_secret() {
        let creds = Credentials::password("u", "hunter2")
            .with_private_key("KEYDATA", Some("xyzzy".to_owned()));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("xyzzy"));
        assert!(!debug.contains("KEYDATA"));
        assert!(debug.contains("<redacted>"));
    }
}
