//! Content hashing used to verify suspected changes.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of file content.
///
/// # Examples
///
/// ```
/// use mdv_core::ContentHash;
///
/// let a = ContentHash::of("# Title\n");
/// let b = ContentHash::of("# Title\n");
/// assert_eq!(a, b);
/// assert_ne!(a, ContentHash::of("# Other\n"));
/// assert_eq!(a.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes `content`.
    #[must_use]
    pub fn of(content: &str) -> Self {
        Self(hex::encode(Sha256::digest(content.as_bytes())))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
