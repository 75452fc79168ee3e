//! Modification markers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A cheap, comparable proxy for "this resource may have changed".
///
/// Markers are milliseconds since the Unix epoch. Only equality matters to the
/// change detector; ordering is provided for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifiedMarker(u64);

impl ModifiedMarker {
    /// Wraps a raw millisecond value.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Builds a marker from a whole-second Unix timestamp.
    #[inline]
    #[must_use]
    pub const fn from_unix_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Builds a marker from a [`SystemTime`]. Times before the epoch map to 0.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self(u64::try_from(since.as_millis()).unwrap_or(u64::MAX))
    }

    /// The current wall-clock time as a marker.
    #[must_use]
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Returns the raw millisecond value.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unix_secs() {
        assert_eq!(ModifiedMarker::from_unix_secs(2).as_millis(), 2000);
    }

    #[test]
    fn test_from_system_time_before_epoch() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(ModifiedMarker::from_system_time(before).as_millis(), 0);
    }

    #[test]
    fn test_from_system_time() {
        let t = UNIX_EPOCH + Duration::from_millis(1234);
        assert_eq!(ModifiedMarker::from_system_time(t), ModifiedMarker::from_millis(1234));
    }
}
