//! Event filtering for the local watcher.
//!
//! The local watcher observes a file's parent directory, so the debouncer
//! reports changes to siblings too. A [`FileFilter`] drops those in the
//! watcher thread before anything reaches the notification channel.

use camino::{Utf8Path, Utf8PathBuf};

/// Decides which paths from a debounced batch are relevant.
///
/// Filters run on the blocking watcher thread, hence `Send + Sync + 'static`.
///
/// # Examples
///
/// ```
/// use mdv_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct MarkdownOnly;
///
/// impl FileFilter for MarkdownOnly {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.extension() == Some("md")
///     }
/// }
///
/// assert!(MarkdownOnly.should_process(Utf8Path::new("notes/a.md")));
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if a change at `path` should be processed.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// Accepts exactly one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleFileFilter {
    target: Utf8PathBuf,
}

impl SingleFileFilter {
    /// Creates a filter for `target`, which should already be canonical.
    #[must_use]
    pub fn new(target: impl Into<Utf8PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// The accepted path.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }
}

impl FileFilter for SingleFileFilter {
    #[inline]
    fn should_process(&self, path: &Utf8Path) -> bool {
        path == self.target.as_path()
    }
}
