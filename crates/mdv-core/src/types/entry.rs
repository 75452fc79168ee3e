//! Directory listing entries.
//!
//! Every connection variant returns listings in the same shape: directories
//! and markdown files only, directories first, then ordered by name.

use serde::{Deserialize, Serialize};

/// File extensions treated as markdown, without the leading dot.
pub const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// File or directory name.
    pub name: String,

    /// Full remote path of the entry.
    pub path: String,

    /// Whether the entry is a directory.
    pub is_directory: bool,

    /// Size in bytes, when the protocol reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Modification time in milliseconds since the Unix epoch, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
}

impl DirEntry {
    /// Creates an entry under `dir` with no size or modification time.
    #[must_use]
    pub fn new(dir: &str, name: impl Into<String>, is_directory: bool) -> Self {
        let name = name.into();
        Self {
            path: join_remote_path(dir, &name),
            name,
            is_directory,
            size: None,
            modified: None,
        }
    }

    /// Sets the size.
    #[must_use]
    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    /// Sets the modification time.
    #[must_use]
    pub fn with_modified(mut self, modified: Option<u64>) -> Self {
        self.modified = modified;
        self
    }

    /// Returns `true` if this entry belongs in a listing.
    #[must_use]
    pub fn is_listable(&self) -> bool {
        self.is_directory || is_markdown_name(&self.name)
    }
}

/// Returns `true` if `name` ends in `.md` or `.markdown`.
///
/// The match is case-sensitive, as servers report names verbatim.
///
/// # Examples
///
/// ```
/// use mdv_core::is_markdown_name;
///
/// assert!(is_markdown_name("README.md"));
/// assert!(is_markdown_name("notes.markdown"));
/// assert!(!is_markdown_name("CHANGELOG.MD"));
/// assert!(!is_markdown_name("main.rs"));
/// assert!(!is_markdown_name("md"));
/// ```
#[must_use]
pub fn is_markdown_name(name: &str) -> bool {
    MARKDOWN_EXTENSIONS
        .iter()
        .any(|ext| name.strip_suffix(ext).is_some_and(|rest| rest.ends_with('.')))
}

/// Joins a directory and a name with `/`, collapsing repeated slashes.
///
/// # Examples
///
/// ```
/// use mdv_core::join_remote_path;
///
/// assert_eq!(join_remote_path("/docs/", "a.md"), "/docs/a.md");
/// assert_eq!(join_remote_path("/", "a.md"), "/a.md");
/// ```
#[must_use]
pub fn join_remote_path(dir: &str, name: &str) -> String {
    let joined = format!("{dir}/{name}");
    let mut out = String::with_capacity(joined.len());
    let mut previous_slash = false;
    for ch in joined.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }
    out
}

/// Filters a raw listing to directories and markdown files, then sorts it
/// directories-first and by name.
#[must_use]
pub fn normalize_listing(entries: impl IntoIterator<Item = DirEntry>) -> Vec<DirEntry> {
    let mut listing: Vec<DirEntry> = entries
        .into_iter()
        .filter(|e| e.name != "." && e.name != ".." && e.is_listable())
        .collect();
    listing.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
    listing
}
