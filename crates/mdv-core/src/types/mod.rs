//! Domain types shared by the remote and watcher crates.
//!
//! - [`target`] - parsed targets and connection keys
//! - [`credentials`] - authentication material
//! - [`entry`] - directory listing entries
//! - [`marker`] - modification markers
//!
//! All public types are re-exported at the crate root.

mod credentials;
mod entry;
mod marker;
mod target;

pub use credentials::Credentials;
pub use entry::{DirEntry, MARKDOWN_EXTENSIONS, is_markdown_name, join_remote_path, normalize_listing};
pub use marker::ModifiedMarker;
pub use target::{ConnectionKey, Protocol, RemoteTarget};
