//! NFS exports mounted to a private temporary directory.
//!
//! The export is the first segment of the target path
//! (`nfs://host/<export>/rest`). It is mounted once at connect time. After
//! that every operation is a local filesystem call under the mount point.
//!
//! Once mounted, the directory holds the export's files, so it is only ever
//! removed with a non-recursive `rmdir`, and only after a successful
//! unmount. A mount point that could not be unmounted is left in place.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use mdv_core::{DirEntry, ModifiedMarker, Protocol, normalize_listing};
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ConnectConfig, RemoteFs};
use crate::error::RemoteError;

const NFS_PORT: u16 = 2049;

struct MountPoint {
    dir: PathBuf,
    export: String,
}

/// A connection to one NFS export.
pub struct NfsConnection {
    config: ConnectConfig,
    mount: Mutex<Option<Arc<MountPoint>>>,
}

impl NfsConnection {
    pub(crate) fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            mount: Mutex::new(None),
        }
    }

    pub(crate) async fn connect(&self) -> Result<(), RemoteError> {
        if self.is_connected() {
            return Ok(());
        }

        let export = self
            .config
            .export
            .clone()
            .ok_or_else(|| RemoteError::MountFailed("target path names no export".to_owned()))?;
        let dir = tempfile::Builder::new()
            .prefix("mdview-nfs-")
            .tempdir()
            .map_err(|e| RemoteError::MountFailed(format!("cannot create mount point: {e}")))?;

        let source = format!("{}:/{export}", self.config.host);
        let output = Command::new(&self.config.settings.mount_program)
            .arg("-t")
            .arg("nfs")
            .arg("-o")
            .arg(self.mount_options())
            .arg(&source)
            .arg(dir.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                RemoteError::MountFailed(format!(
                    "cannot run {}: {e}",
                    self.config.settings.mount_program
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemoteError::MountFailed(format!(
                "{source}: {}",
                stderr.trim()
            )));
        }

        let dir = dir.keep();
        info!(source = %source, mount_point = %dir.display(), "NFS export mounted");
        *self.mount.lock() = Some(Arc::new(MountPoint { dir, export }));
        Ok(())
    }

    /// Unmounts, then removes the now empty mount point. Failures are
    /// logged; the connection counts as disconnected either way.
    pub(crate) async fn disconnect(&self) -> Result<(), RemoteError> {
        let Some(mount) = self.mount.lock().take() else {
            return Ok(());
        };
        let dir = mount.dir.as_path();

        let unmounted = Command::new(&self.config.settings.umount_program)
            .arg(dir)
            .stdin(Stdio::null())
            .output()
            .await;
        match unmounted {
            Ok(output) if output.status.success() => {
                debug!(mount_point = %dir.display(), "NFS export unmounted");
            }
            Ok(output) => {
                warn!(
                    mount_point = %dir.display(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Unmount failed, leaving mount point in place"
                );
                return Ok(());
            }
            Err(e) => {
                warn!(
                    mount_point = %dir.display(),
                    error = %e,
                    "Cannot run unmount program, leaving mount point in place"
                );
                return Ok(());
            }
        }

        if let Err(e) = tokio::fs::remove_dir(dir).await {
            warn!(mount_point = %dir.display(), error = %e, "Cannot remove mount point");
        }
        Ok(())
    }

    fn mount_options(&self) -> String {
        let options = &self.config.settings.nfs_mount_options;
        if self.config.port == NFS_PORT {
            options.clone()
        } else {
            format!("{options},port={}", self.config.port)
        }
    }

    fn mounted(&self) -> Result<Arc<MountPoint>, RemoteError> {
        self.mount.lock().clone().ok_or(RemoteError::NotConnected)
    }

    fn resolve(&self, path: &str) -> Result<(Arc<MountPoint>, PathBuf), RemoteError> {
        let mount = self.mounted()?;
        let local = translate(&mount.dir, &mount.export, path)?;
        Ok((mount, local))
    }
}

impl fmt::Debug for NfsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NfsConnection")
            .field("host", &self.config.host)
            .field("export", &self.config.export)
            .field("mounted", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl RemoteFs for NfsConnection {
    fn protocol(&self) -> Protocol {
        Protocol::Nfs
    }

    fn is_connected(&self) -> bool {
        self.mount.lock().is_some()
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        let (_mount, local) = self.resolve(path)?;
        let bytes = tokio::fs::read(&local)
            .await
            .map_err(|e| RemoteError::from_io(path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn modified_marker(&self, path: &str) -> Result<ModifiedMarker, RemoteError> {
        let (_mount, local) = self.resolve(path)?;
        let modified = tokio::fs::metadata(&local)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| RemoteError::from_io(path, e))?;
        Ok(ModifiedMarker::from_system_time(modified))
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, RemoteError> {
        let (_mount, local) = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&local)
            .await
            .map_err(|e| RemoteError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| RemoteError::from_io(path, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(meta) = entry.metadata().await else {
                debug!(name = %name, "Skipping entry without metadata");
                continue;
            };
            let modified = meta
                .modified()
                .ok()
                .map(|t| ModifiedMarker::from_system_time(t).as_millis());
            entries.push(
                DirEntry::new(path, name, meta.is_dir())
                    .with_size(Some(meta.len()))
                    .with_modified(modified),
            );
        }
        Ok(normalize_listing(entries))
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok((_mount, local)) => tokio::fs::try_exists(&local).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Maps a remote path onto the mount point.
///
/// The export segment is stripped because the mount root already is the
/// export. `..` segments are rejected.
fn translate(root: &Path, export: &str, remote: &str) -> Result<PathBuf, RemoteError> {
    let mut segments = remote.split('/').filter(|s| !s.is_empty() && *s != ".").peekable();
    if segments.peek() == Some(&export) {
        segments.next();
    }

    let mut local = root.to_path_buf();
    for segment in segments {
        if segment == ".." {
            return Err(RemoteError::permission_denied(remote));
        }
        local.push(segment);
    }
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdv_core::RemoteConfig;

    fn connection(port: u16) -> NfsConnection {
        NfsConnection::new(ConnectConfig {
            host: "storage".to_owned(),
            port,
            share: None,
            export: Some("exports".to_owned()),
            credentials: None,
            settings: RemoteConfig::default(),
        })
    }

    /// Simulates a successful mount by pointing the connection at a
    /// populated directory.
    fn mounted_with(dir: &Path, settings: RemoteConfig) -> NfsConnection {
        let conn = NfsConnection::new(ConnectConfig {
            settings,
            ..connection(NFS_PORT).config
        });
        *conn.mount.lock() = Some(Arc::new(MountPoint {
            dir: dir.to_path_buf(),
            export: "exports".to_owned(),
        }));
        conn
    }

    fn mounted(dir: &Path) -> NfsConnection {
        mounted_with(dir, RemoteConfig::default())
    }

    fn umount(program: &str) -> RemoteConfig {
        RemoteConfig {
            umount_program: program.to_owned(),
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn test_translate_strips_export() {
        let root = Path::new("/tmp/mdview-nfs-x");
        assert_eq!(
            translate(root, "exports", "/exports/team/a.md").unwrap(),
            root.join("team").join("a.md")
        );
        assert_eq!(translate(root, "exports", "/exports").unwrap(), root);
        assert_eq!(
            translate(root, "exports", "/other/a.md").unwrap(),
            root.join("other").join("a.md")
        );
    }

    #[test]
    fn test_translate_rejects_parent_segments() {
        let err = translate(Path::new("/m"), "exports", "/exports/../etc/passwd").unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied { .. }));
    }

    #[test]
    fn test_mount_options_add_custom_port() {
        assert_eq!(connection(NFS_PORT).mount_options(), "ro,soft,timeo=10");
        assert_eq!(connection(20490).mount_options(), "ro,soft,timeo=10,port=20490");
    }

    #[tokio::test]
    async fn test_operations_under_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("team")).unwrap();
        std::fs::write(dir.path().join("team").join("plan.md"), "# Plan").unwrap();
        std::fs::write(dir.path().join("team").join("logo.png"), [0u8; 4]).unwrap();
        std::fs::create_dir(dir.path().join("team").join("archive")).unwrap();
        let conn = mounted(dir.path());

        assert!(conn.is_connected());
        assert_eq!(conn.read_file("/exports/team/plan.md").await.unwrap(), "# Plan");
        assert!(conn.modified_marker("/exports/team/plan.md").await.unwrap().as_millis() > 0);
        assert!(conn.exists("/exports/team/plan.md").await);
        assert!(!conn.exists("/exports/team/gone.md").await);

        let listing = conn.list_directory("/exports/team").await.unwrap();
        let paths: Vec<&str> = listing.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/exports/team/archive", "/exports/team/plan.md"]);
        assert_eq!(listing[1].size, Some(6));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let conn = mounted(dir.path());
        let err = conn.read_file("/exports/nope.md").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_mount_failure_is_reported() {
        let conn = NfsConnection::new(ConnectConfig {
            settings: RemoteConfig {
                mount_program: "false".to_owned(),
                ..RemoteConfig::default()
            },
            ..connection(NFS_PORT).config
        });
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, RemoteError::MountFailed(_)));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_failed_unmount_keeps_export_contents() {
        let export = tempfile::tempdir().unwrap();
        std::fs::write(export.path().join("handbook.md"), "# Handbook").unwrap();
        let conn = mounted_with(export.path(), umount("false"));

        conn.disconnect().await.unwrap();
        assert!(!conn.is_connected());
        assert_eq!(
            std::fs::read_to_string(export.path().join("handbook.md")).unwrap(),
            "# Handbook"
        );
    }

    #[tokio::test]
    async fn test_missing_unmount_program_keeps_export_contents() {
        let export = tempfile::tempdir().unwrap();
        std::fs::write(export.path().join("handbook.md"), "# Handbook").unwrap();
        let conn = mounted_with(export.path(), umount("mdv-test-no-such-umount"));

        conn.disconnect().await.unwrap();
        assert!(export.path().join("handbook.md").exists());
    }

    #[tokio::test]
    async fn test_mount_point_removal_is_not_recursive() {
        // Unmount "succeeds" but the directory still has files in it.
        let export = tempfile::tempdir().unwrap();
        std::fs::write(export.path().join("handbook.md"), "# Handbook").unwrap();
        let conn = mounted_with(export.path(), umount("true"));

        conn.disconnect().await.unwrap();
        assert!(export.path().join("handbook.md").exists());
    }

    #[tokio::test]
    async fn test_unmounted_empty_mount_point_is_removed() {
        let parent = tempfile::tempdir().unwrap();
        let mount_point = parent.path().join("mdview-nfs-test");
        std::fs::create_dir(&mount_point).unwrap();
        let conn = mounted_with(&mount_point, umount("true"));

        conn.disconnect().await.unwrap();
        assert!(!mount_point.exists());
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_connection_keeps_mount_point() {
        let export = tempfile::tempdir().unwrap();
        std::fs::write(export.path().join("handbook.md"), "# Handbook").unwrap();
        drop(mounted(export.path()));
        assert!(export.path().join("handbook.md").exists());
    }
}
