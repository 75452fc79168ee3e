//! SMB shares through the `smbclient` program.
//!
//! Each operation runs one `smbclient -c <command>` against the share.
//! Credentials reach the child through `-U` and the `PASSWD` environment
//! variable, never the argument list.
//!
//! SMB offers no cheap modification stamp here, so the marker is the wall
//! clock time of a successful read. The poller's content hash decides
//! whether anything actually changed.

use std::process::Stdio;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mdv_core::{DirEntry, ModifiedMarker, Protocol, normalize_listing};
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use super::{ConnectConfig, RemoteFs};
use crate::error::RemoteError;

const NOT_FOUND_STATUSES: [&str; 4] = [
    "NT_STATUS_OBJECT_NAME_NOT_FOUND",
    "NT_STATUS_OBJECT_PATH_NOT_FOUND",
    "NT_STATUS_NO_SUCH_FILE",
    "NT_STATUS_BAD_NETWORK_NAME",
];

const AUTH_STATUSES: [&str; 3] = [
    "NT_STATUS_LOGON_FAILURE",
    "NT_STATUS_WRONG_PASSWORD",
    "NT_STATUS_ACCOUNT_LOCKED_OUT",
];

const CONNECTION_STATUSES: [&str; 7] = [
    "NT_STATUS_CONNECTION_REFUSED",
    "NT_STATUS_IO_TIMEOUT",
    "NT_STATUS_HOST_UNREACHABLE",
    "NT_STATUS_NETWORK_UNREACHABLE",
    "NT_STATUS_CONNECTION_RESET",
    "NT_STATUS_CONNECTION_DISCONNECTED",
    "NT_STATUS_PIPE_BROKEN",
];

/// One `smbclient ls` row: name, attribute letters, size, then a date like
/// `Tue Oct 14 10:00:00 2025`.
static LISTING_ROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^\s+(?P<name>.+?)\s+(?P<attrs>[A-Z]*)\s+(?P<size>\d+)\s+\w{3}\s+\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\d{4}\s*$",
    )
    .ok()
});

/// A connection to one SMB share.
#[derive(Debug)]
pub struct SmbConnection {
    config: ConnectConfig,
    connected: AtomicBool,
}

impl SmbConnection {
    pub(crate) fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            connected: AtomicBool::new(false),
        }
    }

    /// Checks the share with `ls` under the connect timeout.
    pub(crate) async fn connect(&self) -> Result<(), RemoteError> {
        if self.is_connected() {
            return Ok(());
        }

        let timeout = self.config.settings.connect_timeout();
        let listed = tokio::time::timeout(timeout, self.exec("ls", "/"))
            .await
            .map_err(|_| {
                RemoteError::connection_lost(format!(
                    "timed out after {}ms connecting to {}",
                    timeout.as_millis(),
                    self.share_unc()
                ))
            })?;
        listed?;

        self.connected.store(true, Ordering::SeqCst);
        info!(share = %self.share_unc(), "SMB share reachable");
        Ok(())
    }

    pub(crate) async fn disconnect(&self) -> Result<(), RemoteError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(share = %self.share_unc(), "SMB connection closed");
        }
        Ok(())
    }

    fn share_unc(&self) -> String {
        format!(
            "//{}/{}",
            self.config.host,
            self.config.share.as_deref().unwrap_or_default()
        )
    }

    fn command(&self, script: &str) -> Command {
        let settings = &self.config.settings;
        let mut cmd = Command::new(&settings.smbclient_program);
        cmd.arg(self.share_unc())
            .arg("-p")
            .arg(self.config.port.to_string());

        match &self.config.credentials {
            Some(credentials) => {
                let domain = credentials
                    .domain
                    .as_deref()
                    .unwrap_or(settings.smb_domain.as_str());
                cmd.arg("-W").arg(domain);
                cmd.arg("-U").arg(&credentials.username);
                match &credentials.password {
                    Some(password) => {
                        cmd.env("PASSWD", password);
                    }
                    None => {
                        cmd.arg("-N");
                    }
                }
            }
            None => {
                cmd.arg("-N");
            }
        }

        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs one smbclient command and returns its stdout.
    async fn exec(&self, script: &str, path: &str) -> Result<String, RemoteError> {
        trace!(share = %self.share_unc(), script, "Running smbclient");
        let output = self.command(script).output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RemoteError::other(format!(
                    "{} is not installed or not on PATH",
                    self.config.settings.smbclient_program
                ))
            } else {
                RemoteError::from_io(path, e)
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || stderr.contains("NT_STATUS_") {
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(classify_smb_failure(path, &format!("{stderr}\n{stdout}")));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run(&self, script: &str, path: &str) -> Result<String, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::NotConnected);
        }
        self.exec(script, path).await
    }
}

#[async_trait]
impl RemoteFs for SmbConnection {
    fn protocol(&self) -> Protocol {
        Protocol::Smb
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_file(&self, path: &str) -> Result<String, RemoteError> {
        let script = format!("get \"{}\" -", smb_path(path)?);
        self.run(&script, path).await
    }

    async fn modified_marker(&self, path: &str) -> Result<ModifiedMarker, RemoteError> {
        self.read_file(path).await?;
        Ok(ModifiedMarker::now())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, RemoteError> {
        let dir = smb_path(path)?;
        let script = if dir.is_empty() {
            "ls".to_owned()
        } else {
            format!("ls \"{dir}\\*\"")
        };
        let stdout = self.run(&script, path).await?;
        Ok(normalize_listing(parse_smb_listing(path, &stdout)))
    }

    async fn exists(&self, path: &str) -> bool {
        let Ok(file) = smb_path(path) else {
            return false;
        };
        self.run(&format!("ls \"{file}\""), path).await.is_ok()
    }
}

/// Converts a remote path to the backslash form smbclient expects, relative
/// to the share root.
///
/// The result is spliced into a `-c` script, where `"` ends the quoted
/// argument and `;` starts a new command (`!` among them runs a local
/// shell). Paths containing either, or any control character, are refused.
fn smb_path(path: &str) -> Result<String, RemoteError> {
    if path.chars().any(|c| c == '"' || c == ';' || c.is_control()) {
        warn!(path = %path.escape_debug(), "Refusing SMB path with script metacharacters");
        return Err(RemoteError::permission_denied(path));
    }
    Ok(path.trim_start_matches('/').replace('/', "\\"))
}

/// Maps smbclient output containing an `NT_STATUS_*` code to an error.
pub(crate) fn classify_smb_failure(path: &str, output: &str) -> RemoteError {
    let has_any = |codes: &[&str]| codes.iter().any(|code| output.contains(code));

    if has_any(&NOT_FOUND_STATUSES) {
        RemoteError::not_found(path)
    } else if output.contains("NT_STATUS_ACCESS_DENIED") {
        RemoteError::permission_denied(path)
    } else if has_any(&AUTH_STATUSES) {
        RemoteError::AuthenticationFailed(first_line(output))
    } else if has_any(&CONNECTION_STATUSES) || output.contains("Connection to") {
        RemoteError::connection_lost(first_line(output))
    } else {
        RemoteError::other(format!("smbclient failed: {}", first_line(output)))
    }
}

fn first_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output")
        .to_owned()
}

/// Parses `smbclient ls` output into entries under `dir`.
pub(crate) fn parse_smb_listing(dir: &str, stdout: &str) -> Vec<DirEntry> {
    let Some(row) = LISTING_ROW.as_ref() else {
        return Vec::new();
    };

    stdout
        .lines()
        .filter_map(|line| {
            let caps = row.captures(line)?;
            let name = caps.name("name")?.as_str().trim();
            let is_directory = caps.name("attrs")?.as_str().contains('D');
            let size = caps.name("size")?.as_str().parse::<u64>().ok();
            Some(DirEntry::new(dir, name, is_directory).with_size(size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use mdv_core::{Credentials, RemoteConfig};

    const LISTING: &str = "  .                                   D        0  Tue Oct 14 10:00:00 2025
  ..                                  D        0  Tue Oct 14 09:00:00 2025
  Meeting Notes                       D        0  Mon Oct 13 08:30:00 2025
  readme.md                           A     1234  Tue Oct 14 10:00:00 2025
  CHANGELOG.MD                        N      512  Wed Oct  1 12:00:00 2025
  photo.png                           A    99999  Tue Oct 14 10:00:00 2025

\t\t4096000 blocks of size 1024. 1024000 blocks available
";

    fn connection(credentials: Option<Credentials>) -> SmbConnection {
        SmbConnection::new(ConnectConfig {
            host: "nas".to_owned(),
            port: 445,
            share: Some("docs".to_owned()),
            export: None,
            credentials,
            settings: RemoteConfig::default(),
        })
    }

    fn argv(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_listing() {
        let entries = parse_smb_listing("/team", LISTING);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![".", "..", "Meeting Notes", "readme.md", "CHANGELOG.MD", "photo.png"]
        );
        assert!(entries[2].is_directory);
        assert_eq!(entries[2].path, "/team/Meeting Notes");
        assert_eq!(entries[3].size, Some(1234));
        assert!(!entries[4].is_directory);
    }

    #[test]
    fn test_parse_listing_normalized() {
        let listing = normalize_listing(parse_smb_listing("/", LISTING));
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Meeting Notes", "readme.md"]);
    }

    #[test]
    fn test_classify_failures() {
        let cases = [
            ("NT_STATUS_OBJECT_NAME_NOT_FOUND opening remote file \\a.md", ErrorClass::NotFound),
            ("NT_STATUS_NO_SUCH_FILE listing \\x\\*", ErrorClass::NotFound),
            ("do_connect: Connection to nas failed (Error NT_STATUS_CONNECTION_REFUSED)", ErrorClass::Connection),
            ("NT_STATUS_IO_TIMEOUT", ErrorClass::Connection),
            ("NT_STATUS_ACCESS_DENIED opening remote file", ErrorClass::Other),
            ("something unexpected", ErrorClass::Other),
        ];
        for (output, class) in cases {
            assert_eq!(classify_smb_failure("/a.md", output).class(), class, "output: {output}");
        }
        assert!(matches!(
            classify_smb_failure("/", "session setup failed: NT_STATUS_LOGON_FAILURE"),
            RemoteError::AuthenticationFailed(_)
        ));
    }

    #[test]
    fn test_smb_path() {
        assert_eq!(smb_path("/team/plan.md").unwrap(), "team\\plan.md");
        assert_eq!(smb_path("/Meeting Notes/a b.md").unwrap(), "Meeting Notes\\a b.md");
        assert_eq!(smb_path("/").unwrap(), "");
    }

    #[test]
    fn test_smb_path_rejects_script_metacharacters() {
        for path in [
            "/x\";!touch /tmp/owned;\".md",
            "/a;b.md",
            "/quoted\"name.md",
            "/line\nbreak.md",
            "/tab\there.md",
            "/nul\0.md",
        ] {
            let err = smb_path(path).unwrap_err();
            assert!(matches!(err, RemoteError::PermissionDenied { .. }), "path: {path:?}");
        }
    }

    /// Connects through a fake smbclient that appends its `-c` script to
    /// `scripts.log`, one line per invocation.
    #[cfg(unix)]
    async fn recording_connection(dir: &std::path::Path) -> (SmbConnection, std::path::PathBuf) {
        let log = dir.join("scripts.log");
        let program = crate::connection::fake_program::install(
            dir,
            "smbclient",
            &format!(
                "while [ $# -gt 0 ]; do\n  if [ \"$1\" = -c ]; then printf '%s\\n' \"$2\" >> '{}'; fi\n  shift\ndone",
                log.display()
            ),
        );
        let conn = SmbConnection::new(ConnectConfig {
            settings: RemoteConfig {
                smbclient_program: program,
                ..RemoteConfig::default()
            },
            ..connection(None).config
        });
        conn.connect().await.unwrap();
        (conn, log)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unsafe_paths_never_reach_smbclient() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, log) = recording_connection(dir.path()).await;
        let marker = dir.path().join("owned");
        let hostile = format!("/x\";!touch {};\".md", marker.display());

        let err = conn.read_file(&hostile).await.unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied { .. }));
        assert!(conn.list_directory("/a;b").await.is_err());
        assert!(!conn.exists(&hostile).await);

        conn.read_file("/team/plan.md").await.unwrap();
        let scripts = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = scripts.lines().collect();
        assert_eq!(lines, vec!["ls", "get \"team\\plan.md\" -"]);
        assert!(!marker.exists());
    }

    #[test]
    fn test_command_keeps_password_out_of_args() {
        let conn = connection(Some(Credentials::password("alice", "hunter2").with_domain("CORP")));
        let cmd = conn.command("ls");
        let args = argv(&cmd);
        assert_eq!(&args[..3], ["//nas/docs", "-p", "445"]);
        assert!(args.windows(2).any(|w| w == ["-W", "CORP"]));
        assert!(args.windows(2).any(|w| w == ["-U", "alice"]));
        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert!(!args.contains(&"-N".to_owned()));
    }

    #[test]
    fn test_command_without_password_is_anonymous() {
        let args = argv(&connection(None).command("ls"));
        assert!(args.contains(&"-N".to_owned()));

        let args = argv(&connection(Some(Credentials::username_only("guest"))).command("ls"));
        assert!(args.contains(&"-N".to_owned()));
        assert!(args.windows(2).any(|w| w == ["-W", "WORKGROUP"]));
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let conn = SmbConnection::new(ConnectConfig {
            settings: RemoteConfig {
                smbclient_program: "mdv-test-no-such-smbclient".to_owned(),
                ..RemoteConfig::default()
            },
            ..connection(None).config
        });
        let err = conn.connect().await.unwrap_err();
        assert!(err.to_string().contains("not installed"), "got: {err}");
        assert!(!conn.is_connected());
    }
}
