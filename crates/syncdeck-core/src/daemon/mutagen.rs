//! `DaemonClient` backed by the `mutagen` command-line interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::runner::{self, RunError};
use super::{parse, CreateSpec, DaemonClient};
use crate::error::{Error, Result};
use crate::models::{Conflict, DaemonStatus, Session, SessionAction, SessionRef};

/// Where users are pointed when the executable is missing
pub const INSTALL_URL: &str = "https://mutagen.io/documentation/introduction/installation";

const WELL_KNOWN_PATHS: [&str; 3] = [
    "/home/linuxbrew/.linuxbrew/bin/mutagen",
    "/usr/local/bin/mutagen",
    "/usr/bin/mutagen",
];

const UNREACHABLE_MARKERS: [&str; 2] = ["unable to connect to daemon", "is the daemon running"];
const UNKNOWN_SESSION_MARKERS: [&str; 2] =
    ["unable to locate requested sessions", "no matching sessions"];

/// Find the daemon executable: explicit override, then well-known install
/// locations, then `PATH`.
pub fn locate_mutagen(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    WELL_KNOWN_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .or_else(|| which::which("mutagen").ok())
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let text = text.to_ascii_lowercase();
    markers.iter().any(|marker| text.contains(marker))
}

/// Talks to the daemon by running its CLI with autostart disabled.
#[derive(Debug, Clone)]
pub struct MutagenCli {
    binary: Option<PathBuf>,
    command_timeout: Duration,
    create_timeout: Duration,
}

impl MutagenCli {
    pub fn new(binary: Option<PathBuf>, command_timeout: Duration, create_timeout: Duration) -> Self {
        match &binary {
            Some(path) => tracing::debug!(path = %path.display(), "Using mutagen executable"),
            None => tracing::warn!("Mutagen executable not found; install it from {INSTALL_URL}"),
        }
        Self {
            binary,
            command_timeout,
            create_timeout,
        }
    }

    fn binary(&self) -> Result<&Path> {
        self.binary.as_deref().ok_or_else(|| {
            Error::DaemonUnreachable(format!(
                "mutagen is not installed; see {INSTALL_URL}"
            ))
        })
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<String> {
        let binary = self.binary()?;
        runner::run(binary, args, &[("MUTAGEN_DISABLE_AUTOSTART", "1")], timeout)
            .await
            .map_err(|error| Self::map_error(binary, args, timeout, error))
    }

    fn map_error(binary: &Path, args: &[String], timeout: Duration, error: RunError) -> Error {
        match error {
            RunError::Missing(message) => Error::DaemonUnreachable(message),
            RunError::TimedOut => Error::DaemonTimeout {
                command: runner::display_command(binary, args),
                seconds: timeout.as_secs(),
            },
            RunError::Failed(text) if contains_any(&text, &UNREACHABLE_MARKERS) => {
                Error::DaemonUnreachable(format!(
                    "{text} (start it with `mutagen daemon start`)"
                ))
            }
            RunError::Failed(text) => Error::Daemon(text),
            RunError::Io(error) => Error::Io(error),
        }
    }

    fn not_found_for(session_name: &str, error: Error) -> Error {
        match error {
            Error::Daemon(text) if contains_any(&text, &UNKNOWN_SESSION_MARKERS) => {
                Error::NotFound(format!("session {session_name}"))
            }
            other => other,
        }
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl DaemonClient for MutagenCli {
    async fn create(&self, spec: &CreateSpec) -> Result<SessionRef> {
        let output = self.run(&spec.to_args(), self.create_timeout).await?;
        let identifier = parse::parse_created_identifier(&output);
        tracing::info!(session = %spec.name, mode = %spec.mode, identifier = ?identifier, "Session created");
        Ok(SessionRef {
            name: spec.name.clone(),
            identifier,
            output,
        })
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let output = self
            .run(&Self::args(&["sync", "list"]), self.command_timeout)
            .await?;
        Ok(parse::parse_sessions(&output))
    }

    async fn action(&self, session_name: &str, action: SessionAction) -> Result<()> {
        self.run(
            &Self::args(&["sync", action.as_str(), session_name]),
            self.command_timeout,
        )
        .await
        .map_err(|error| Self::not_found_for(session_name, error))?;
        tracing::info!(session = %session_name, action = %action, "Session action applied");
        Ok(())
    }

    async fn conflicts(&self, session_name: &str) -> Result<Vec<Conflict>> {
        let output = self
            .run(
                &Self::args(&["sync", "list", "--long", session_name]),
                self.command_timeout,
            )
            .await
            .map_err(|error| Self::not_found_for(session_name, error))?;
        Ok(parse::parse_conflicts(&output))
    }

    async fn all_conflicts(&self) -> Result<HashMap<String, Vec<Conflict>>> {
        let output = self
            .run(&Self::args(&["sync", "list", "--long"]), self.command_timeout)
            .await?;
        Ok(parse::parse_listing(&output)
            .into_iter()
            .map(|listing| (listing.session.name, listing.conflicts))
            .collect())
    }

    async fn status(&self) -> DaemonStatus {
        let Some(binary) = self.binary.as_deref() else {
            return DaemonStatus::Unreachable;
        };
        let probe = runner::run(
            binary,
            &Self::args(&["sync", "list"]),
            &[("MUTAGEN_DISABLE_AUTOSTART", "1")],
            self.command_timeout,
        )
        .await;

        match probe {
            Ok(_) => DaemonStatus::Running,
            Err(RunError::Failed(text)) if contains_any(&text, &UNREACHABLE_MARKERS) => {
                DaemonStatus::Stopped
            }
            Err(error) => {
                tracing::warn!("Daemon status probe failed: {error:?}");
                DaemonStatus::Unreachable
            }
        }
    }

    async fn start(&self) -> Result<()> {
        self.run(&Self::args(&["daemon", "start"]), self.command_timeout)
            .await?;
        tracing::info!("Daemon started");
        Ok(())
    }

    fn executable(&self) -> Option<&Path> {
        self.binary.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_binary_wins() {
        let explicit = PathBuf::from("/opt/custom/mutagen");
        assert_eq!(locate_mutagen(Some(explicit.clone())), Some(explicit));
    }

    #[test]
    fn unreachable_stderr_maps_to_unreachable() {
        let error = MutagenCli::map_error(
            Path::new("mutagen"),
            &[],
            Duration::from_secs(1),
            RunError::Failed("Error: unable to connect to daemon: connection refused".to_string()),
        );
        assert!(error.is_unreachable());
    }

    #[test]
    fn timeout_names_the_command() {
        let error = MutagenCli::map_error(
            Path::new("/usr/bin/mutagen"),
            &MutagenCli::args(&["sync", "list"]),
            Duration::from_secs(60),
            RunError::TimedOut,
        );
        match error {
            Error::DaemonTimeout { command, seconds } => {
                assert_eq!(command, "mutagen sync list");
                assert_eq!(seconds, 60);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn other_failures_keep_daemon_text_verbatim() {
        let error = MutagenCli::map_error(
            Path::new("mutagen"),
            &[],
            Duration::from_secs(1),
            RunError::Failed("Error: unable to create synchronization session: name in use".to_string()),
        );
        match error {
            Error::Daemon(text) => assert_eq!(
                text,
                "Error: unable to create synchronization session: name in use"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_session_maps_to_not_found() {
        let error = MutagenCli::not_found_for(
            "ghost",
            Error::Daemon("Error: unable to locate requested sessions".to_string()),
        );
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_unreachable() {
        let cli = MutagenCli::new(None, Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(cli.status().await, DaemonStatus::Unreachable);
        assert!(cli.list().await.unwrap_err().is_unreachable());
        assert!(cli.executable().is_none());
    }

    #[tokio::test]
    async fn nonexistent_binary_path_is_unreachable() {
        let cli = MutagenCli::new(
            Some(PathBuf::from("/definitely/not/mutagen")),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        assert!(cli.start().await.unwrap_err().is_unreachable());
    }
}
