//! Live session model as reported by the daemon

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Lifecycle status of a daemon session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Watching,
    Scanning,
    Reconciling,
    Staging,
    Transitioning,
    Saving,
    Paused,
    Disconnected,
    Error,
}

impl SessionStatus {
    /// Classify the daemon's human-readable status text.
    ///
    /// Returns `None` for text that matches no known phase.
    pub fn from_daemon_text(text: &str) -> Option<Self> {
        let text = text.to_ascii_lowercase();
        let status = if text.contains("paused") {
            Self::Paused
        } else if text.contains("disconnected") {
            Self::Disconnected
        } else if text.contains("connecting") {
            Self::Connecting
        } else if text.contains("watching") || text.contains("waiting") {
            Self::Watching
        } else if text.contains("scanning") {
            Self::Scanning
        } else if text.contains("reconciling") {
            Self::Reconciling
        } else if text.contains("staging") {
            Self::Staging
        } else if text.contains("transitioning") || text.contains("applying") {
            Self::Transitioning
        } else if text.contains("saving") {
            Self::Saving
        } else if text.contains("error") || text.contains("halted") || text.contains("problem") {
            Self::Error
        } else {
            return None;
        };
        Some(status)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Watching => "watching",
            Self::Scanning => "scanning",
            Self::Reconciling => "reconciling",
            Self::Staging => "staging",
            Self::Transitioning => "transitioning",
            Self::Saving => "saving",
            Self::Paused => "paused",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// One side of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// URL-like address (`/local/path` or `user@host:/path`)
    pub url: String,
    pub connected: bool,
}

/// A live synchronization session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Daemon-assigned identifier, never reused
    pub identifier: String,
    pub name: String,
    pub status: SessionStatus,
    /// Local side
    pub alpha: Endpoint,
    /// Remote side
    pub beta: Endpoint,
}

impl Session {
    /// Whether anything observers care about differs from `previous`.
    pub fn differs_from(&self, previous: &Self) -> bool {
        self.status != previous.status
            || self.alpha.connected != previous.alpha.connected
            || self.beta.connected != previous.beta.connected
    }
}

/// Lifecycle actions accepted by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Pause,
    Resume,
    Flush,
    Terminate,
}

impl SessionAction {
    /// Daemon subcommand for this action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Flush => "flush",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "flush" => Ok(Self::Flush),
            "terminate" => Ok(Self::Terminate),
            other => Err(Error::InvalidInput(format!("invalid action '{other}'"))),
        }
    }
}

/// Reference to a freshly created session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    pub name: String,
    /// Identifier echoed by the daemon, when it printed one
    pub identifier: Option<String>,
    /// Raw daemon output
    pub output: String,
}

/// Reachability of the daemon process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Running,
    Stopped,
    Unreachable,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unreachable => "unreachable",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_daemon_text() {
        assert_eq!(
            SessionStatus::from_daemon_text("[Paused]"),
            Some(SessionStatus::Paused)
        );
        assert_eq!(
            SessionStatus::from_daemon_text("Watching for changes"),
            Some(SessionStatus::Watching)
        );
        assert_eq!(
            SessionStatus::from_daemon_text("Connecting to beta"),
            Some(SessionStatus::Connecting)
        );
        assert_eq!(
            SessionStatus::from_daemon_text("Staging files on beta"),
            Some(SessionStatus::Staging)
        );
        assert_eq!(
            SessionStatus::from_daemon_text("Halted on root deletion"),
            Some(SessionStatus::Error)
        );
        assert_eq!(SessionStatus::from_daemon_text("Pondering"), None);
    }

    #[test]
    fn test_differs_ignores_urls() {
        let session = Session {
            identifier: "sync_1".to_string(),
            name: "proj".to_string(),
            status: SessionStatus::Watching,
            alpha: Endpoint {
                url: "/l".to_string(),
                connected: true,
            },
            beta: Endpoint {
                url: "u@h:/r".to_string(),
                connected: true,
            },
        };
        let mut moved = session.clone();
        moved.beta.url = "u@other:/r".to_string();
        assert!(!moved.differs_from(&session));

        moved.beta.connected = false;
        assert!(moved.differs_from(&session));
    }

    #[test]
    fn test_action_rejects_unknown() {
        assert_eq!("Pause".parse::<SessionAction>().unwrap(), SessionAction::Pause);
        assert!("reset".parse::<SessionAction>().is_err());
    }
}
