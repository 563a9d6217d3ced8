//! Daemon process adapter: the only code that launches the synchronization
//! daemon's executable.

mod mutagen;
mod parse;
pub mod preseed;
mod runner;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Connection, Conflict, DaemonStatus, Session, SessionAction, SessionRef, Side, SyncMode};

pub use mutagen::{locate_mutagen, MutagenCli, INSTALL_URL};
pub use parse::{is_remote_url, parse_conflicts, parse_created_identifier, parse_sessions};

/// Everything `sync create` needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub mode: SyncMode,
    /// First endpoint passed to the daemon (source for one-way modes)
    pub alpha: String,
    /// Second endpoint passed to the daemon
    pub beta: String,
}

impl CreateSpec {
    /// Session for a stored connection reached through `alias`.
    ///
    /// One-way-replica connections treat the remote as authoritative and
    /// list it first; every other mode lists the local path first.
    pub fn for_connection(connection: &Connection, alias: &str, mode: SyncMode) -> Self {
        let local = connection.local_path.clone();
        let remote = format!("{}@{alias}:{}", connection.username, connection.remote_path);
        let (alpha, beta) = if mode == SyncMode::OneWayReplica {
            (remote, local)
        } else {
            (local, remote)
        };
        Self {
            name: connection.session_name(),
            mode,
            alpha,
            beta,
        }
    }

    /// One-way replica that makes `winner`'s content authoritative.
    pub fn replica(name: &str, winner: Side, local_url: &str, remote_url: &str) -> Self {
        let (source, target) = match winner {
            Side::Alpha => (local_url, remote_url),
            Side::Beta => (remote_url, local_url),
        };
        Self {
            name: name.to_string(),
            mode: SyncMode::OneWayReplica,
            alpha: source.to_string(),
            beta: target.to_string(),
        }
    }

    /// Arguments for the daemon executable
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "sync".to_string(),
            "create".to_string(),
            format!("--name={}", self.name),
            format!("--mode={}", self.mode.as_str()),
            "--default-file-mode=0644".to_string(),
            "--default-directory-mode=0755".to_string(),
            self.alpha.clone(),
            self.beta.clone(),
        ]
    }
}

/// Operations the engine needs from the synchronization daemon
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Launch session creation
    async fn create(&self, spec: &CreateSpec) -> Result<SessionRef>;

    /// Every session the daemon knows about
    async fn list(&self) -> Result<Vec<Session>>;

    /// Apply a lifecycle action to one session
    async fn action(&self, session_name: &str, action: SessionAction) -> Result<()>;

    /// Conflicts currently reported for one session
    async fn conflicts(&self, session_name: &str) -> Result<Vec<Conflict>>;

    /// Conflicts of every session from a single listing, keyed by session
    /// name; sessions without conflicts map to an empty list
    async fn all_conflicts(&self) -> Result<HashMap<String, Vec<Conflict>>>;

    /// Probe daemon reachability; never fails
    async fn status(&self) -> DaemonStatus;

    /// Start the daemon process
    async fn start(&self) -> Result<()>;

    /// Resolved executable path, if one was found
    fn executable(&self) -> Option<&Path>;
}
