//! Connection model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for a saved connection, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new unique connection ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Synchronization mode requested from the daemon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    #[default]
    TwoWaySafe,
    TwoWayResolved,
    OneWaySafe,
    OneWayReplica,
}

impl SyncMode {
    /// Value passed to the daemon's `--mode=` flag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TwoWaySafe => "two-way-safe",
            Self::TwoWayResolved => "two-way-resolved",
            Self::OneWaySafe => "one-way-safe",
            Self::OneWayReplica => "one-way-replica",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "two-way-safe" => Ok(Self::TwoWaySafe),
            "two-way-resolved" => Ok(Self::TwoWayResolved),
            "one-way-safe" => Ok(Self::OneWaySafe),
            "one-way-replica" => Ok(Self::OneWayReplica),
            other => Err(Error::InvalidInput(format!("unknown sync mode '{other}'"))),
        }
    }
}

/// Optional one-off copy performed before a session is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialSyncDirection {
    /// Remote contents are copied to the local path
    Download,
    /// Local contents are copied to the remote path
    Upload,
    Skip,
}

impl FromStr for InitialSyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(Self::Download),
            "upload" => Ok(Self::Upload),
            "skip" => Ok(Self::Skip),
            other => Err(Error::InvalidInput(format!(
                "unknown initial sync direction '{other}'"
            ))),
        }
    }
}

const fn default_port() -> u16 {
    22
}

/// User-supplied fields of a connection (everything except identity and timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub remote_path: String,
    pub local_path: String,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl ConnectionConfig {
    /// Trim free-text fields and drop blank key paths and tags.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.host = self.host.trim().to_string();
        self.username = self.username.trim().to_string();
        self.remote_path = self.remote_path.trim().to_string();
        self.local_path = self.local_path.trim().to_string();
        self.ssh_key_path = crate::util::normalize_text_option(self.ssh_key_path);
        self.tags = self
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        self
    }

    /// Check field-level invariants. Name uniqueness is the store's concern.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("host", &self.host),
            ("username", &self.username),
            ("remote_path", &self.remote_path),
            ("local_path", &self.local_path),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{field} must not be empty")));
            }
        }
        if self.port == 0 {
            return Err(Error::InvalidInput("port must be a positive integer".into()));
        }
        Ok(())
    }
}

/// A saved synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier
    pub id: ConnectionId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub remote_path: String,
    pub local_path: String,
    pub ssh_key_path: Option<String>,
    pub sync_mode: SyncMode,
    pub tags: BTreeSet<String>,
    pub is_favorite: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last quick-connect or session creation (Unix ms)
    pub last_used: Option<i64>,
}

impl Connection {
    /// Create a new connection from validated config
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            id: ConnectionId::new(),
            name: config.name,
            host: config.host,
            port: config.port,
            username: config.username,
            remote_path: config.remote_path,
            local_path: config.local_path,
            ssh_key_path: config.ssh_key_path,
            sync_mode: config.sync_mode,
            tags: config.tags,
            is_favorite: config.is_favorite,
            created_at: crate::util::unix_millis_now(),
            last_used: None,
        }
    }

    /// The user-editable part of this record
    #[must_use]
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            remote_path: self.remote_path.clone(),
            local_path: self.local_path.clone(),
            ssh_key_path: self.ssh_key_path.clone(),
            sync_mode: self.sync_mode,
            tags: self.tags.clone(),
            is_favorite: self.is_favorite,
        }
    }

    /// Name of the daemon session that belongs to this connection
    #[must_use]
    pub fn session_name(&self) -> String {
        crate::util::sanitize_name(&self.name)
    }
}
