//! Connection import/export bundle format shared by the API and CLI.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Connection, ConnectionConfig, SyncMode};

/// Version written into every exported bundle
pub const BUNDLE_VERSION: &str = "1.0.0";

/// Serializable connection representation used in bundles.
///
/// Identity and timestamps are not carried; an import always mints fresh
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConnection {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub remote_path: String,
    pub local_path: String,
    pub ssh_key_path: Option<String>,
    pub sync_mode: SyncMode,
    pub tags: Vec<String>,
    pub is_favorite: bool,
}

impl From<&Connection> for ExportConnection {
    fn from(connection: &Connection) -> Self {
        Self {
            name: connection.name.clone(),
            host: connection.host.clone(),
            port: connection.port,
            username: connection.username.clone(),
            remote_path: connection.remote_path.clone(),
            local_path: connection.local_path.clone(),
            ssh_key_path: connection.ssh_key_path.clone(),
            sync_mode: connection.sync_mode,
            tags: connection.tags.iter().cloned().collect(),
            is_favorite: connection.is_favorite,
        }
    }
}

/// Full export document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub version: String,
    /// RFC 3339 timestamp
    pub exported_at: String,
    pub connections: Vec<ExportConnection>,
}

/// Build a bundle from stored connections.
#[must_use]
pub fn build_bundle(connections: &[Connection]) -> ExportBundle {
    ExportBundle {
        version: BUNDLE_VERSION.to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        connections: connections.iter().map(ExportConnection::from).collect(),
    }
}

/// Incoming bundle. Records stay untyped so one malformed entry doesn't
/// reject the whole batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportBundle {
    #[serde(default)]
    pub connections: Vec<serde_json::Value>,
}

const fn import_default_port() -> u16 {
    22
}

const fn import_default_mode() -> SyncMode {
    SyncMode::OneWaySafe
}

#[derive(Deserialize)]
struct ImportRecord {
    name: String,
    host: String,
    #[serde(default = "import_default_port")]
    port: u16,
    username: String,
    remote_path: String,
    local_path: String,
    #[serde(default)]
    ssh_key_path: Option<String>,
    #[serde(default = "import_default_mode")]
    sync_mode: SyncMode,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    is_favorite: bool,
}

/// Turn one imported record into a validated config.
pub fn record_to_config(record: &serde_json::Value) -> Result<ConnectionConfig> {
    let record: ImportRecord = serde_json::from_value(record.clone())?;
    let config = ConnectionConfig {
        name: record.name,
        host: record.host,
        port: record.port,
        username: record.username,
        remote_path: record.remote_path,
        local_path: record.local_path,
        ssh_key_path: record.ssh_key_path,
        sync_mode: record.sync_mode,
        tags: record.tags,
        is_favorite: record.is_favorite,
    }
    .normalized();
    config.validate()?;
    Ok(config)
}

/// Parse a bundle from raw JSON text.
pub fn parse_bundle(payload: &str) -> Result<ImportBundle> {
    serde_json::from_str(payload)
        .map_err(|error| Error::InvalidInput(format!("invalid import bundle: {error}")))
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(timestamp_ms: i64) -> String {
    format!("syncdeck-export-{timestamp_ms}.json")
}
