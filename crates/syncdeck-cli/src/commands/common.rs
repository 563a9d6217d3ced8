use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use syncdeck_core::conflicts::PendingConflicts;
use syncdeck_core::hub::HubEvent;
use syncdeck_core::models::{Conflict, Connection, ConnectionConfig, ConnectionId, Session};
use syncdeck_core::{Engine, EngineConfig};

use crate::cli::{ConnectionArgs, ConnectionEdits};
use crate::error::CliError;

pub async fn open_engine(db_path: Option<&Path>) -> Result<Engine, CliError> {
    let mut config =
        EngineConfig::from_env().map_err(|error| CliError::Config(error.to_string()))?;
    if let Some(path) = db_path {
        config.db_path = path.to_path_buf();
    }
    Ok(Engine::open(config).await?)
}

pub fn parse_connection_id(raw: &str) -> Result<ConnectionId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidConnectionId(raw.trim().to_string()))
}

pub fn config_from_args(args: ConnectionArgs) -> ConnectionConfig {
    ConnectionConfig {
        name: args.name,
        host: args.host,
        port: args.port,
        username: args.username,
        remote_path: args.remote_path,
        local_path: args.local_path,
        ssh_key_path: args.ssh_key_path,
        sync_mode: args.mode.into(),
        tags: args.tags.into_iter().collect(),
        is_favorite: args.favorite,
    }
}

/// Overlay the given edits on an existing configuration.
pub fn apply_edits(mut config: ConnectionConfig, edits: ConnectionEdits) -> ConnectionConfig {
    if let Some(name) = edits.name {
        config.name = name;
    }
    if let Some(host) = edits.host {
        config.host = host;
    }
    if let Some(port) = edits.port {
        config.port = port;
    }
    if let Some(username) = edits.username {
        config.username = username;
    }
    if let Some(remote_path) = edits.remote_path {
        config.remote_path = remote_path;
    }
    if let Some(local_path) = edits.local_path {
        config.local_path = local_path;
    }
    if let Some(key) = edits.ssh_key_path {
        config.ssh_key_path = Some(key).filter(|key| !key.trim().is_empty());
    }
    if let Some(mode) = edits.mode {
        config.sync_mode = mode.into();
    }
    if let Some(tags) = edits.tags {
        config.tags = tags.into_iter().collect::<BTreeSet<_>>();
    }
    if let Some(favorite) = edits.favorite {
        config.is_favorite = favorite;
    }
    config
}

pub fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string())
}

pub fn format_connection_lines(connections: &[Connection]) -> Vec<String> {
    connections
        .iter()
        .map(|connection| {
            let favorite = if connection.is_favorite { "*" } else { " " };
            let last_used = connection
                .last_used
                .map_or_else(|| "never".to_string(), format_timestamp);
            format!(
                "{favorite} {}  {}  {}@{}:{}  {} <-> {}  [{}]  last used {last_used}",
                connection.id,
                connection.name,
                connection.username,
                connection.host,
                connection.port,
                connection.local_path,
                connection.remote_path,
                connection.sync_mode,
            )
        })
        .collect()
}

fn connected_mark(connected: bool) -> &'static str {
    if connected {
        "up"
    } else {
        "down"
    }
}

pub fn format_session_lines(sessions: &[Session]) -> Vec<String> {
    sessions
        .iter()
        .map(|session| {
            format!(
                "{}  {:<12}  alpha {} ({})  beta {} ({})",
                session.name,
                session.status.to_string(),
                session.alpha.url,
                connected_mark(session.alpha.connected),
                session.beta.url,
                connected_mark(session.beta.connected),
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[Conflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  alpha {}  beta {}",
                conflict.path,
                conflict.alpha_digest.as_deref().unwrap_or("-"),
                conflict.beta_digest.as_deref().unwrap_or("-"),
            )
        })
        .collect()
}

pub fn format_pending(pending: &PendingConflicts) -> Option<String> {
    let active = pending.active.as_ref()?;
    let mut line = format!(
        "{} has {} conflict(s) awaiting a decision",
        active.session_name,
        active.conflicts.len()
    );
    if !pending.queued.is_empty() {
        line.push_str(&format!("; queued: {}", pending.queued.join(", ")));
    }
    Some(line)
}

pub fn format_event_line(event: &HubEvent) -> String {
    match event {
        HubEvent::SessionChanged { change, session } => {
            let change = match change {
                syncdeck_core::hub::ChangeKind::Added => "added",
                syncdeck_core::hub::ChangeKind::Removed => "removed",
                syncdeck_core::hub::ChangeKind::Changed => "changed",
            };
            format!("session {change}: {} ({})", session.name, session.status)
        }
        HubEvent::DaemonStatus { status } => format!("daemon {status}"),
        HubEvent::ConflictPrompt {
            session_name,
            conflicts,
        } => format!(
            "conflicts in {session_name}: {} path(s); run `syncdeck resolve {session_name} --keep local|remote`",
            conflicts.len()
        ),
        HubEvent::ConflictResolved {
            session_name,
            winner,
        } => format!("conflicts in {session_name} resolved keeping {winner}"),
    }
}
