use syncdeck_core::models::{InitialSyncDirection, ResolutionDecision, SessionAction, Side};
use syncdeck_core::Engine;

use crate::commands::common::{
    format_conflict_lines, format_pending, format_session_lines, parse_connection_id,
};
use crate::error::CliError;

pub async fn run_sessions(engine: &Engine, as_json: bool) -> Result<(), CliError> {
    let sessions = engine.list_sessions().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else if sessions.is_empty() {
        println!("No sessions");
    } else {
        for line in format_session_lines(&sessions) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_action(engine: &Engine, name: &str, action: SessionAction) -> Result<(), CliError> {
    engine.session_action(name, action).await?;
    println!("{action} {name}");
    Ok(())
}

pub async fn run_create(
    engine: &Engine,
    connection_id: &str,
    initial: InitialSyncDirection,
) -> Result<(), CliError> {
    let connection = engine
        .get_connection(&parse_connection_id(connection_id)?)
        .await?;
    let created = engine.create_session(connection.config(), initial).await?;
    match created.identifier {
        Some(identifier) => println!("{}  {identifier}", created.name),
        None => println!("{}", created.name),
    }
    Ok(())
}

pub async fn run_conflicts(engine: &Engine, name: &str, as_json: bool) -> Result<(), CliError> {
    let conflicts = engine.conflicts(name).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }
    if conflicts.is_empty() {
        println!("No conflicts in {name}");
        return Ok(());
    }
    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    if let Some(line) = format_pending(&engine.pending_conflicts()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(engine: &Engine, name: &str, winner: Side) -> Result<(), CliError> {
    // Seed the controller so an already prompted session is recognised.
    engine.conflicts(name).await?;
    let created = engine
        .resolve_conflict(&ResolutionDecision {
            session_name: name.to_string(),
            winner,
        })
        .await?;
    println!("Recreated {} keeping {winner}", created.name);
    Ok(())
}
