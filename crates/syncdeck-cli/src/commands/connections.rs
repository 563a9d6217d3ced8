use std::path::Path;

use syncdeck_core::engine::QuickConnect;
use syncdeck_core::export::{parse_bundle, suggested_export_file_name};
use syncdeck_core::util::unix_millis_now;
use syncdeck_core::Engine;

use crate::cli::{ConnectionArgs, ConnectionEdits};
use crate::commands::common::{
    apply_edits, config_from_args, format_connection_lines, parse_connection_id,
};
use crate::error::CliError;

pub async fn run_list(engine: &Engine, as_json: bool) -> Result<(), CliError> {
    let connections = engine.list_connections().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&connections)?);
    } else if connections.is_empty() {
        println!("No saved connections");
    } else {
        for line in format_connection_lines(&connections) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_show(engine: &Engine, id: &str) -> Result<(), CliError> {
    let connection = engine.get_connection(&parse_connection_id(id)?).await?;
    println!("{}", serde_json::to_string_pretty(&connection)?);
    Ok(())
}

pub async fn run_add(engine: &Engine, args: ConnectionArgs) -> Result<(), CliError> {
    let connection = engine.create_connection(config_from_args(args)).await?;
    println!("{}", connection.id);
    Ok(())
}

pub async fn run_edit(engine: &Engine, id: &str, edits: ConnectionEdits) -> Result<(), CliError> {
    let id = parse_connection_id(id)?;
    let current = engine.get_connection(&id).await?;
    let updated = engine
        .update_connection(&id, apply_edits(current.config(), edits))
        .await?;
    println!("{}", updated.id);
    Ok(())
}

pub async fn run_remove(engine: &Engine, id: &str) -> Result<(), CliError> {
    let removed = engine.delete_connection(&parse_connection_id(id)?).await?;
    println!("{}", removed.id);
    Ok(())
}

pub async fn run_duplicate(engine: &Engine, id: &str) -> Result<(), CliError> {
    let copy = engine
        .duplicate_connection(&parse_connection_id(id)?)
        .await?;
    println!("{}  {}", copy.id, copy.name);
    Ok(())
}

pub async fn run_export(engine: &Engine, output_path: Option<&Path>) -> Result<(), CliError> {
    let bundle = engine.export_connections().await?;
    let rendered = serde_json::to_string_pretty(&bundle)?;

    if let Some(path) = output_path {
        let path = if path.is_dir() {
            path.join(suggested_export_file_name(unix_millis_now()))
        } else {
            path.to_path_buf()
        };
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }
    Ok(())
}

pub async fn run_import(engine: &Engine, path: &Path) -> Result<(), CliError> {
    let payload = std::fs::read_to_string(path)?;
    let bundle = parse_bundle(&payload)?;
    let report = engine.import_connections(&bundle).await?;
    println!(
        "Imported {} connection(s), skipped {}",
        report.imported, report.skipped
    );
    Ok(())
}

pub async fn run_connect(engine: &Engine, id: &str) -> Result<(), CliError> {
    match engine.quick_connect(&parse_connection_id(id)?).await? {
        QuickConnect::Resumed { session_name } => println!("Resumed {session_name}"),
        QuickConnect::Created { session } => println!("Created {}", session.name),
    }
    Ok(())
}
