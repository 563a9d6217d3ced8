//! SyncDeck CLI - manage saved connections and live Mutagen sessions.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, ConnectionCommands, DaemonCommands};
use crate::commands::common::open_engine;
use crate::commands::{connections, daemon, sessions, watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("syncdeck=warn".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = open_engine(cli.db_path.as_deref()).await?;

    match cli.command {
        Commands::Connections(command) => match command {
            ConnectionCommands::List { json } => connections::run_list(&engine, json).await?,
            ConnectionCommands::Show { id } => connections::run_show(&engine, &id).await?,
            ConnectionCommands::Add(args) => connections::run_add(&engine, args).await?,
            ConnectionCommands::Edit { id, changes } => {
                connections::run_edit(&engine, &id, changes).await?;
            }
            ConnectionCommands::Remove { id } => connections::run_remove(&engine, &id).await?,
            ConnectionCommands::Duplicate { id } => {
                connections::run_duplicate(&engine, &id).await?;
            }
            ConnectionCommands::Export { output } => {
                connections::run_export(&engine, output.as_deref()).await?;
            }
            ConnectionCommands::Import { path } => {
                connections::run_import(&engine, &path).await?;
            }
        },
        Commands::Connect { id } => connections::run_connect(&engine, &id).await?,
        Commands::Sessions { json } => sessions::run_sessions(&engine, json).await?,
        Commands::Session { action, name } => {
            sessions::run_action(&engine, &name, action.into()).await?;
        }
        Commands::Create {
            connection_id,
            initial,
        } => sessions::run_create(&engine, &connection_id, initial.into()).await?,
        Commands::Conflicts { name, json } => {
            sessions::run_conflicts(&engine, &name, json).await?;
        }
        Commands::Resolve { name, keep } => {
            sessions::run_resolve(&engine, &name, keep.into()).await?;
        }
        Commands::Daemon(DaemonCommands::Status) => daemon::run_status(&engine).await?,
        Commands::Daemon(DaemonCommands::Start) => daemon::run_start(&engine).await?,
        Commands::Keys => daemon::run_keys(&engine),
        Commands::Watch => watch::run_watch(engine).await?,
    }

    Ok(())
}
