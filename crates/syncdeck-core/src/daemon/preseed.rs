//! One-off rsync copy that seeds one side before a session is created.

use std::path::Path;
use std::time::Duration;

use super::runner::{self, RunError};
use crate::error::{Error, Result};
use crate::models::{Connection, InitialSyncDirection};
use crate::ssh::expand_home;

/// Build the rsync invocation (program first) for a direction.
///
/// Returns `None` for [`InitialSyncDirection::Skip`].
pub fn build_preseed_args(
    connection: &Connection,
    direction: InitialSyncDirection,
) -> Option<Vec<String>> {
    let remote = format!(
        "{}@{}:{}",
        connection.username, connection.host, connection.remote_path
    );

    let mut ssh = format!("ssh -p {}", connection.port);
    if let Some(key) = &connection.ssh_key_path {
        ssh.push_str(&format!(" -i {}", expand_home(key).display()));
    }
    ssh.push_str(" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null");

    let (source, target) = match direction {
        InitialSyncDirection::Skip => return None,
        InitialSyncDirection::Download => (format!("{remote}/"), connection.local_path.clone()),
        InitialSyncDirection::Upload => (format!("{}/", connection.local_path), remote),
    };

    Some(vec![
        "rsync".to_string(),
        "-avz".to_string(),
        "--progress".to_string(),
        "-e".to_string(),
        ssh,
        source,
        target,
    ])
}

/// Run the pre-seed copy. The local directory is created first.
pub async fn run_preseed(
    connection: &Connection,
    direction: InitialSyncDirection,
    timeout: Duration,
) -> Result<()> {
    let Some(mut args) = build_preseed_args(connection, direction) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(&connection.local_path).await?;

    let program = args.remove(0);
    tracing::info!(connection = %connection.name, direction = ?direction, "Running initial sync");
    runner::run(Path::new(&program), &args, &[], timeout)
        .await
        .map_err(|error| match error {
            RunError::Missing(message) => Error::Preseed(message),
            RunError::TimedOut => Error::DaemonTimeout {
                command: program.clone(),
                seconds: timeout.as_secs(),
            },
            RunError::Failed(text) => Error::Preseed(text),
            RunError::Io(error) => Error::Io(error),
        })?;
    tracing::info!(connection = %connection.name, "Initial sync finished");
    Ok(())
}
