//! Bounded-time external process execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

/// Why an external invocation did not produce output
#[derive(Debug)]
pub enum RunError {
    /// The executable does not exist
    Missing(String),
    /// The process outlived its budget and was killed
    TimedOut,
    /// Non-zero exit; carries stderr (or stdout when stderr is empty)
    Failed(String),
    /// Spawning or waiting failed for another reason
    Io(std::io::Error),
}

/// Render a program and its arguments for logs and error messages.
pub fn display_command(program: &Path, args: &[String]) -> String {
    let name = program
        .file_name()
        .map_or_else(|| program.to_string_lossy(), |name| name.to_string_lossy());
    let mut rendered = name.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Run `program args...`, returning stdout on success.
///
/// The child is killed if `timeout` elapses.
pub async fn run(
    program: &Path,
    args: &[String],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<String, RunError> {
    let rendered = display_command(program, args);
    tracing::debug!(command = %rendered, "Running external command");
    let started = Instant::now();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(error)) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(RunError::Missing(format!(
                "executable not found: {}",
                program.display()
            )));
        }
        Ok(Err(error)) => return Err(RunError::Io(error)),
        Err(_) => {
            tracing::warn!(command = %rendered, seconds = timeout.as_secs(), "Command timed out");
            return Err(RunError::TimedOut);
        }
    };

    let elapsed_ms = started.elapsed().as_millis();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        tracing::debug!(command = %rendered, elapsed_ms, "Command finished");
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr
    };
    tracing::debug!(
        command = %rendered,
        elapsed_ms,
        status = ?output.status.code(),
        stderr = %crate::util::compact_text(&message),
        "Command failed"
    );
    Err(RunError::Failed(message))
}
