//! Error types for syncdeck-core

use thiserror::Error;

/// Result type alias using syncdeck-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in syncdeck-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown connection or session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or duplicate input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The daemon exited non-zero; carries its diagnostic text verbatim
    #[error("Daemon command failed: {0}")]
    Daemon(String),

    /// A daemon (or pre-seed) invocation exceeded its time budget
    #[error("`{command}` timed out after {seconds} seconds")]
    DaemonTimeout { command: String, seconds: u64 },

    /// The daemon is not running or its executable is missing
    #[error("Daemon unreachable: {0}")]
    DaemonUnreachable(String),

    /// Key permission correction failed
    #[error("Permission error: {0}")]
    Permission(String),

    /// Malformed daemon output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Initial rsync pre-seed failed
    #[error("Initial sync failed: {0}")]
    Preseed(String),
}

impl Error {
    /// Whether the error means the daemon itself could not be reached.
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::DaemonUnreachable(_))
    }
}
