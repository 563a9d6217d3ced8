use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use syncdeck_core::models::{InitialSyncDirection, SessionAction, Side, SyncMode};

#[derive(Parser)]
#[command(name = "syncdeck")]
#[command(about = "Manage Mutagen sync sessions and saved connections")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the connection database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage saved connections
    #[command(subcommand, alias = "conn")]
    Connections(ConnectionCommands),
    /// Resume the connection's session, or create it
    Connect {
        /// Connection ID
        id: String,
    },
    /// List live sessions
    Sessions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pause, resume, flush or terminate a session
    Session {
        #[arg(value_enum)]
        action: ActionArg,
        /// Session name
        name: String,
    },
    /// Create the session for a saved connection
    Create {
        /// Connection ID
        connection_id: String,
        /// One-off copy before the session starts
        #[arg(long, value_enum, default_value_t = InitialArg::Skip)]
        initial: InitialArg,
    },
    /// Show a session's conflicts
    Conflicts {
        /// Session name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a session's conflicts by keeping one side
    Resolve {
        /// Session name
        name: String,
        /// Side whose content wins
        #[arg(long, value_enum)]
        keep: KeepArg,
    },
    /// Inspect or start the daemon
    #[command(subcommand)]
    Daemon(DaemonCommands),
    /// List private keys in ~/.ssh
    Keys,
    /// Poll sessions and print pushed events until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum ConnectionCommands {
    /// List saved connections
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one connection as JSON
    Show {
        /// Connection ID
        id: String,
    },
    /// Save a new connection
    Add(ConnectionArgs),
    /// Change fields of a saved connection
    Edit {
        /// Connection ID
        id: String,
        #[command(flatten)]
        changes: ConnectionEdits,
    },
    /// Delete a connection and its SSH alias
    #[command(alias = "rm")]
    Remove {
        /// Connection ID
        id: String,
    },
    /// Copy a connection under a new name
    Duplicate {
        /// Connection ID
        id: String,
    },
    /// Export every connection as a JSON bundle
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Import connections from a JSON bundle
    Import {
        /// Bundle file
        path: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Report whether the daemon is running
    Status,
    /// Start the daemon
    Start,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub host: String,
    #[arg(long, default_value_t = 22)]
    pub port: u16,
    #[arg(long = "user")]
    pub username: String,
    #[arg(long = "remote", value_name = "PATH")]
    pub remote_path: String,
    #[arg(long = "local", value_name = "PATH")]
    pub local_path: String,
    #[arg(long = "key", value_name = "PATH")]
    pub ssh_key_path: Option<String>,
    #[arg(long, value_enum, default_value_t = ModeArg::TwoWaySafe)]
    pub mode: ModeArg,
    /// Repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub favorite: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionEdits {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long = "user")]
    pub username: Option<String>,
    #[arg(long = "remote", value_name = "PATH")]
    pub remote_path: Option<String>,
    #[arg(long = "local", value_name = "PATH")]
    pub local_path: Option<String>,
    /// Empty string clears the key
    #[arg(long = "key", value_name = "PATH")]
    pub ssh_key_path: Option<String>,
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Replaces all tags; repeatable
    #[arg(long = "tag")]
    pub tags: Option<Vec<String>>,
    #[arg(long)]
    pub favorite: Option<bool>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    TwoWaySafe,
    TwoWayResolved,
    OneWaySafe,
    OneWayReplica,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::TwoWaySafe => Self::TwoWaySafe,
            ModeArg::TwoWayResolved => Self::TwoWayResolved,
            ModeArg::OneWaySafe => Self::OneWaySafe,
            ModeArg::OneWayReplica => Self::OneWayReplica,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ActionArg {
    Pause,
    Resume,
    Flush,
    Terminate,
}

impl From<ActionArg> for SessionAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Pause => Self::Pause,
            ActionArg::Resume => Self::Resume,
            ActionArg::Flush => Self::Flush,
            ActionArg::Terminate => Self::Terminate,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum InitialArg {
    Download,
    Upload,
    Skip,
}

impl From<InitialArg> for InitialSyncDirection {
    fn from(initial: InitialArg) -> Self {
        match initial {
            InitialArg::Download => Self::Download,
            InitialArg::Upload => Self::Upload,
            InitialArg::Skip => Self::Skip,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepArg {
    Local,
    Remote,
}

impl From<KeepArg> for Side {
    fn from(keep: KeepArg) -> Self {
        match keep {
            KeepArg::Local => Self::Alpha,
            KeepArg::Remote => Self::Beta,
        }
    }
}
