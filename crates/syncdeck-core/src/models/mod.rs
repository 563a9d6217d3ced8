//! Data models for SyncDeck

mod conflict;
mod connection;
mod session;

pub use conflict::{Conflict, ResolutionDecision, Side};
pub use connection::{Connection, ConnectionConfig, ConnectionId, InitialSyncDirection, SyncMode};
pub use session::{DaemonStatus, Endpoint, Session, SessionAction, SessionRef, SessionStatus};
