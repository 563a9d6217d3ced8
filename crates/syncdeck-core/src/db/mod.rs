//! Database layer for SyncDeck

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{ConnectionRepository, LibSqlConnectionRepository};
