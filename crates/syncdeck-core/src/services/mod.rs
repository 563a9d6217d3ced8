//! Shared services used by the API and CLI.

mod connection_store;

pub use connection_store::{ConnectionStore, ImportReport};
