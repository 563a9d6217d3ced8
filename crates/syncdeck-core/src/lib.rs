//! syncdeck-core - Core library for SyncDeck
//!
//! This crate contains the connection store, the SSH and daemon adapters,
//! session state tracking and conflict reconciliation shared by the HTTP
//! API and the CLI.

pub mod config;
pub mod conflicts;
pub mod daemon;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod hub;
pub mod locks;
pub mod models;
pub mod services;
pub mod ssh;
pub mod sync;
pub mod util;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
