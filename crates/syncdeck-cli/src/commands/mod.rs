pub mod common;
pub mod connections;
pub mod daemon;
pub mod sessions;
pub mod watch;
