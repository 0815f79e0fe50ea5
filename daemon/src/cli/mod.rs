//! Subcommand implementations.

pub mod config;
pub mod history;
pub mod parse;
pub mod status;
pub mod watch;
