//! CLI module
//!
//! Singer command-line interface.
//!
//! # Modes
//!
//! - `--discover` - print the catalog of available streams
//! - `--catalog` - sync the selected streams, resuming from `--state`
//! - `--events` - process change events line by line

mod commands;
mod runner;

pub use commands::Cli;
pub use runner::{process_events, Runner};
