//! Command-line interface for queue-minder.
//!
//! This module provides CLI commands for inspecting and editing the
//! persisted playback queue from a shell.

mod commands;

pub use commands::{Cli, Commands, run_command};
