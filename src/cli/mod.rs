//! Command-line interface for cloudplan.
//!
//! This module defines the CLI surface for running provisioning plans and
//! inspecting state.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
