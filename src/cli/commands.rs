//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cloudplan - declarative cloud infrastructure plans.
#[derive(Parser, Debug)]
#[command(name = "cloudplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the state file (defaults to ~/.cloudplan/state.yaml).
    #[arg(long, global = true, env = "CLOUDPLAN_STATE")]
    pub state_path: Option<PathBuf>,

    /// AWS access key id.
    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_key: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a plan's tasks in declared order.
    Setup {
        /// Path to the plan file.
        plan: PathBuf,

        /// Validate and describe without provisioning anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a plan's resources in reverse declared order.
    Teardown {
        /// Path to the plan file.
        plan: PathBuf,

        /// Validate and describe without removing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show documentation for the registered provisioners.
    Docs,

    /// Inspect the idempotency state store.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State inspection subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show all recorded references.
    Show,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
