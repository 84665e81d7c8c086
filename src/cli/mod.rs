//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "termpulse",
    version,
    about = "Shell activity watcher that turns terminal events into notifications",
    long_about = "Termpulse tails a structured shell activity log, classifies completed builds, \
                  test runs, finished tasks, and AI assistant output, filters out noise and \
                  duplicates, and publishes the survivors as desktop-style notifications."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/termpulse/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the watcher in the foreground until interrupted
    Run {
        /// Volume profile to apply ("quiet", "normal", "busy", or user-defined)
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Replay an existing log file through the detector and print the results
    Check {
        /// Log file to replay
        file: PathBuf,
    },

    /// Show resolved configuration and activity log state
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
