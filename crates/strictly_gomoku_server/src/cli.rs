//! Command-line interface for strictly_gomoku.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Gomoku - authoritative five-in-a-row match server
#[derive(Parser, Debug)]
#[command(name = "strictly_gomoku")]
#[command(about = "Authoritative Gomoku match server over WebSocket", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the match server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to (overrides config and environment)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config and environment)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}
