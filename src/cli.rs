//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Permgate - conversational action gateway for PERM case management
#[derive(Parser, Debug)]
#[command(name = "permgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PERMGATE_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PERMGATE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "PERMGATE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PERMGATE_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PERMGATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Load and validate configuration, then exit
    CheckConfig,

    /// Print the tool catalog as JSON, then exit
    Tools,
}
