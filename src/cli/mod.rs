//! CLI module for Flowsmith
//!
//! # Commands
//!
//! - `serve` - Start the HTTP service
//! - `generate` - Submit a prompt to a running service
//! - `config init` - Write an example configuration file
//!
//! # Example
//!
//! ```bash
//! flowsmith serve -c flowsmith.toml
//! flowsmith generate "draw a login flow" --server http://localhost:3000
//! ```

pub mod config;
pub mod generate;
pub mod output;
pub mod serve;

pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "flowsmith.toml";

/// Flowsmith - prompt to diagram service
#[derive(Parser, Debug)]
#[command(
    name = "flowsmith",
    version,
    about = "Turn natural-language prompts into diagrams"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the Flowsmith server
    Serve(ServeArgs),
    /// Generate a diagram through a running server
    Generate(GenerateArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "FLOWSMITH_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "FLOWSMITH_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "FLOWSMITH_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// What to draw
    pub prompt: String,

    /// Server base URL
    #[arg(short, long, default_value = "http://localhost:3000", env = "FLOWSMITH_SERVER")]
    pub server: String,

    /// Output the raw response as JSON
    #[arg(long)]
    pub json: bool,

    /// Override the configured retry count
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Treat the link as slow and allow a longer deadline
    #[arg(long)]
    pub slow: bool,

    /// Minimum seconds to wait for each attempt (overrides retry.deadline_seconds)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to configuration file (for retry settings)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}
