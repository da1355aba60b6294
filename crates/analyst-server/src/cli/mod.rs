pub mod analyze;
pub mod config_cmd;
pub mod remote;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "analyst")]
#[command(version, about = "Cached multi-source data analysis over a language-model API")]
pub struct Cli {
    /// Path to analyst.toml
    #[arg(
        long,
        global = true,
        env = "ANALYST_CONFIG",
        default_value = "analyst.toml"
    )]
    pub config: PathBuf,

    /// Analyst server address for client commands
    #[arg(
        long,
        global = true,
        env = "ANALYST_ADDR",
        default_value = "http://localhost:3001"
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,
    /// Analyze a local file once, without a server
    Analyze(AnalyzeArgs),
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Show server status
    Status,
    /// Inspect or clear the server's result cache
    #[command(subcommand)]
    Cache(CacheCommands),
    /// List files registered on the server
    Files,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// File to analyze
    #[arg(long)]
    pub file: PathBuf,
    /// What to look for in the data
    #[arg(long)]
    pub prompt: String,
    /// Skip the cross-reference analysis
    #[arg(long)]
    pub no_cross_reference: bool,
    /// Connector identifiers to mention in the cross-reference analysis
    #[arg(long = "connector")]
    pub connectors: Vec<String>,
    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Validate,
    Show,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    Show,
    Clear,
}
