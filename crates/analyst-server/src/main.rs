mod anthropic;
mod cli;
mod config;
mod http;
mod serve;

use clap::Parser;
use cli::{CacheCommands, Cli, Commands};
use config::AnalystConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = AnalystConfig::load_or_default(&cli.config);
            serve::run(config).await
        }
        Commands::Analyze(args) => {
            let config = AnalystConfig::load_or_default(&cli.config);
            cli::analyze::run(args, &config).await
        }
        Commands::Config(cmd) => cli::config_cmd::run(cmd, &cli.config).await,
        Commands::Status => cli::remote::status(&cli.server).await,
        Commands::Cache(CacheCommands::Show) => cli::remote::cache_show(&cli.server).await,
        Commands::Cache(CacheCommands::Clear) => cli::remote::cache_clear(&cli.server).await,
        Commands::Files => cli::remote::files(&cli.server).await,
    }
}
