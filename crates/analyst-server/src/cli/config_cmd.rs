use crate::cli::ConfigCommands;
use crate::config::AnalystConfig;
use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(cmd: ConfigCommands, config_path: &Path) -> Result<()> {
    match cmd {
        ConfigCommands::Validate => validate(config_path),
        ConfigCommands::Show => show(config_path),
    }
}

/// Parse and check the file. Exits non-zero on any problem.
fn validate(config_path: &Path) -> Result<()> {
    let config = match AnalystConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Failed to parse {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        println!("❌ Validation errors in {}:", config_path.display());
        for e in &errors {
            println!("  - {}", e);
        }
        std::process::exit(1);
    }

    println!("✅ {} is valid.", config_path.display());
    println!("  listen:    {}", config.server.http_addr);
    println!("  model:     {}", config.model.model);
    println!(
        "  cache:     {} entries / {} MB / {}s",
        config.cache.max_entries, config.cache.max_mb, config.cache.ttl_secs
    );
    println!(
        "  files:     {} entries / {} MB / {}h",
        config.files.max_entries, config.files.max_mb, config.files.ttl_hours
    );
    if config.model.resolved_api_key().is_none() {
        println!("⚠️  {} is not set; the server will not start.", config.model.api_key_env);
    }
    Ok(())
}

/// Print the effective configuration, defaults filled in.
fn show(config_path: &Path) -> Result<()> {
    let config = AnalystConfig::load_or_default(config_path);
    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("# effective configuration ({})", config_path.display());
    println!("{}", rendered);
    Ok(())
}
