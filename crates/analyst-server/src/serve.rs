use crate::anthropic::AnthropicClient;
use crate::config::AnalystConfig;
use crate::http::{create_router, AppState};
use analyst_core::ModelClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// How often expired uploads and cache entries are swept without waiting
/// for a request to touch them.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(config: AnalystConfig) -> anyhow::Result<()> {
    info!("Starting Analyst server v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP: {}", config.server.http_addr);
    info!("Uploads: {:?}", config.server.upload_dir);

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config: {}", e);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    // Fail fast on a missing key before binding anything.
    let model = AnthropicClient::from_config(&config.model)?;
    info!("Model: {} via {}", model.model_name(), config.model.api_url);

    tokio::fs::create_dir_all(&config.server.upload_dir).await?;

    let state = AppState::build(&config, Arc::new(model));
    info!(
        "Result cache: {} entries, {} MB, {}s TTL ({:?} fingerprint)",
        config.cache.max_entries, config.cache.max_mb, config.cache.ttl_secs, config.cache.fingerprint
    );
    info!(
        "File registry: {} entries, {} MB, {}h TTL",
        config.files.max_entries, config.files.max_mb, config.files.ttl_hours
    );

    // Expiry sweep: purging also deletes expired uploads from disk.
    let sweep_task = {
        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let files = orchestrator.files().len();
                let cached = orchestrator.cache().len();
                tracing::debug!("Sweep: {} files registered, {} analyses cached", files, cached);
            }
        })
    };

    let app = create_router(state);
    let addr = config.server.http_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Analyst server ready on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep_task.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections...");
}
