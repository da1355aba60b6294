use crate::anthropic::AnthropicClient;
use crate::cli::AnalyzeArgs;
use crate::config::AnalystConfig;
use analyst_core::{
    media_type_for, AnalysisConfig, AnalysisOrchestrator, AnalysisRequest, FileInfo, FileRecord,
    FileRegistry, KeepStoredFile, ModelClient, ResultCache, SynthesisResult,
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;

pub async fn run(args: AnalyzeArgs, config: &AnalystConfig) -> Result<()> {
    let model = Arc::new(AnthropicClient::from_config(&config.model)?);
    let result = analyze_local(&args, config, model).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.analysis);
    println!();
    println!("{}", "─".repeat(50));
    println!(
        "Sources: {} used, {} failed",
        result.metadata.sources_used, result.metadata.failed_sources
    );
    for (name, value) in &result.dashboard_data.summary_metrics {
        println!("  {:24} {}", name, value);
    }
    if !result.dashboard_data.recommendations.is_empty() {
        println!("Recommendations:");
        for rec in &result.dashboard_data.recommendations {
            println!("  - {}", rec);
        }
    }
    Ok(())
}

/// Register the local file in a private registry and run one analysis.
/// The file is never copied, moved or deleted.
pub async fn analyze_local(
    args: &AnalyzeArgs,
    config: &AnalystConfig,
    model: Arc<dyn ModelClient>,
) -> Result<SynthesisResult> {
    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", args.file.display()))?
        .to_string();
    let size = tokio::fs::metadata(&args.file)
        .await
        .with_context(|| format!("Cannot read {}", args.file.display()))?
        .len();

    let policy = config.upload_policy();
    policy.check_name(&name)?;
    policy.check_size(size)?;

    let media_type = media_type_for(&name).to_string();
    let files = Arc::new(FileRegistry::with_hook(config.file_limits(), KeepStoredFile));
    let registered = files.put(FileRecord {
        filename: name.clone(),
        original_name: name.clone(),
        size,
        path: args.file.clone(),
        mimetype: media_type.clone(),
        uploaded_at: Utc::now(),
        source: "cli".to_string(),
    });
    if !registered {
        bail!(
            "{} ({} bytes) exceeds the [files] max_mb budget of {} MB",
            args.file.display(),
            size,
            config.files.max_mb
        );
    }

    let orchestrator = AnalysisOrchestrator::new(
        model,
        files,
        Arc::new(ResultCache::new(config.cache_limits())),
        config.orchestrator_config(),
    );

    let request = AnalysisRequest::new(
        FileInfo {
            name,
            size,
            media_type,
        },
        args.prompt.clone(),
    )
    .with_connectors(args.connectors.clone())
    .with_config(AnalysisConfig {
        include_cross_reference: !args.no_cross_reference,
        ..Default::default()
    });

    Ok(orchestrator.analyze(request).await?)
}
