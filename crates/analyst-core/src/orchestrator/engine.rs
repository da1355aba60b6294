use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::prompts;
use super::retry::ModelCaller;
use super::{AnalysisObserver, CallKind, NoopObserver, OrchestratorConfig};
use crate::cache::ResultCache;
use crate::dashboard;
use crate::error::{AnalystError, Result};
use crate::model::{ContentBlock, Message, ModelClient};
use crate::registry::FileRegistry;
use crate::types::{
    AnalysisJob, AnalysisKind, AnalysisRequest, FileRecord, SubAnalysisMetadata,
    SubAnalysisResult, SynthesisMetadata, SynthesisResult,
};
use crate::upload::media_type_for;

/// Turns one analysis request into a synthesized report: cache lookup,
/// parallel sub-analyses, synthesis, dashboard extraction, cache fill.
pub struct AnalysisOrchestrator {
    caller: ModelCaller,
    files: Arc<FileRegistry>,
    cache: Arc<ResultCache>,
    observer: Arc<dyn AnalysisObserver>,
    permits: Semaphore,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        files: Arc<FileRegistry>,
        cache: Arc<ResultCache>,
        config: OrchestratorConfig,
    ) -> Self {
        Self::with_observer(model, files, cache, config, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        model: Arc<dyn ModelClient>,
        files: Arc<FileRegistry>,
        cache: Arc<ResultCache>,
        config: OrchestratorConfig,
        observer: Arc<dyn AnalysisObserver>,
    ) -> Self {
        let caller = ModelCaller::new(model, observer.clone(), config.retry);
        let permits = Semaphore::new(config.max_concurrent_analyses.max(1));
        Self {
            caller,
            files,
            cache,
            observer,
            permits,
            config,
        }
    }

    pub fn files(&self) -> &Arc<FileRegistry> {
        &self.files
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Run a full analysis.
    ///
    /// Fails with `Validation` when `file_info` or `prompt` is missing,
    /// `NotFound` when the file was never registered, and `Upstream` when
    /// every sub-analysis or the synthesis call fails.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<SynthesisResult> {
        let job = request.validate()?;
        self.observer.analysis_started();

        log::info!(
            "Analysis requested: file={}, prompt_length={}, connectors={}",
            job.file.name,
            job.prompt.len(),
            job.connectors.len()
        );

        let outcome = self.run(&job).await;
        if outcome.is_err() {
            self.observer.analysis_failed();
        }
        outcome
    }

    async fn run(&self, job: &AnalysisJob) -> Result<SynthesisResult> {
        let file_key = job.file.identity_key();
        let record = self.files.get(&file_key).ok_or_else(|| {
            AnalystError::NotFound(format!(
                "File {} has not been uploaded. Please upload the file first.",
                job.file.name
            ))
        })?;

        let fingerprint = self.config.fingerprint.fingerprint(&file_key, &job.prompt);
        if let Some(cached) = self.cache.get(&fingerprint) {
            log::info!("Returning cached analysis for {}", job.file.name);
            self.observer.cache_hit();
            return Ok(cached);
        }
        self.observer.cache_miss();

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AnalystError::upstream("analysis capacity is shut down"))?;

        let outcomes = self.fan_out(job, record).await;
        let (successes, failures): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(|r| r.is_success());

        if successes.is_empty() {
            let first = failures
                .iter()
                .find_map(|f| f.error.clone())
                .unwrap_or_else(|| "no sub-analysis produced a result".into());
            return Err(AnalystError::upstream(format!(
                "All analysis attempts failed: {}",
                first
            )));
        }

        let synthesis_prompt = prompts::synthesis(&job.file, &job.prompt, &successes, &failures);
        let analysis = self
            .caller
            .call(
                CallKind::Synthesis,
                &[Message::user_text(synthesis_prompt)],
                self.config.synthesis_max_tokens,
            )
            .await
            .map_err(|e| {
                log::error!("Synthesis failed: {}", e);
                e
            })?;

        let dashboard_data = dashboard::extract(&analysis, &successes);
        let result = SynthesisResult {
            analysis,
            dashboard_data,
            metadata: SynthesisMetadata {
                sources_used: successes.len(),
                failed_sources: failures.len(),
                file_info: job.file.clone(),
                synthesis_timestamp: Utc::now(),
                cache_key: format!("synthesis-{}", Uuid::now_v7()),
            },
        };

        if let Err(e) = self.cache.set(&fingerprint, result.clone()) {
            log::warn!("Failed to cache analysis for {}: {}", job.file.name, e);
        }

        log::info!(
            "Analysis complete for {} ({} succeeded, {} failed)",
            job.file.name,
            successes.len(),
            failures.len()
        );
        Ok(result)
    }

    /// Launch every sub-analysis as its own task and wait for all of them.
    /// Results come back in submission order: primary first.
    async fn fan_out(&self, job: &AnalysisJob, record: FileRecord) -> Vec<SubAnalysisResult> {
        let mut kinds = vec![AnalysisKind::Primary];
        let mut tasks = vec![tokio::spawn(primary_analysis(
            self.caller.clone(),
            record,
            job.prompt.clone(),
            self.config.primary_max_tokens,
        ))];

        if job.config.include_cross_reference {
            kinds.push(AnalysisKind::CrossReference);
            tasks.push(tokio::spawn(cross_reference_analysis(
                self.caller.clone(),
                job.clone(),
                self.config.cross_reference_max_tokens,
            )));
        }

        join_all(tasks)
            .await
            .into_iter()
            .zip(kinds)
            .map(|(joined, kind)| {
                joined.unwrap_or_else(|e| {
                    log::error!("{} analysis task aborted: {}", kind.as_str(), e);
                    SubAnalysisResult::failed(
                        kind,
                        format!("{} analysis task aborted", kind.as_str()),
                        aborted_metadata(kind, job),
                    )
                })
            })
            .collect()
    }
}

async fn primary_analysis(
    caller: ModelCaller,
    record: FileRecord,
    prompt: String,
    max_tokens: u32,
) -> SubAnalysisResult {
    let media_type = media_type_for(&record.filename);
    let metadata = SubAnalysisMetadata::Primary {
        filename: record.filename.clone(),
        size: record.size,
        media_type: media_type.to_string(),
        timestamp: Utc::now(),
    };

    match read_and_analyze(&caller, &record, media_type, &prompt, max_tokens).await {
        Ok(text) => SubAnalysisResult::completed(AnalysisKind::Primary, text, metadata),
        Err(e) => {
            log::warn!("Primary analysis failed: {}", e);
            SubAnalysisResult::failed(AnalysisKind::Primary, e.to_string(), metadata)
        }
    }
}

async fn read_and_analyze(
    caller: &ModelCaller,
    record: &FileRecord,
    media_type: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String> {
    let bytes = tokio::fs::read(&record.path).await?;
    let message = Message::user_blocks(vec![
        ContentBlock::base64_document(media_type, &bytes),
        ContentBlock::text(prompts::primary(prompt)),
    ]);
    caller.call(CallKind::Primary, &[message], max_tokens).await
}

async fn cross_reference_analysis(
    caller: ModelCaller,
    job: AnalysisJob,
    max_tokens: u32,
) -> SubAnalysisResult {
    let metadata = SubAnalysisMetadata::CrossReference {
        connectors: job.connectors.clone(),
        timestamp: Utc::now(),
    };
    let message = Message::user_text(prompts::cross_reference(
        &job.file,
        &job.prompt,
        &job.connectors,
    ));

    match caller
        .call(CallKind::CrossReference, &[message], max_tokens)
        .await
    {
        Ok(text) => SubAnalysisResult::completed(AnalysisKind::CrossReference, text, metadata),
        Err(e) => {
            log::warn!("Cross-reference analysis failed: {}", e);
            SubAnalysisResult::failed(AnalysisKind::CrossReference, e.to_string(), metadata)
        }
    }
}

fn aborted_metadata(kind: AnalysisKind, job: &AnalysisJob) -> SubAnalysisMetadata {
    match kind {
        AnalysisKind::Primary => SubAnalysisMetadata::Primary {
            filename: job.file.name.clone(),
            size: job.file.size,
            media_type: media_type_for(&job.file.name).to_string(),
            timestamp: Utc::now(),
        },
        AnalysisKind::CrossReference => SubAnalysisMetadata::CrossReference {
            connectors: job.connectors.clone(),
            timestamp: Utc::now(),
        },
    }
}
