use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::*;
use crate::cache::{default_cache_limits, ResultCache};
use crate::error::{AnalystError, Result};
use crate::model::{ContentBlock, Message, MessageContent, ModelClient};
use crate::registry::{default_registry_limits, FileRegistry, KeepStoredFile};
use crate::types::{AnalysisConfig, AnalysisRequest, FileInfo, FileRecord};

/// Scripted replies per call kind. An empty script answers with a default
/// text for that kind.
#[derive(Default)]
struct ScriptedModel {
    primary: Mutex<VecDeque<Result<String>>>,
    cross_reference: Mutex<VecDeque<Result<String>>>,
    synthesis: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<CallKind>>,
    budgets: Mutex<Vec<(CallKind, u32)>>,
    synthesis_prompts: Mutex<Vec<String>>,
    primary_delay: Option<Duration>,
}

impl ScriptedModel {
    fn with_delay(delay: Duration) -> Self {
        Self {
            primary_delay: Some(delay),
            ..Default::default()
        }
    }

    fn script(&self, kind: CallKind, reply: Result<String>) {
        let queue = match kind {
            CallKind::Primary => &self.primary,
            CallKind::CrossReference => &self.cross_reference,
            CallKind::Synthesis => &self.synthesis,
        };
        queue.lock().unwrap().push_back(reply);
    }

    fn calls(&self) -> Vec<CallKind> {
        self.calls.lock().unwrap().clone()
    }

    fn budgets(&self) -> Vec<(CallKind, u32)> {
        self.budgets.lock().unwrap().clone()
    }

    fn count(&self, kind: CallKind) -> usize {
        self.calls().into_iter().filter(|k| *k == kind).count()
    }

    fn classify(messages: &[Message]) -> CallKind {
        let has_document = messages.iter().any(|m| match &m.content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::Document { .. })),
            MessageContent::Text(_) => false,
        });
        if has_document {
            return CallKind::Primary;
        }
        let text: String = messages.iter().map(|m| m.text()).collect();
        if text.contains("cross-reference analysis") {
            CallKind::CrossReference
        } else {
            CallKind::Synthesis
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<String> {
        let kind = Self::classify(messages);
        self.budgets.lock().unwrap().push((kind, max_tokens));
        if kind == CallKind::Primary {
            if let Some(delay) = self.primary_delay {
                tokio::time::sleep(delay).await;
            }
        }
        // Recorded on completion, so the order reflects who finished first.
        self.calls.lock().unwrap().push(kind);

        let queue = match kind {
            CallKind::Primary => &self.primary,
            CallKind::CrossReference => &self.cross_reference,
            CallKind::Synthesis => {
                let text: String = messages.iter().map(|m| m.text()).collect();
                self.synthesis_prompts.lock().unwrap().push(text);
                &self.synthesis
            }
        };

        let scripted = queue.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(match kind {
                CallKind::Primary => "primary findings\nrows: 120".to_string(),
                CallKind::CrossReference => "benchmark context".to_string(),
                CallKind::Synthesis => {
                    "Executive summary\nrevenue: 1500.5\n- recommend weekly review".to_string()
                }
            })
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    failed_calls: AtomicUsize,
    failed: AtomicUsize,
}

impl AnalysisObserver for CountingObserver {
    fn analysis_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn cache_hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn cache_miss(&self) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn model_call(&self, _kind: CallKind, succeeded: bool) {
        if !succeeded {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn analysis_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    _dir: TempDir,
    model: Arc<ScriptedModel>,
    observer: Arc<CountingObserver>,
    orchestrator: AnalysisOrchestrator,
    file: FileInfo,
}

fn register(files: &FileRegistry, dir: &Path, name: &str, contents: &[u8]) -> FileInfo {
    let path = dir.join(format!("1700000000000-{}", name));
    std::fs::write(&path, contents).unwrap();
    files.put(FileRecord {
        filename: name.to_string(),
        original_name: name.to_string(),
        size: contents.len() as u64,
        path,
        mimetype: "text/csv".into(),
        uploaded_at: chrono::Utc::now(),
        source: "test".into(),
    });
    FileInfo {
        name: name.to_string(),
        size: contents.len() as u64,
        media_type: "text/csv".into(),
    }
}

fn fixture_with(model: ScriptedModel, config: OrchestratorConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let files = Arc::new(FileRegistry::with_hook(
        default_registry_limits(),
        KeepStoredFile,
    ));
    let file = register(&files, dir.path(), "sales.csv", b"region,total\nnorth,10\n");

    let model = Arc::new(model);
    let observer = Arc::new(CountingObserver::default());
    let orchestrator = AnalysisOrchestrator::with_observer(
        model.clone(),
        files,
        Arc::new(ResultCache::new(default_cache_limits())),
        config,
        observer.clone(),
    );

    Fixture {
        _dir: dir,
        model,
        observer,
        orchestrator,
        file,
    }
}

fn fixture() -> Fixture {
    fixture_with(ScriptedModel::default(), OrchestratorConfig::default())
}

#[tokio::test]
async fn test_full_analysis_uses_both_sources() {
    let f = fixture();
    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();

    assert_eq!(result.metadata.sources_used, 2);
    assert_eq!(result.metadata.failed_sources, 0);
    assert_eq!(result.metadata.file_info, f.file);
    assert!(result.metadata.cache_key.starts_with("synthesis-"));
    assert_eq!(result.dashboard_data.summary_metrics["revenue"], 1500.5);
    assert_eq!(result.dashboard_data.summary_metrics["sources_count"], 2.0);
    assert_eq!(
        result.dashboard_data.recommendations,
        vec!["recommend weekly review"]
    );
    assert_eq!(
        result.dashboard_data.sources,
        vec!["uploaded_file", "external_knowledge"]
    );

    assert_eq!(f.model.count(CallKind::Primary), 1);
    assert_eq!(f.model.count(CallKind::CrossReference), 1);
    assert_eq!(f.model.count(CallKind::Synthesis), 1);
    assert_eq!(f.orchestrator.cache().len(), 1);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let f = fixture();
    let request = AnalysisRequest::new(f.file.clone(), "find trends");

    let first = f.orchestrator.analyze(request.clone()).await.unwrap();
    let calls_after_first = f.model.calls().len();
    let second = f.orchestrator.analyze(request).await.unwrap();

    assert_eq!(f.model.calls().len(), calls_after_first);
    assert_eq!(first, second);
    assert_eq!(f.observer.hits.load(Ordering::SeqCst), 1);
    assert_eq!(f.observer.misses.load(Ordering::SeqCst), 1);

    let stats = f.orchestrator.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_different_prompt_misses_cache() {
    let f = fixture();
    f.orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();
    f.orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find outliers"))
        .await
        .unwrap();

    assert_eq!(f.model.count(CallKind::Synthesis), 2);
    assert_eq!(f.orchestrator.cache().len(), 2);
}

#[tokio::test]
async fn test_cross_reference_disabled_runs_single_sub_analysis() {
    let f = fixture();
    let request = AnalysisRequest::new(f.file.clone(), "find trends").with_config(AnalysisConfig {
        include_cross_reference: false,
        ..Default::default()
    });

    let result = f.orchestrator.analyze(request).await.unwrap();

    assert_eq!(f.model.count(CallKind::Primary), 1);
    assert_eq!(f.model.count(CallKind::CrossReference), 0);
    assert_eq!(result.metadata.sources_used, 1);
    assert_eq!(result.metadata.failed_sources, 0);
    assert_eq!(result.dashboard_data.sources, vec!["uploaded_file"]);
}

#[tokio::test]
async fn test_cross_reference_failure_is_tolerated() {
    let model = ScriptedModel::default();
    model.script(
        CallKind::CrossReference,
        Err(AnalystError::upstream_status(529, "overloaded")),
    );
    let f = fixture_with(model, OrchestratorConfig::default());

    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();

    assert_eq!(result.metadata.sources_used, 1);
    assert!(result.metadata.failed_sources >= 1);

    let prompts = f.model.synthesis_prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("FAILED ANALYSES: 1"));
    assert!(prompts[0].contains("overloaded"));
    assert!(!prompts[0].contains("CROSS_REFERENCE_ANALYSIS"));
}

#[tokio::test]
async fn test_primary_failure_still_synthesizes_cross_reference() {
    let model = ScriptedModel::default();
    model.script(CallKind::Primary, Err(AnalystError::upstream("boom")));
    let f = fixture_with(model, OrchestratorConfig::default());

    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();

    assert_eq!(result.metadata.sources_used, 1);
    assert_eq!(result.metadata.failed_sources, 1);
    assert_eq!(result.dashboard_data.sources, vec!["external_knowledge"]);
}

#[tokio::test]
async fn test_all_sub_analyses_failing_is_an_error() {
    let model = ScriptedModel::default();
    model.script(CallKind::Primary, Err(AnalystError::upstream("primary down")));
    model.script(
        CallKind::CrossReference,
        Err(AnalystError::upstream("cross down")),
    );
    let f = fixture_with(model, OrchestratorConfig::default());

    let err = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap_err();

    match err {
        AnalystError::Upstream { message, .. } => {
            assert!(message.starts_with("All analysis attempts failed"));
            assert!(message.contains("primary down"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(f.model.count(CallKind::Synthesis), 0);
    assert!(f.orchestrator.cache().is_empty());
    assert_eq!(f.observer.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_synthesis_failure_is_not_cached() {
    let model = ScriptedModel::default();
    model.script(CallKind::Synthesis, Err(AnalystError::upstream_status(500, "bad")));
    let f = fixture_with(model, OrchestratorConfig::default());
    let request = AnalysisRequest::new(f.file.clone(), "find trends");

    let err = f.orchestrator.analyze(request.clone()).await.unwrap_err();
    assert!(matches!(err, AnalystError::Upstream { status: Some(500), .. }));
    assert!(f.orchestrator.cache().is_empty());

    // Next attempt recomputes instead of replaying the failure.
    f.orchestrator.analyze(request).await.unwrap();
    assert_eq!(f.model.count(CallKind::Synthesis), 2);
}

#[tokio::test]
async fn test_unregistered_file_is_not_found() {
    let f = fixture();
    let unknown = FileInfo {
        name: "missing.csv".into(),
        size: 3,
        media_type: "text/csv".into(),
    };

    let err = f
        .orchestrator
        .analyze(AnalysisRequest::new(unknown, "find trends"))
        .await
        .unwrap_err();

    match err {
        AnalystError::NotFound(message) => assert_eq!(
            message,
            "File missing.csv has not been uploaded. Please upload the file first."
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert!(f.model.calls().is_empty());
}

#[tokio::test]
async fn test_size_mismatch_is_not_found() {
    let f = fixture();
    let mut info = f.file.clone();
    info.size += 1;

    let err = f
        .orchestrator
        .analyze(AnalysisRequest::new(info, "find trends"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalystError::NotFound(_)));
}

#[tokio::test]
async fn test_missing_fields_fail_validation() {
    let f = fixture();

    let missing_prompt = AnalysisRequest {
        file_info: Some(f.file.clone()),
        ..Default::default()
    };
    let empty_prompt = AnalysisRequest::new(f.file.clone(), "");

    for request in [missing_prompt, empty_prompt, AnalysisRequest::default()] {
        let err = f.orchestrator.analyze(request).await.unwrap_err();
        assert!(matches!(err, AnalystError::Validation(_)));
    }
    assert!(f.model.calls().is_empty());
    assert_eq!(f.observer.started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connectors_reach_cross_reference_prompt_only() {
    struct PromptCapture {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelClient for PromptCapture {
        async fn complete(&self, messages: &[Message], _max_tokens: u32) -> Result<String> {
            let text: String = messages.iter().map(|m| m.text()).collect();
            self.seen.lock().unwrap().push(text);
            Ok("ok".into())
        }

        fn model_name(&self) -> &str {
            "capture"
        }
    }

    let dir = TempDir::new().unwrap();
    let files = Arc::new(FileRegistry::with_hook(
        default_registry_limits(),
        KeepStoredFile,
    ));
    let file = register(&files, dir.path(), "a.csv", b"x");
    let model = Arc::new(PromptCapture {
        seen: Mutex::new(Vec::new()),
    });
    let orchestrator = AnalysisOrchestrator::new(
        model.clone(),
        files,
        Arc::new(ResultCache::default()),
        OrchestratorConfig::default(),
    );

    orchestrator
        .analyze(
            AnalysisRequest::new(file, "q")
                .with_connectors(vec!["warehouse".into(), "crm".into()]),
        )
        .await
        .unwrap();

    let seen = model.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    let with_connectors: Vec<_> = seen
        .iter()
        .filter(|s| s.contains("Connected sources: warehouse, crm"))
        .collect();
    assert_eq!(with_connectors.len(), 1);
    assert!(with_connectors[0].contains("cross-reference analysis"));
}

#[tokio::test]
async fn test_synthesis_prompt_keeps_submission_order() {
    // Primary finishes last but is still listed first.
    let f = fixture_with(
        ScriptedModel::with_delay(Duration::from_millis(50)),
        OrchestratorConfig::default(),
    );

    f.orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();

    let calls = f.model.calls();
    assert_eq!(calls.first(), Some(&CallKind::CrossReference));

    let prompt = f.model.synthesis_prompts.lock().unwrap()[0].clone();
    let primary = prompt.find("--- PRIMARY_ANALYSIS (uploaded_file) ---").unwrap();
    let cross = prompt
        .find("--- CROSS_REFERENCE_ANALYSIS (external_knowledge) ---")
        .unwrap();
    assert!(primary < cross);
}

#[tokio::test]
async fn test_upstream_failures_are_retried() {
    let model = ScriptedModel::default();
    model.script(CallKind::Synthesis, Err(AnalystError::upstream("flaky")));
    let config = OrchestratorConfig::default().with_retry(RetryPolicy::new(2, None));
    let f = fixture_with(model, config);

    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await;

    assert!(result.is_ok());
    assert_eq!(f.model.count(CallKind::Synthesis), 2);
    assert_eq!(f.observer.failed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let model = ScriptedModel::default();
    model.script(CallKind::Synthesis, Err(AnalystError::upstream("flaky")));
    let f = fixture_with(model, OrchestratorConfig::default());

    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await;

    assert!(result.is_err());
    assert_eq!(f.model.count(CallKind::Synthesis), 1);
}

#[tokio::test]
async fn test_protocol_errors_are_not_retried() {
    let model = ScriptedModel::default();
    model.script(
        CallKind::Synthesis,
        Err(AnalystError::Protocol("no text content".into())),
    );
    let config = OrchestratorConfig::default().with_retry(RetryPolicy::new(3, None));
    let f = fixture_with(model, config);

    let err = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalystError::Protocol(_)));
    assert_eq!(f.model.count(CallKind::Synthesis), 1);
}

#[tokio::test]
async fn test_slow_call_times_out_as_failed_source() {
    let config = OrchestratorConfig::default()
        .with_retry(RetryPolicy::new(0, Some(Duration::from_millis(100))));
    let f = fixture_with(ScriptedModel::with_delay(Duration::from_secs(10)), config);

    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();

    assert_eq!(result.metadata.sources_used, 1);
    assert_eq!(result.metadata.failed_sources, 1);
    let prompt = f.model.synthesis_prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("timed out"));
}

#[tokio::test]
async fn test_deleted_upload_fails_primary_only() {
    let f = fixture();
    let (_, record) = f.orchestrator.files().list().remove(0);
    std::fs::remove_file(&record.path).unwrap();

    let result = f
        .orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "find trends"))
        .await
        .unwrap();

    assert_eq!(f.model.count(CallKind::Primary), 0);
    assert_eq!(result.metadata.sources_used, 1);
    assert_eq!(result.metadata.failed_sources, 1);
}

#[tokio::test]
async fn test_concurrent_requests_all_complete() {
    let f = Arc::new(fixture_with(
        ScriptedModel::default(),
        OrchestratorConfig::default().with_max_concurrent_analyses(1),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let f = f.clone();
            tokio::spawn(async move {
                f.orchestrator
                    .analyze(AnalysisRequest::new(f.file.clone(), format!("question {i}")))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(f.orchestrator.cache().len(), 4);
    assert_eq!(f.model.count(CallKind::Synthesis), 4);
}

#[test]
fn test_config_validation() {
    assert!(OrchestratorConfig::default().validate().is_ok());
    assert!(OrchestratorConfig::default()
        .with_max_concurrent_analyses(0)
        .validate()
        .is_err());

    let mut config = OrchestratorConfig::new();
    config.synthesis_max_tokens = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_synthesis_budget_must_exceed_sub_analyses() {
    let mut config = OrchestratorConfig::new();
    config.synthesis_max_tokens = 100;
    assert!(matches!(config.validate(), Err(AnalystError::Validation(_))));

    config.synthesis_max_tokens = config.primary_max_tokens;
    assert!(config.validate().is_err());

    config.cross_reference_max_tokens = 6000;
    config.synthesis_max_tokens = 5500;
    assert!(config.validate().is_err());

    config.synthesis_max_tokens = 6001;
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_each_call_gets_its_token_budget() {
    let f = fixture();
    f.orchestrator
        .analyze(AnalysisRequest::new(f.file.clone(), "summarize"))
        .await
        .unwrap();

    let mut budgets = f.model.budgets();
    budgets.sort_by_key(|(_, tokens)| *tokens);
    assert_eq!(
        budgets,
        vec![
            (CallKind::CrossReference, 3000),
            (CallKind::Primary, 4000),
            (CallKind::Synthesis, 5000),
        ]
    );
}
