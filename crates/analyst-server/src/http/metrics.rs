use analyst_core::{AnalysisObserver, CallKind};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ── Label types ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CallLabel {
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UploadLabel {
    pub outcome: String,
}

// ── Metrics registry ───────────────────────────────────────────────────────────

pub struct AnalystMetrics {
    pub registry: Registry,

    // Orchestration counters, fed through AnalysisObserver
    pub analyses_started: Counter,
    pub analyses_failed: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub model_calls: Family<CallLabel, Counter>,
    pub model_call_failures: Family<CallLabel, Counter>,

    // Uploads
    pub uploads: Family<UploadLabel, Counter>,

    // Gauges, set on each scrape
    pub cache_entries: Gauge,
    pub cache_bytes: Gauge,
    pub registered_files: Gauge,
    pub registered_file_bytes: Gauge,
    pub uptime_seconds: Gauge,
}

impl AnalystMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let analyses_started: Counter = Counter::default();
        registry.register(
            "analyst_analyses_started",
            "Analysis requests accepted after validation",
            analyses_started.clone(),
        );

        let analyses_failed: Counter = Counter::default();
        registry.register(
            "analyst_analyses_failed",
            "Analysis requests that ended in an error",
            analyses_failed.clone(),
        );

        let cache_hits: Counter = Counter::default();
        registry.register(
            "analyst_cache_hits",
            "Analyses answered from the result cache",
            cache_hits.clone(),
        );

        let cache_misses: Counter = Counter::default();
        registry.register(
            "analyst_cache_misses",
            "Analyses that required model calls",
            cache_misses.clone(),
        );

        let model_calls: Family<CallLabel, Counter> = Family::default();
        registry.register(
            "analyst_model_calls",
            "Model call attempts by kind",
            model_calls.clone(),
        );

        let model_call_failures: Family<CallLabel, Counter> = Family::default();
        registry.register(
            "analyst_model_call_failures",
            "Failed model call attempts by kind",
            model_call_failures.clone(),
        );

        let uploads: Family<UploadLabel, Counter> = Family::default();
        registry.register(
            "analyst_uploads",
            "Upload attempts by outcome",
            uploads.clone(),
        );

        let cache_entries: Gauge = Gauge::default();
        registry.register(
            "analyst_cache_entries",
            "Live entries in the result cache",
            cache_entries.clone(),
        );

        let cache_bytes: Gauge = Gauge::default();
        registry.register(
            "analyst_cache_bytes",
            "Serialized size of cached results in bytes",
            cache_bytes.clone(),
        );

        let registered_files: Gauge = Gauge::default();
        registry.register(
            "analyst_registered_files",
            "Uploaded files currently registered",
            registered_files.clone(),
        );

        let registered_file_bytes: Gauge = Gauge::default();
        registry.register(
            "analyst_registered_file_bytes",
            "Total size of registered uploads in bytes",
            registered_file_bytes.clone(),
        );

        let uptime_seconds: Gauge = Gauge::default();
        registry.register(
            "analyst_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds.clone(),
        );

        Self {
            registry,
            analyses_started,
            analyses_failed,
            cache_hits,
            cache_misses,
            model_calls,
            model_call_failures,
            uploads,
            cache_entries,
            cache_bytes,
            registered_files,
            registered_file_bytes,
            uptime_seconds,
        }
    }

    pub fn record_upload(&self, outcome: &str) {
        self.uploads
            .get_or_create(&UploadLabel {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

impl Default for AnalystMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisObserver for AnalystMetrics {
    fn analysis_started(&self) {
        self.analyses_started.inc();
    }

    fn cache_hit(&self) {
        self.cache_hits.inc();
    }

    fn cache_miss(&self) {
        self.cache_misses.inc();
    }

    fn model_call(&self, kind: CallKind, succeeded: bool) {
        let label = CallLabel {
            kind: kind.as_str().to_string(),
        };
        self.model_calls.get_or_create(&label).inc();
        if !succeeded {
            self.model_call_failures.get_or_create(&label).inc();
        }
    }

    fn analysis_failed(&self) {
        self.analyses_failed.inc();
    }
}
