pub mod engine;
pub mod prompts;
pub mod retry;

#[cfg(test)]
mod tests;

pub use engine::AnalysisOrchestrator;
pub use retry::{ModelCaller, RetryPolicy};

use crate::cache::FingerprintStrategy;

/// Which model call a metric or log line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Primary,
    CrossReference,
    Synthesis,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Primary => "primary",
            CallKind::CrossReference => "cross_reference",
            CallKind::Synthesis => "synthesis",
        }
    }
}

/// Hooks for counting what the orchestrator does. All methods default to no-ops.
pub trait AnalysisObserver: Send + Sync {
    fn analysis_started(&self) {}
    fn cache_hit(&self) {}
    fn cache_miss(&self) {}
    /// One model call attempt finished.
    fn model_call(&self, _kind: CallKind, _succeeded: bool) {}
    fn analysis_failed(&self) {}
}

pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {}

/// Configuration for the analysis orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub primary_max_tokens: u32,
    pub cross_reference_max_tokens: u32,
    /// Budget for the final report. Larger than either sub-analysis.
    pub synthesis_max_tokens: u32,
    pub retry: RetryPolicy,
    pub fingerprint: FingerprintStrategy,
    /// Orchestrations allowed to do model work at the same time. Cache hits
    /// are not counted.
    pub max_concurrent_analyses: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            primary_max_tokens: 4000,
            cross_reference_max_tokens: 3000,
            synthesis_max_tokens: 5000,
            retry: RetryPolicy::default(),
            fingerprint: FingerprintStrategy::Prefix,
            max_concurrent_analyses: 3,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: FingerprintStrategy) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn with_max_concurrent_analyses(mut self, max: usize) -> Self {
        self.max_concurrent_analyses = max;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.primary_max_tokens == 0
            || self.cross_reference_max_tokens == 0
            || self.synthesis_max_tokens == 0
        {
            return Err(crate::AnalystError::Validation(
                "token budgets must be > 0".into(),
            ));
        }

        let largest_sub = self.primary_max_tokens.max(self.cross_reference_max_tokens);
        if self.synthesis_max_tokens <= largest_sub {
            return Err(crate::AnalystError::Validation(format!(
                "synthesis_max_tokens ({}) must exceed the sub-analysis budgets ({})",
                self.synthesis_max_tokens, largest_sub
            )));
        }

        if self.max_concurrent_analyses == 0 {
            return Err(crate::AnalystError::Validation(
                "max_concurrent_analyses must be > 0".into(),
            ));
        }

        Ok(())
    }
}
