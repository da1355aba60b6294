use std::sync::Arc;
use std::time::Duration;

use super::{AnalysisObserver, CallKind};
use crate::error::{AnalystError, Result};
use crate::model::{Message, ModelClient};

/// Retry and timeout applied around every model call the orchestrator makes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first. Only upstream failures are retried.
    pub attempts: u32,
    /// Limit on each single attempt. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Option<Duration>) -> Self {
        Self { attempts, timeout }
    }
}

/// A model client bundled with its retry policy and observer. Cheap to clone
/// into spawned sub-analysis tasks.
#[derive(Clone)]
pub struct ModelCaller {
    model: Arc<dyn ModelClient>,
    observer: Arc<dyn AnalysisObserver>,
    retry: RetryPolicy,
}

impl ModelCaller {
    pub fn new(
        model: Arc<dyn ModelClient>,
        observer: Arc<dyn AnalysisObserver>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            observer,
            retry,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn call(&self, kind: CallKind, messages: &[Message], max_tokens: u32) -> Result<String> {
        let mut attempt = 0;
        loop {
            let outcome = self.attempt(messages, max_tokens).await;
            self.observer.model_call(kind, outcome.is_ok());

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    attempt += 1;
                    log::warn!(
                        "{} call to {} failed, retrying ({}/{}): {}",
                        kind.as_str(),
                        self.model_name(),
                        attempt,
                        self.retry.attempts,
                        e
                    );
                }
                other => return other,
            }
        }
    }

    async fn attempt(&self, messages: &[Message], max_tokens: u32) -> Result<String> {
        match self.retry.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.model.complete(messages, max_tokens)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AnalystError::upstream(format!(
                        "model call timed out after {:?}",
                        limit
                    ))),
                }
            }
            None => self.model.complete(messages, max_tokens).await,
        }
    }
}
