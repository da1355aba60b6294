pub mod types;
pub mod error;
pub mod store;
pub mod cache;
pub mod registry;
pub mod upload;
pub mod connectors;
pub mod model;
pub mod dashboard;
pub mod orchestrator;

pub use error::{AnalystError, Result};
pub use types::*;
pub use store::{BoundedStore, Evicted, EvictionReason, StoreLimits};
pub use cache::{default_cache_limits, CacheStats, FingerprintStrategy, ResultCache};
pub use registry::{
    default_registry_limits, EvictionHook, FileRegistry, KeepStoredFile, RemoveStoredFile,
};
pub use upload::{media_type_for, sanitize_filename, stored_filename, UploadPolicy};
pub use connectors::ConnectorRegistry;
pub use model::{ContentBlock, Message, MessageContent, ModelClient, Role};
pub use orchestrator::{
    AnalysisObserver, AnalysisOrchestrator, CallKind, ModelCaller, NoopObserver,
    OrchestratorConfig, RetryPolicy,
};
