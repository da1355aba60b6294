use analyst_core::upload::{DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_UPLOAD_BYTES};
use analyst_core::{FingerprintStrategy, OrchestratorConfig, RetryPolicy, StoreLimits, UploadPolicy};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MB: usize = 1024 * 1024;

/// Contents of `analyst.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub server: ServerSection,
    pub model: ModelSection,
    pub cache: CacheSection,
    pub files: FilesSection,
    pub orchestrator: OrchestratorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub http_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub max_upload_mb: u64,
    pub allowed_extensions: Vec<String>,
    /// Limit on any request body, uploads included.
    pub body_limit_mb: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            upload_dir: PathBuf::from("./uploads"),
            max_upload_mb: DEFAULT_MAX_UPLOAD_BYTES / MB as u64,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            body_limit_mb: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub api_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub anthropic_version: String,
    pub primary_max_tokens: u32,
    pub cross_reference_max_tokens: u32,
    pub synthesis_max_tokens: u32,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            anthropic_version: "2023-06-01".into(),
            primary_max_tokens: 4000,
            cross_reference_max_tokens: 3000,
            synthesis_max_tokens: 5000,
        }
    }
}

impl ModelSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: usize,
    pub max_mb: usize,
    pub ttl_secs: u64,
    pub fingerprint: FingerprintStrategy,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_mb: 50,
            ttl_secs: 3600,
            fingerprint: FingerprintStrategy::Prefix,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub max_entries: usize,
    pub max_mb: usize,
    pub ttl_hours: u64,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            max_entries: 50,
            max_mb: 100,
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub retry_attempts: u32,
    /// Per model call. 0 disables the timeout.
    pub timeout_secs: u64,
    pub max_concurrent_analyses: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            retry_attempts: 0,
            timeout_secs: 300,
            max_concurrent_analyses: 3,
        }
    }
}

impl AnalystConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Human-readable problems; empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.max_upload_mb == 0 {
            errors.push("[server] max_upload_mb must be > 0".to_string());
        }
        if self.server.body_limit_mb == 0 {
            errors.push("[server] body_limit_mb must be > 0".to_string());
        }
        if (self.server.max_upload_mb as usize) > self.server.body_limit_mb {
            errors.push(format!(
                "[server] max_upload_mb ({}) exceeds body_limit_mb ({})",
                self.server.max_upload_mb, self.server.body_limit_mb
            ));
        }
        if self.server.allowed_extensions.is_empty() {
            errors.push("[server] allowed_extensions must not be empty".to_string());
        }
        if self.model.api_url.trim().is_empty() {
            errors.push("[model] api_url must not be empty".to_string());
        }
        if self.model.model.trim().is_empty() {
            errors.push("[model] model must not be empty".to_string());
        }
        if let Err(e) = self.cache_limits().validate() {
            errors.push(format!("[cache] {}", e));
        }
        if let Err(e) = self.file_limits().validate() {
            errors.push(format!("[files] {}", e));
        }
        if let Err(e) = self.orchestrator_config().validate() {
            errors.push(format!("[orchestrator] {}", e));
        }

        errors
    }

    pub fn cache_limits(&self) -> StoreLimits {
        StoreLimits::new(
            self.cache.max_entries,
            self.cache.max_mb.saturating_mul(MB),
            Duration::from_secs(self.cache.ttl_secs),
        )
    }

    pub fn file_limits(&self) -> StoreLimits {
        StoreLimits::new(
            self.files.max_entries,
            self.files.max_mb.saturating_mul(MB),
            Duration::from_secs(self.files.ttl_hours.saturating_mul(3600)),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let timeout = match self.orchestrator.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        RetryPolicy::new(self.orchestrator.retry_attempts, timeout)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            primary_max_tokens: self.model.primary_max_tokens,
            cross_reference_max_tokens: self.model.cross_reference_max_tokens,
            synthesis_max_tokens: self.model.synthesis_max_tokens,
            retry: self.retry_policy(),
            fingerprint: self.cache.fingerprint,
            max_concurrent_analyses: self.orchestrator.max_concurrent_analyses,
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            allowed_extensions: self
                .server
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_file_bytes: self.server.max_upload_mb.saturating_mul(MB as u64),
        }
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.server.body_limit_mb.saturating_mul(MB)
    }
}
