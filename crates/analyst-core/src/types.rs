use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{AnalystError, Result};

/// Identity key for an uploaded file. Name plus size, not a content hash:
/// two different files with the same name and byte length share a key.
pub fn file_key(name: &str, size: u64) -> String {
    format!("{}-{}", name, size)
}

/// Client-side descriptor of a previously uploaded file, as echoed back in
/// analysis requests and results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// Declared media type. Informational only.
    #[serde(rename = "type", default)]
    pub media_type: String,
}

impl FileInfo {
    pub fn identity_key(&self) -> String {
        file_key(&self.name, self.size)
    }
}

/// Metadata for a file received by the upload surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Name the bytes were stored under (timestamp-prefixed, sanitized).
    pub filename: String,
    /// Name as supplied by the client. Part of the identity key.
    pub original_name: String,
    pub size: u64,
    /// Location of the stored bytes.
    pub path: PathBuf,
    /// MIME type declared by the client.
    pub mimetype: String,
    pub uploaded_at: DateTime<Utc>,
    /// Free-form label of where the upload came from.
    pub source: String,
}

impl FileRecord {
    pub fn key(&self) -> String {
        file_key(&self.original_name, self.size)
    }
}

/// Analysis flags. Only `include_cross_reference` affects control flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub include_cross_reference: bool,
    #[serde(default = "default_true")]
    pub generate_insights: bool,
    #[serde(default)]
    pub create_visualizations: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include_cross_reference: true,
            generate_insights: true,
            create_visualizations: false,
        }
    }
}

/// An incoming analysis request as it arrives over the wire. Required
/// fields are optional here so that their absence can be reported as a
/// validation failure rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub file_info: Option<FileInfo>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Connector identifiers, passed through to cross-reference analysis.
    #[serde(default)]
    pub connectors: Option<Vec<String>>,
    #[serde(default)]
    pub analysis_config: Option<AnalysisConfig>,
}

impl AnalysisRequest {
    pub fn new(file_info: FileInfo, prompt: impl Into<String>) -> Self {
        Self {
            file_info: Some(file_info),
            prompt: Some(prompt.into()),
            connectors: None,
            analysis_config: None,
        }
    }

    pub fn with_connectors(mut self, connectors: Vec<String>) -> Self {
        self.connectors = Some(connectors);
        self
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.analysis_config = Some(config);
        self
    }

    /// Check required fields and fill in defaults.
    pub fn validate(self) -> Result<AnalysisJob> {
        let file = self.file_info;
        let prompt = self.prompt.filter(|p| !p.is_empty());
        let (file, prompt) = match (file, prompt) {
            (Some(file), Some(prompt)) => (file, prompt),
            _ => {
                return Err(AnalystError::Validation(
                    "Missing required fields: file_info, prompt".into(),
                ))
            }
        };

        Ok(AnalysisJob {
            file,
            prompt,
            connectors: self.connectors.unwrap_or_default(),
            config: self.analysis_config.unwrap_or_default(),
        })
    }
}

/// A validated request. Immutable once accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub file: FileInfo,
    pub prompt: String,
    pub connectors: Vec<String>,
    pub config: AnalysisConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Primary,
    CrossReference,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Primary => "primary",
            AnalysisKind::CrossReference => "cross_reference",
        }
    }

    /// Section heading used when embedding a result in the synthesis prompt.
    pub fn heading(&self) -> &'static str {
        match self {
            AnalysisKind::Primary => "PRIMARY_ANALYSIS",
            AnalysisKind::CrossReference => "CROSS_REFERENCE_ANALYSIS",
        }
    }

    /// Label of the source each kind draws on.
    pub fn source_label(&self) -> &'static str {
        match self {
            AnalysisKind::Primary => "uploaded_file",
            AnalysisKind::CrossReference => "external_knowledge",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SubAnalysisMetadata {
    Primary {
        filename: String,
        size: u64,
        media_type: String,
        timestamp: DateTime<Utc>,
    },
    CrossReference {
        connectors: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Outcome of one sub-analysis. Lives for a single orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubAnalysisResult {
    pub kind: AnalysisKind,
    pub source: String,
    /// Model output on success, a placeholder on failure.
    pub analysis: String,
    pub metadata: SubAnalysisMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubAnalysisResult {
    pub fn completed(kind: AnalysisKind, analysis: String, metadata: SubAnalysisMetadata) -> Self {
        Self {
            kind,
            source: kind.source_label().to_string(),
            analysis,
            metadata,
            error: None,
        }
    }

    pub fn failed(kind: AnalysisKind, error: String, metadata: SubAnalysisMetadata) -> Self {
        let placeholder = match kind {
            AnalysisKind::Primary => "Primary analysis unavailable.",
            AnalysisKind::CrossReference => {
                "Cross-reference analysis unavailable due to connectivity issues."
            }
        };
        Self {
            kind,
            source: kind.source_label().to_string(),
            analysis: placeholder.to_string(),
            metadata,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Structured metrics pulled out of a synthesis report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardData {
    /// Insertion-ordered; a repeated label keeps its first position and its last value.
    pub summary_metrics: IndexMap<String, f64>,
    /// Reserved; always empty.
    pub time_series: Vec<Value>,
    /// Reserved; always empty.
    pub categories: Vec<String>,
    pub recommendations: Vec<String>,
    /// Reserved; always empty.
    pub data_quality: BTreeMap<String, Value>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisMetadata {
    pub sources_used: usize,
    pub failed_sources: usize,
    pub file_info: FileInfo,
    pub synthesis_timestamp: DateTime<Utc>,
    /// Identifier of this particular synthesis. Distinct from the cache fingerprint.
    pub cache_key: String,
}

/// The final artifact of an analysis, and the value held by the result cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisResult {
    pub analysis: String,
    pub dashboard_data: DashboardData,
    pub metadata: SynthesisMetadata,
}

/// A named external data-source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connector {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}
