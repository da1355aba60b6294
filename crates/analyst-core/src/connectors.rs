use chrono::Utc;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

use crate::error::{AnalystError, Result};
use crate::types::Connector;

/// Process-wide list of known data-source descriptors.
pub struct ConnectorRegistry {
    connectors: Mutex<Vec<Connector>>,
}

impl ConnectorRegistry {
    pub fn empty() -> Self {
        Self {
            connectors: Mutex::new(Vec::new()),
        }
    }

    /// Registry seeded with the built-in sources.
    pub fn with_defaults() -> Self {
        let builtin = [
            ("local-files", "Local Files", "file_system"),
            ("claude-api", "Claude API", "ai_service"),
            ("data-analyzer", "Data Analyzer", "analysis_tool"),
        ];
        let connectors = builtin
            .iter()
            .map(|(id, name, kind)| Connector {
                id: id.to_string(),
                name: name.to_string(),
                kind: kind.to_string(),
                status: "active".into(),
                config: None,
                added_at: None,
            })
            .collect();
        Self {
            connectors: Mutex::new(connectors),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Connector>> {
        self.connectors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new active connector.
    pub fn add(&self, id: &str, name: &str, kind: &str, config: Option<Value>) -> Result<Connector> {
        if id.is_empty() || name.is_empty() || kind.is_empty() {
            return Err(AnalystError::Validation(
                "Missing required fields: id, name, type".into(),
            ));
        }

        let connector = Connector {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            status: "active".into(),
            config: Some(config.unwrap_or_else(|| Value::Object(Default::default()))),
            added_at: Some(Utc::now()),
        };
        self.lock().push(connector.clone());
        Ok(connector)
    }

    pub fn list(&self) -> Vec<Connector> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
