//! Pulls dashboard-ready numbers and recommendations out of free-form
//! report text.

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use crate::types::{DashboardData, SubAnalysisResult};

const LIST_MARKERS: &[&str] = &["- ", "* ", "• "];

/// Build dashboard data from a synthesis report and the sub-results that fed it.
///
/// Never fails. Lines that do not parse are skipped; the derived
/// `analysis_timestamp` and `sources_count` metrics are always present.
pub fn extract(text: &str, results: &[SubAnalysisResult]) -> DashboardData {
    extract_at(text, results, Utc::now().timestamp_millis())
}

/// [`extract`] with an explicit timestamp (unix millis).
pub fn extract_at(text: &str, results: &[SubAnalysisResult], now_millis: i64) -> DashboardData {
    let mut data = DashboardData {
        sources: results.iter().map(|r| r.source.clone()).collect(),
        ..Default::default()
    };

    for line in text.lines() {
        if let Some((label, value)) = find_metric(line) {
            data.summary_metrics.insert(label.to_string(), value);
        }
        if let Some(rec) = recommendation(line) {
            data.recommendations.push(rec.to_string());
        }
    }

    data.summary_metrics
        .insert("analysis_timestamp".into(), now_millis as f64);
    data.summary_metrics
        .insert("sources_count".into(), results.len() as f64);
    data
}

/// `label: number`, where the label is a run of `[A-Za-z0-9_]` directly
/// before the colon and the number is `digits[.digits]` after optional
/// whitespace. Compiled once.
fn metric_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"([A-Za-z0-9_]+):\s*([0-9]+(?:\.[0-9]+)?)").ok())
        .as_ref()
}

/// Leftmost `label: number` occurrence in the line.
fn find_metric(line: &str) -> Option<(&str, f64)> {
    let caps = metric_pattern()?.captures(line)?;
    let label = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some((label, value))
}

/// The item text of a list line mentioning "recommend" (any case).
fn recommendation(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let item = LIST_MARKERS
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))?;
    if trimmed.to_lowercase().contains("recommend") {
        Some(item)
    } else {
        None
    }
}
