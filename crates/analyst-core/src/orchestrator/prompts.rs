use crate::types::{FileInfo, SubAnalysisResult};

/// Instruction sent alongside the document for the primary analysis.
pub fn primary(prompt: &str) -> String {
    format!(
        "You are coordinating a multi-source data analysis. Analyze the attached file for: {prompt}

Cover:
1. Data structure and quality assessment
2. Key statistical insights
3. Patterns and anomalies
4. Correlations and relationships
5. Actionable recommendations
6. Dashboard-ready metrics and KPIs

Write the response so it can be merged with other sources and shown on a dashboard."
    )
}

/// Prompt for the cross-reference analysis. No file bytes are sent.
pub fn cross_reference(file: &FileInfo, prompt: &str, connectors: &[String]) -> String {
    let connectors = if connectors.is_empty() {
        String::new()
    } else {
        format!("\nConnected sources: {}\n", connectors.join(", "))
    };

    format!(
        "You are coordinating a multi-source data analysis. Perform a cross-reference analysis for a {kind} file named \"{name}\".

Original analysis request: {prompt}
{connectors}
Cover:
1. How this data relates to common external data sources
2. Data enrichment opportunities
3. Relevant industry benchmarks
4. Time-series patterns, if applicable
5. Recommendations for multi-source integration
6. Additional data worth collecting

Focus on actionable insights for dashboards and business intelligence.",
        kind = file.media_type,
        name = file.name,
    )
}

/// Prompt for the final report. Results appear in the order given.
pub fn synthesis(
    file: &FileInfo,
    prompt: &str,
    successes: &[SubAnalysisResult],
    failures: &[SubAnalysisResult],
) -> String {
    let mut out = String::from(
        "You are coordinating a multi-source data analysis. Synthesize the following results into one comprehensive report.\n\n",
    );
    out.push_str(&format!("ORIGINAL REQUEST: {}\n", prompt));
    out.push_str(&format!("FILE INFO: {} ({})\n\n", file.name, file.media_type));

    out.push_str("ANALYSIS RESULTS:\n");
    for result in successes {
        out.push_str(&format!(
            "\n--- {} ({}) ---\n{}\n",
            result.kind.heading(),
            result.source,
            result.analysis
        ));
    }

    if !failures.is_empty() {
        out.push_str(&format!("\nFAILED ANALYSES: {}\n", failures.len()));
        for failure in failures {
            let message = failure.error.as_deref().unwrap_or("unknown error");
            out.push_str(&format!("- {}\n", message));
        }
    }

    out.push_str(
        "
Provide:
1. EXECUTIVE SUMMARY - key findings in 2-3 sentences
2. DETAILED INSIGHTS - analysis combining all sources
3. DASHBOARD METRICS - specific KPIs as `name: value` lines
4. RECOMMENDATIONS - actionable next steps as `- ` list items
5. DATA INTEGRATION OPPORTUNITIES - how to use the sources together

Format the response for executive readers and dashboard integration.",
    );
    out
}
