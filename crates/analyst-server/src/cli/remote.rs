//! Commands that talk to a running server over HTTP.

use anyhow::{Context, Result};
use serde_json::Value;

fn url(server: &str, path: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), path)
}

async fn call(request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await.context("Failed to reach analyst server")?;
    let status = response.status();
    let body: Value = response.json().await.context("Server sent an unreadable response")?;
    if !status.is_success() {
        let error = body["error"].as_str().unwrap_or("request failed");
        anyhow::bail!("{} ({})", error, status);
    }
    Ok(body)
}

pub async fn status(server: &str) -> Result<()> {
    let body = call(reqwest::Client::new().get(url(server, "/api/status"))).await?;

    println!();
    println!("Analyst {}", body["version"].as_str().unwrap_or("?"));
    println!("{}", "─".repeat(50));
    println!("Status:          {}", body["status"].as_str().unwrap_or("?"));
    println!("Cached analyses: {:>8}", body["cache"]["analysis_entries"].to_string());
    println!("Uploaded files:  {:>8}", body["cache"]["uploaded_files"].to_string());
    println!("Cache memory:    {:>8} MB", body["cache"]["memory_usage_mb"].to_string());
    println!("Connectors:");
    for c in body["connectors"].as_array().into_iter().flatten() {
        println!(
            "  {:16} {:16} {}",
            c["id"].as_str().unwrap_or(""),
            c["type"].as_str().unwrap_or(""),
            c["status"].as_str().unwrap_or("")
        );
    }
    println!("{}", "─".repeat(50));
    println!();
    Ok(())
}

pub async fn cache_show(server: &str) -> Result<()> {
    let body = call(reqwest::Client::new().get(url(server, "/api/cache"))).await?;

    println!("Entries:   {} / {}", body["size"], body["max_size"]);
    println!("Memory:    {} / {} MB", body["memory_usage_mb"], body["max_memory_mb"]);
    println!("Hit ratio: {}", body["hit_ratio"]);
    println!("TTL:       {} h", body["ttl_hours"]);
    Ok(())
}

pub async fn cache_clear(server: &str) -> Result<()> {
    let body = call(reqwest::Client::new().delete(url(server, "/api/cache"))).await?;
    println!("Cache cleared: {} entries removed", body["entries_removed"]);
    Ok(())
}

pub async fn files(server: &str) -> Result<()> {
    let body = call(reqwest::Client::new().get(url(server, "/api/files"))).await?;
    let files = body.as_array().cloned().unwrap_or_default();

    if files.is_empty() {
        println!("No files uploaded.");
        return Ok(());
    }

    println!("{:32} {:>10}  {:24} {}", "NAME", "BYTES", "UPLOADED", "SOURCE");
    for f in &files {
        println!(
            "{:32} {:>10}  {:24} {}",
            f["name"].as_str().unwrap_or(""),
            f["size"].to_string(),
            f["uploaded_at"].as_str().unwrap_or(""),
            f["source"].as_str().unwrap_or("")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(url("http://localhost:3001/", "/api/cache"), "http://localhost:3001/api/cache");
        assert_eq!(url("http://h:1", "/api/files"), "http://h:1/api/files");
    }
}
