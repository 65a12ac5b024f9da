//! Logs inspection command
//!
//! Prints the most recent rows of the request/response log database.

use anyhow::Result;
use colored::Colorize;
use gemini_proxy::config;
use gemini_proxy::observability::{LogDb, RequestLog, ResponseLog, ResponseStatus};
use std::path::Path;

const BODY_PREVIEW_CHARS: usize = 80;

/// Execute the logs command
pub async fn execute(path: &Path, limit: u32) -> Result<()> {
    let cfg = config::load_config(path)?;
    let db = LogDb::connect(&cfg.database).await?;

    let stats = db.stats().await?;
    println!("{} {}", "Database:".bold(), cfg.database.url);
    println!(
        "  {} requests, {} responses ({} failed)",
        stats.request_count, stats.response_count, stats.failed_response_count
    );
    println!();

    let requests = db.recent_request_logs(limit).await?;
    println!("{}", format!("Latest {} request logs:", requests.len()).cyan().bold());
    if requests.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for log in &requests {
        println!("{}", format_request(log));
    }
    println!();

    let responses = db.recent_response_logs(limit).await?;
    println!("{}", format!("Latest {} response logs:", responses.len()).cyan().bold());
    if responses.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for log in &responses {
        println!("{}", format_response(log));
    }

    Ok(())
}

fn format_request(log: &RequestLog) -> String {
    format!(
        "  #{} {} {} from {}\n      {}",
        log.id,
        log.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        log.endpoint,
        log.client_ip,
        truncate(&log.request_body, BODY_PREVIEW_CHARS)
    )
}

fn format_response(log: &ResponseLog) -> String {
    let status = match log.status {
        ResponseStatus::Success => log.status.as_str().green(),
        ResponseStatus::Failed => log.status.as_str().red(),
    };
    let request = log
        .request_id
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!(
        "  #{} {} request {} {} {}ms",
        log.id,
        log.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        request,
        status,
        log.response_time_ms
    );

    if let Some(model) = &log.model_used {
        line.push_str(&format!(" model={}", model));
    }
    if let Some(tokens) = &log.tokens {
        line.push_str(&format!(
            " tokens={}+{}={}",
            tokens.prompt_tokens, tokens.completion_tokens, tokens.total_tokens
        ));
    }
    if let Some(text) = &log.response {
        line.push_str(&format!("\n      {}", truncate(text, BODY_PREVIEW_CHARS)));
    }
    if let Some(error) = &log.error_message {
        line.push_str(&format!("\n      {}", truncate(error, BODY_PREVIEW_CHARS).red()));
    }

    line
}

/// Single-line preview, cut at a char boundary
fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
