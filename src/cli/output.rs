//! Output formatting for the `generate` command

use crate::api::GenerateResponse;
use crate::classify::ErrorInfo;
use colored::Colorize;

/// Join a server-relative URL onto the server base.
pub fn absolute_url(server: &str, path: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), path)
}

/// Human-readable success report.
pub fn format_success(server: &str, response: &GenerateResponse) -> String {
    let mut lines = Vec::new();
    let headline = if response.cached {
        "✓ Diagram ready (cached)"
    } else {
        "✓ Diagram ready"
    };
    lines.push(headline.green().to_string());

    if let Some(url) = &response.download_url {
        lines.push(format!("  Diagram: {}", absolute_url(server, url)));
    }
    if let Some(url) = &response.image_url {
        lines.push(format!("  Preview: {}", absolute_url(server, url)));
    }
    if let Some(message) = &response.message {
        lines.push(format!("  {}", message.yellow()));
    }
    lines.join("\n")
}

/// Human-readable failure report with the suggested next step.
pub fn format_error(info: &ErrorInfo) -> String {
    let mut lines = vec![format!("✗ {}", info.message).red().to_string()];
    lines.push(format!("  Category: {}", info.category));
    if let Some(action) = &info.user_action {
        lines.push(format!("  Next step: {}", action));
    }
    if let Some(after) = info.retry_after {
        lines.push(format!("  Retry after: {}s", after.as_secs()));
    }
    if info.retryable && !info.should_revise_input() {
        lines.push("  This request can be retried.".dimmed().to_string());
    }
    lines.join("\n")
}

/// JSON rendering of either outcome.
pub fn format_json(result: &Result<GenerateResponse, ErrorInfo>) -> Result<String, serde_json::Error> {
    match result {
        Ok(response) => serde_json::to_string_pretty(response),
        Err(info) => serde_json::to_string_pretty(&GenerateResponse::error(info)),
    }
}
