//! Web tools: search and URL fetching.
//!
//! `web_search` scrapes the DuckDuckGo HTML endpoint (no API key required);
//! `fetch_url` downloads a page and extracts readable text. Both are only
//! registered on packs built with `network_allowed`.

use scraper::{Html, Selector};
use serde_json::Value;

use maestro_domain::constants::{truncate_output, MAX_TOOL_OUTPUT_CHARS};
use maestro_domain::error::ToolError;

const HTTP_TIMEOUT_S: u64 = 30;

fn http_client() -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_S))
        .user_agent("Mozilla/5.0 (compatible; maestro/0.1)")
        .build()
        .map_err(|e| ToolError::Unexpected(format!("failed to build HTTP client: {e}")))
}

/// Search the web via the DuckDuckGo HTML endpoint.
///
/// Returns `{query, results: [{title, url, snippet}], count}`.
pub async fn web_search(query: &str, limit: usize) -> Result<Value, ToolError> {
    if query.trim().is_empty() {
        return Err(ToolError::InvalidArgs("empty search query".into()));
    }

    let client = http_client()?;
    let resp = client
        .get("https://html.duckduckgo.com/html/")
        .query(&[("q", query)])
        .send()
        .await
        .map_err(|e| ToolError::Io(format!("search request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ToolError::Io(format!(
            "search returned HTTP {}",
            status.as_u16()
        )));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| ToolError::Io(format!("failed to read search response: {e}")))?;

    let results = parse_search_results(&body, limit);
    tracing::debug!(query, count = results.len(), "web search completed");

    Ok(serde_json::json!({
        "query": query,
        "count": results.len(),
        "results": results,
    }))
}

fn parse_search_results(html: &str, limit: usize) -> Vec<Value> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a.result__a").expect("static selector");
    let snippet_sel = Selector::parse(".result__snippet").expect("static selector");

    let snippets: Vec<String> = doc
        .select(&snippet_sel)
        .map(|s| s.text().collect::<String>().trim().to_string())
        .collect();

    doc.select(&link_sel)
        .take(limit)
        .enumerate()
        .map(|(i, a)| {
            let title = a.text().collect::<String>().trim().to_string();
            let href = a.value().attr("href").unwrap_or("").to_string();
            serde_json::json!({
                "title": title,
                "url": href,
                "snippet": snippets.get(i).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// Fetch a URL and extract readable text.
///
/// HTML responses are stripped down to visible text; other content types are
/// returned as-is. Output is truncated to the tool output cap.
pub async fn fetch_url(url: &str) -> Result<Value, ToolError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ToolError::InvalidArgs(
            "invalid URL: must start with http:// or https://".into(),
        ));
    }

    let client = http_client()?;
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ToolError::Io(format!("fetch failed: {e}")))?;

    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = resp
        .text()
        .await
        .map_err(|e| ToolError::Io(format!("failed to read response body: {e}")))?;

    let text = if content_type.contains("html") {
        extract_readable_text(&body)
    } else {
        body
    };
    let text = truncate_output(&text, MAX_TOOL_OUTPUT_CHARS);

    Ok(serde_json::json!({
        "url": url,
        "status": status,
        "content_type": content_type,
        "length": text.len(),
        "text": text,
    }))
}

/// Strip an HTML document to its visible text, skipping script/style.
fn extract_readable_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let body_sel = Selector::parse("body").expect("static selector");
    let skip_sel = Selector::parse("script, style, noscript").expect("static selector");

    let skipped: std::collections::HashSet<_> =
        doc.select(&skip_sel).flat_map(|n| n.text()).collect();

    let mut out = String::new();
    for node in doc.select(&body_sel) {
        for chunk in node.text() {
            let trimmed = chunk.trim();
            if trimmed.is_empty() || skipped.contains(chunk) {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(trimmed);
        }
    }
    out
}
