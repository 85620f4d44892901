//! Headless browser tool backed by Chromium.
//!
//! Lifecycle: `open()` launches the browser and a single tab; `close()`
//! releases both. Tool methods return result dicts; failures are returned as
//! `{"error": ..., "success": false}` rather than raised, so a flaky page
//! never aborts a run. Browser calls are blocking and run under
//! `spawn_blocking`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use parking_lot::Mutex;
use serde_json::Value;

use maestro_domain::error::ToolError;

/// Timeout applied to navigation and element waits.
const BROWSER_TIMEOUT_S: u64 = 30;

struct BrowserSession {
    // Held only to keep the process alive; dropping it kills Chromium.
    _browser: Browser,
    tab: Arc<Tab>,
}

/// Headless Chromium wrapper bound to a workspace directory.
///
/// Screenshots are saved inside the workspace only (sandbox-consistent).
/// The lock is never held across an await: methods clone the tab handle out.
pub struct BrowserTool {
    workspace_path: PathBuf,
    session: Mutex<Option<BrowserSession>>,
}

impl BrowserTool {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            session: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.lock().is_some()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Launch headless Chromium and create a single tab.
    ///
    /// Callers treat a failed launch as "browser unavailable" and degrade.
    pub async fn open(&self) -> Result<(), ToolError> {
        let launched = tokio::task::spawn_blocking(|| -> Result<BrowserSession, String> {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .idle_browser_timeout(Duration::from_secs(300))
                .build()
                .map_err(|e| e.to_string())?;
            let browser = Browser::new(options).map_err(|e| e.to_string())?;
            let tab = browser.new_tab().map_err(|e| e.to_string())?;
            tab.set_default_timeout(Duration::from_secs(BROWSER_TIMEOUT_S));
            Ok(BrowserSession {
                _browser: browser,
                tab,
            })
        })
        .await
        .map_err(|e| ToolError::Unexpected(format!("browser launch task failed: {e}")))?;

        match launched {
            Ok(session) => {
                tracing::debug!("browser opened (headless)");
                *self.session.lock() = Some(session);
                Ok(())
            }
            Err(e) => Err(ToolError::Unexpected(format!(
                "failed to launch Chromium: {e}"
            ))),
        }
    }

    /// Close the tab and browser. Idempotent.
    pub async fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            let _ = tokio::task::spawn_blocking(move || drop(session)).await;
            tracing::debug!("browser closed");
        }
    }

    fn tab(&self) -> Result<Arc<Tab>, Value> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.tab.clone())
            .ok_or_else(|| {
                serde_json::json!({
                    "error": "browser not opened — call open() first",
                    "success": false,
                })
            })
    }

    // ------------------------------------------------------------------
    // Tool methods
    // ------------------------------------------------------------------

    /// Navigate to a URL and return `{url, title}`.
    pub async fn navigate(&self, url: &str) -> Value {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return serde_json::json!({
                "error": "invalid URL: must start with http:// or https://",
                "success": false,
            });
        }
        let tab = match self.tab() {
            Ok(t) => t,
            Err(e) => return e,
        };
        let url = url.to_string();
        blocking_tool(move || {
            tab.navigate_to(&url).map_err(|e| e.to_string())?;
            tab.wait_until_navigated().map_err(|e| e.to_string())?;
            let title = tab.get_title().unwrap_or_default();
            Ok(serde_json::json!({ "url": url, "title": title }))
        })
        .await
    }

    /// Extract inner text from a CSS selector (default `body`).
    pub async fn get_text(&self, selector: &str) -> Value {
        let tab = match self.tab() {
            Ok(t) => t,
            Err(e) => return e,
        };
        let selector = selector.to_string();
        blocking_tool(move || {
            let element = tab.wait_for_element(&selector).map_err(|e| e.to_string())?;
            let text = element.get_inner_text().map_err(|e| e.to_string())?;
            Ok(serde_json::json!({
                "selector": selector,
                "length": text.len(),
                "text": text,
            }))
        })
        .await
    }

    /// All anchor links on the current page: `{links: [{text, href}], count}`.
    pub async fn get_links(&self) -> Value {
        let tab = match self.tab() {
            Ok(t) => t,
            Err(e) => return e,
        };
        blocking_tool(move || {
            let js = "JSON.stringify(Array.from(document.querySelectorAll('a')).map(a => \
                      ({text: a.innerText.trim(), href: a.href})))";
            let result = tab.evaluate(js, false).map_err(|e| e.to_string())?;
            let raw = result
                .value
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| "[]".into());
            let links: Value = serde_json::from_str(&raw).unwrap_or(Value::Array(vec![]));
            let count = links.as_array().map(|a| a.len()).unwrap_or(0);
            Ok(serde_json::json!({ "links": links, "count": count }))
        })
        .await
    }

    /// Click the element matching a CSS selector.
    pub async fn click(&self, selector: &str) -> Value {
        let tab = match self.tab() {
            Ok(t) => t,
            Err(e) => return e,
        };
        let selector = selector.to_string();
        blocking_tool(move || {
            let element = tab.wait_for_element(&selector).map_err(|e| e.to_string())?;
            element.click().map_err(|e| e.to_string())?;
            Ok(serde_json::json!({ "success": true, "selector": selector }))
        })
        .await
    }

    /// Fill an input field matching a CSS selector with a value.
    pub async fn fill(&self, selector: &str, value: &str) -> Value {
        let tab = match self.tab() {
            Ok(t) => t,
            Err(e) => return e,
        };
        let selector = selector.to_string();
        let value = value.to_string();
        blocking_tool(move || {
            let element = tab.wait_for_element(&selector).map_err(|e| e.to_string())?;
            element.click().map_err(|e| e.to_string())?;
            tab.type_str(&value).map_err(|e| e.to_string())?;
            Ok(serde_json::json!({ "success": true, "selector": selector, "value": value }))
        })
        .await
    }

    /// Screenshot the current page into the workspace.
    ///
    /// The filename must stay inside the workspace directory.
    pub async fn screenshot(&self, filename: &str) -> Value {
        let workspace = match self.workspace_path.canonicalize() {
            Ok(w) => w,
            Err(e) => {
                return serde_json::json!({
                    "error": format!("cannot resolve workspace: {e}"),
                    "success": false,
                })
            }
        };
        let save_path = workspace.join(filename);
        let normalized: PathBuf = save_path.components().collect();
        if !normalized.starts_with(&workspace) || filename.contains("..") {
            return serde_json::json!({
                "error": format!(
                    "invalid filename {filename:?}: path must remain inside the workspace directory"
                ),
                "success": false,
            });
        }
        let tab = match self.tab() {
            Ok(t) => t,
            Err(e) => return e,
        };
        let filename = filename.to_string();
        blocking_tool(move || {
            if let Some(parent) = save_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            let png = tab
                .capture_screenshot(
                    headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                    None,
                    None,
                    true,
                )
                .map_err(|e| e.to_string())?;
            std::fs::write(&save_path, png).map_err(|e| e.to_string())?;
            Ok(serde_json::json!({
                "path": filename,
                "workspace_path": save_path.to_string_lossy(),
            }))
        })
        .await
    }
}

/// Run a blocking browser operation, folding failures into an error dict.
async fn blocking_tool<F>(f: F) -> Value
where
    F: FnOnce() -> Result<Value, String> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => serde_json::json!({ "error": e, "success": false }),
        Err(e) => serde_json::json!({
            "error": format!("browser task panicked: {e}"),
            "success": false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn navigate_rejects_bad_scheme() {
        let ws = TempDir::new().unwrap();
        let bt = BrowserTool::new(ws.path());
        let result = bt.navigate("ftp://example.com").await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("invalid URL"));
    }

    #[tokio::test]
    async fn methods_before_open_return_error_dict() {
        let ws = TempDir::new().unwrap();
        let bt = BrowserTool::new(ws.path());
        let result = bt.get_text("body").await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("not opened"));
    }

    #[tokio::test]
    async fn close_without_open_is_noop() {
        let ws = TempDir::new().unwrap();
        let bt = BrowserTool::new(ws.path());
        bt.close().await;
        assert!(!bt.is_open());
    }

    #[tokio::test]
    async fn screenshot_rejects_escaping_filename() {
        let ws = TempDir::new().unwrap();
        let bt = BrowserTool::new(ws.path());
        let result = bt.screenshot("../escape.png").await;
        assert_eq!(result["success"], false);
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("inside the workspace"));
    }
}
