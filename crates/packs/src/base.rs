//! Concrete pack: prompt, tool registry, finish tool, optional quality gate.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use maestro_domain::error::Result;
use maestro_domain::tool::ToolDefinition;
use maestro_tools::browser::BrowserTool;

use crate::pack::{SpecialistPack, ToolHandler, ToolResult};

/// Quality gate: returns a rejection message, or `None` to accept.
pub type QualityGateFn = fn(&Value) -> Option<String>;

struct RegisteredTool {
    def: ToolDefinition,
    handler: ToolHandler,
}

/// The concrete specialist pack the built-in builders produce.
///
/// Regular tools live in an ordered registry; the `finish_task` definition is
/// held separately so the loop can detect termination without the pack
/// knowing about the loop. The finish tool appears in `tool_definitions` but
/// has no executor; the engine consumes its arguments as the run payload.
///
/// When built with `with_browser(true)`, `open()` tries to launch a headless
/// browser and registers the `browser_*` tool family; a failed launch
/// degrades to no browser tools rather than failing the run.
pub struct BasePack {
    specialist_id: String,
    system_prompt: String,
    tools: Vec<RegisteredTool>,
    finish_tool: ToolDefinition,
    quality_gate: Option<QualityGateFn>,
    workspace_path: PathBuf,
    network_allowed: bool,
    browser_enabled: bool,
    browser: Option<Arc<BrowserTool>>,
}

impl BasePack {
    pub fn new(
        specialist_id: impl Into<String>,
        system_prompt: impl Into<String>,
        finish_tool: ToolDefinition,
        workspace_path: impl Into<PathBuf>,
        network_allowed: bool,
    ) -> Self {
        Self {
            specialist_id: specialist_id.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            finish_tool,
            quality_gate: None,
            workspace_path: workspace_path.into(),
            network_allowed,
            browser_enabled: false,
            browser: None,
        }
    }

    /// Register a regular tool. Registration order is catalogue order.
    pub fn register_tool(&mut self, def: ToolDefinition, handler: ToolHandler) {
        self.tools.push(RegisteredTool { def, handler });
    }

    pub fn with_quality_gate(mut self, gate: QualityGateFn) -> Self {
        self.quality_gate = Some(gate);
        self
    }

    /// Enable the browser tool family (registered lazily during `open()`).
    pub fn with_browser(mut self, enabled: bool) -> Self {
        self.browser_enabled = enabled;
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.def.name.as_str()).collect()
    }

    fn register_browser_tools(&mut self, browser: Arc<BrowserTool>) {
        use crate::tool_defs::{make_tool_def, optional_str, required_str};

        let bt = browser.clone();
        self.register_tool(
            make_tool_def(
                "browser_navigate",
                "Navigate the headless browser to a URL and return page metadata.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Full URL including scheme."},
                    },
                    "required": ["url"],
                }),
            ),
            Box::new(move |args| {
                let bt = bt.clone();
                Box::pin(async move {
                    let url = required_str(&args, "url")?;
                    Ok(bt.navigate(&url).await)
                })
            }),
        );

        let bt = browser.clone();
        self.register_tool(
            make_tool_def(
                "browser_get_text",
                "Extract inner text from a CSS selector on the current page.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "selector": {"type": "string", "description": "CSS selector (default 'body')."},
                    },
                    "required": [],
                }),
            ),
            Box::new(move |args| {
                let bt = bt.clone();
                Box::pin(async move {
                    let selector = optional_str(&args, "selector", "body");
                    Ok(bt.get_text(&selector).await)
                })
            }),
        );

        let bt = browser.clone();
        self.register_tool(
            make_tool_def(
                "browser_get_links",
                "Return all anchor links (text + href) on the current page.",
                serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
            ),
            Box::new(move |_args| {
                let bt = bt.clone();
                Box::pin(async move { Ok(bt.get_links().await) })
            }),
        );

        let bt = browser.clone();
        self.register_tool(
            make_tool_def(
                "browser_click",
                "Click an element matching a CSS selector on the current page.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "selector": {"type": "string", "description": "CSS selector of the element."},
                    },
                    "required": ["selector"],
                }),
            ),
            Box::new(move |args| {
                let bt = bt.clone();
                Box::pin(async move {
                    let selector = required_str(&args, "selector")?;
                    Ok(bt.click(&selector).await)
                })
            }),
        );

        let bt = browser.clone();
        self.register_tool(
            make_tool_def(
                "browser_fill",
                "Fill an input field matching a CSS selector with a value.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "selector": {"type": "string", "description": "CSS selector of the input."},
                        "value": {"type": "string", "description": "Text to fill in."},
                    },
                    "required": ["selector", "value"],
                }),
            ),
            Box::new(move |args| {
                let bt = bt.clone();
                Box::pin(async move {
                    let selector = required_str(&args, "selector")?;
                    let value = required_str(&args, "value")?;
                    Ok(bt.fill(&selector, &value).await)
                })
            }),
        );

        let bt = browser;
        self.register_tool(
            make_tool_def(
                "browser_screenshot",
                "Screenshot the current page into the workspace.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Filename within the workspace (default screenshot.png).",
                        },
                    },
                    "required": [],
                }),
            ),
            Box::new(move |args| {
                let bt = bt.clone();
                Box::pin(async move {
                    let filename = optional_str(&args, "filename", "screenshot.png");
                    Ok(bt.screenshot(&filename).await)
                })
            }),
        );
    }
}

#[async_trait::async_trait]
impl SpecialistPack for BasePack {
    fn specialist_id(&self) -> &str {
        &self.specialist_id
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.iter().map(|t| t.def.clone()).collect();
        defs.push(self.finish_tool.clone());
        defs
    }

    fn finish_required_fields(&self) -> Vec<String> {
        self.finish_tool.required_fields()
    }

    fn validate_finish_payload(&self, args: &Value) -> Option<String> {
        self.quality_gate.and_then(|gate| gate(args))
    }

    async fn open(&mut self) -> Result<()> {
        if self.browser_enabled
            && self.network_allowed
            && !self.workspace_path.as_os_str().is_empty()
        {
            let browser = Arc::new(BrowserTool::new(&self.workspace_path));
            match browser.open().await {
                Ok(()) => {
                    self.register_browser_tools(browser.clone());
                    self.browser = Some(browser);
                }
                Err(e) => {
                    tracing::warn!(
                        specialist_id = %self.specialist_id,
                        error = %e,
                        "browser unavailable; continuing without browser tools"
                    );
                }
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(browser) = self.browser.take() {
            browser.close().await;
        }
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        let tool = match self.tools.iter().find(|t| t.def.name == name) {
            Some(t) => t,
            None => {
                return Ok(serde_json::json!({
                    "error": format!(
                        "Unknown tool: {name:?}. Available: {:?}",
                        self.tool_names()
                    ),
                }))
            }
        };
        (tool.handler)(args).await
    }
}

// Decorators hold packs as boxed trait objects; forward the trait through
// the box so `Box<dyn SpecialistPack>` composes.
#[async_trait::async_trait]
impl SpecialistPack for Box<dyn SpecialistPack> {
    fn specialist_id(&self) -> &str {
        (**self).specialist_id()
    }
    fn system_prompt(&self) -> &str {
        (**self).system_prompt()
    }
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        (**self).tool_definitions()
    }
    fn finish_tool_name(&self) -> &str {
        (**self).finish_tool_name()
    }
    fn finish_required_fields(&self) -> Vec<String> {
        (**self).finish_required_fields()
    }
    fn validate_finish_payload(&self, args: &Value) -> Option<String> {
        (**self).validate_finish_payload(args)
    }
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }
    async fn close(&mut self) {
        (**self).close().await
    }
    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        (**self).execute_tool(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_defs::{make_finish_tool_def, make_tool_def};

    fn sample_pack() -> BasePack {
        let mut pack = BasePack::new(
            "sample",
            "You are a sample agent.",
            make_finish_tool_def(
                "done",
                serde_json::json!({"summary": {"type": "string"}}),
                &["summary"],
            ),
            "/tmp/ws",
            false,
        );
        pack.register_tool(
            make_tool_def("ping", "ping", serde_json::json!({"type": "object"})),
            Box::new(|args| Box::pin(async move { Ok(serde_json::json!({"pong": args})) })),
        );
        pack
    }

    #[test]
    fn tool_definitions_include_finish_last() {
        let pack = sample_pack();
        let defs = pack.tool_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "ping");
        assert_eq!(defs[1].name, "finish_task");
        assert_eq!(pack.finish_required_fields(), vec!["summary"]);
    }

    #[tokio::test]
    async fn execute_known_tool() {
        let pack = sample_pack();
        let result = pack
            .execute_tool("ping", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result["pong"]["x"], 1);
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_dict_not_error() {
        let pack = sample_pack();
        let result = pack
            .execute_tool("made_up", serde_json::json!({}))
            .await
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("Unknown tool"));
        assert!(result["error"].as_str().unwrap().contains("ping"));
    }

    #[test]
    fn quality_gate_default_accepts() {
        let pack = sample_pack();
        assert!(pack
            .validate_finish_payload(&serde_json::json!({"summary": "ok"}))
            .is_none());
    }

    #[test]
    fn quality_gate_can_reject() {
        let pack = sample_pack().with_quality_gate(|args| {
            if args.get("tests_verified") == Some(&serde_json::json!(false)) {
                Some("tests_verified is false".into())
            } else {
                None
            }
        });
        assert!(pack
            .validate_finish_payload(&serde_json::json!({"tests_verified": false}))
            .is_some());
        assert!(pack
            .validate_finish_payload(&serde_json::json!({"tests_verified": true}))
            .is_none());
    }

    #[tokio::test]
    async fn open_close_without_browser_are_noops() {
        let mut pack = sample_pack();
        pack.open().await.unwrap();
        pack.close().await;
    }
}
