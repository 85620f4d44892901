//! Shared fixtures for engine tests: scripted chat clients and an executor
//! wired to real packs on a temp workspace.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use maestro_domain::config::Config;
use maestro_domain::error::{Error, Result};
use maestro_domain::tool::ToolCall;
use maestro_engine::TaskExecutor;
use maestro_packs::SpecialistRegistry;
use maestro_providers::{ChatClient, ChatRequest, ChatResponse};
use maestro_runs::RunRepository;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response builders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn text_response(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        tool_calls: vec![],
        model: "scripted".into(),
        finish_reason: Some("stop".into()),
    }
}

pub fn tool_response(name: &str, args: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            call_id: format!("call_{name}"),
            tool_name: name.to_string(),
            arguments: args,
        }],
        model: "scripted".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted clients
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// FIFO of canned responses; records every request it sees. An exhausted
/// script answers with a transport error (connection-refused stand-in).
pub struct ScriptedChatClient {
    responses: Mutex<VecDeque<ChatResponse>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait::async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Http("scripted client exhausted".into()))
    }
}

/// Routes each request to a script by a keyword matched against the system
/// message, so concurrent pack loops and the orchestrator cannot steal each
/// other's responses.
pub struct RoutedChatClient {
    routes: Vec<(&'static str, Arc<ScriptedChatClient>)>,
}

impl RoutedChatClient {
    pub fn new(routes: Vec<(&'static str, Arc<ScriptedChatClient>)>) -> Arc<Self> {
        Arc::new(Self { routes })
    }
}

#[async_trait::async_trait]
impl ChatClient for RoutedChatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let system = req
            .messages
            .first()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        for (keyword, script) in &self.routes {
            if system.contains(keyword) {
                return script.chat(req).await;
            }
        }
        Err(Error::Http(format!(
            "no scripted route for system prompt: {}…",
            system.chars().take(60).collect::<String>()
        )))
    }
}

/// System-prompt keywords for the stock routes.
pub const ORCHESTRATOR_ROUTE: &str = "task orchestrator";
pub const ROUTER_ROUTE: &str = "task router";
pub const SYNTHESIS_ROUTE: &str = "synthesis agent";
pub const ENGINEERING_ROUTE: &str = "software engineering agent";
pub const RESEARCH_ROUTE: &str = "systematic review";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor fixture
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Fixture {
    pub executor: TaskExecutor,
    pub repository: Arc<RunRepository>,
    // Dropping the TempDir removes the workspace; keep it alive.
    pub workspace: tempfile::TempDir,
}

pub fn fixture(chat_client: Arc<dyn ChatClient>) -> Fixture {
    fixture_with_config(chat_client, Config::default_local())
}

pub fn fixture_with_config(chat_client: Arc<dyn ChatClient>, config: Config) -> Fixture {
    let workspace = tempfile::TempDir::new().expect("temp workspace");
    let repository = Arc::new(RunRepository::new(workspace.path()));
    let registry = Arc::new(SpecialistRegistry::new(config.clone()));
    let executor = TaskExecutor::new(config, chat_client, registry, repository.clone());
    Fixture {
        executor,
        repository,
        workspace,
    }
}

/// Count events of a kind in a run's log.
pub fn count_events(events: &[maestro_domain::event::RunEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

/// First event of a kind, if any.
pub fn find_event<'a>(
    events: &'a [maestro_domain::event::RunEvent],
    kind: &str,
) -> Option<&'a maestro_domain::event::RunEvent> {
    events.iter().find(|e| e.kind == kind)
}
