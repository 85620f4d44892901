//! HTTP gateway.
//!
//! - `POST /run`: execute a task, respond with the `RunResult`.
//! - `POST /run/stream`: `text/event-stream`; one `data: {kind,data,step}`
//!   frame per run event, terminated by `run_complete` / `_run_done_`.
//! - `GET /runs/{id}/status`: running/completed, derived from the run log.
//! - `GET /health`: always open, even when the bearer-token gate is on.
//!
//! The bearer token is read once from the configured env var and compared in
//! constant time against a SHA-256 digest.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use maestro_domain::config::Config;
use maestro_domain::event::kind;
use maestro_domain::task::{RunId, Task};
use maestro_runs::RunRepository;

use crate::cli::build_executor;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<RunRepository>,
    /// SHA-256 of the bearer token; `None` disables the auth gate.
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let api_token_hash = match std::env::var(&config.server.api_token_env) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var = %config.server.api_token_env, "API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!(
                    env_var = %config.server.api_token_env,
                    "API bearer-token auth disabled — set the env var to enable"
                );
                None
            }
        };
        let repository = Arc::new(RunRepository::new(&config.workspace_root));
        Self {
            config: Arc::new(config),
            repository,
            api_token_hash,
        }
    }

    /// Constant-time bearer check. `None` hash means the gate is off.
    fn authorized(&self, auth_header: Option<&str>) -> bool {
        let Some(expected) = &self.api_token_hash else {
            return true;
        };
        let Some(token) = auth_header.and_then(|h| h.strip_prefix("Bearer ")) else {
            return false;
        };
        let got = Sha256::digest(token.as_bytes());
        got.as_slice().ct_eq(expected.as_slice()).into()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_task))
        .route("/run/stream", post(run_task_stream))
        .route("/runs/:id/status", get(run_status))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config);
    let app = router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "maestro gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub prompt: String,
    #[serde(default)]
    pub pack: Option<String>,
    #[serde(default = "default_model_key")]
    pub model_key: String,
    #[serde(default)]
    pub network_allowed: bool,
}

fn default_model_key() -> String {
    "quality".into()
}

impl RunRequest {
    fn into_task(self) -> Task {
        Task {
            prompt: self.prompt,
            specialist_id: self.pack,
            model_key: self.model_key,
            network_allowed: self.network_allowed,
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn run_task(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<RunRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }

    let executor = match build_executor(&state.config, &body.model_key) {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    match executor.execute_task(&body.into_task()).await {
        Ok(result) => (StatusCode::OK, Json(serde_json::json!(result))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}

async fn run_task_stream(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<RunRequest>,
) -> axum::response::Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }

    let executor = match build_executor(&state.config, &body.model_key) {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let executor = executor.with_event_stream(tx);
    let task = body.into_task();

    tokio::spawn(async move {
        if let Err(e) = executor.execute_task(&task).await {
            tracing::error!(error = %e, "streamed run failed");
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.kind == kind::RUN_COMPLETE || event.kind == "_run_done_";
            let frame = serde_json::json!({
                "kind": event.kind,
                "data": event.payload,
                "step": event.step,
            });
            yield Ok::<Event, std::convert::Infallible>(Event::default().data(frame.to_string()));
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).into_response()
}

async fn run_status(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }

    let run_id = RunId(id.clone());
    if !state.repository.run_dir(&run_id).is_dir() {
        return error_response(StatusCode::NOT_FOUND, &format!("no such run: {id}"));
    }

    // Completed iff the run log carries a run_complete event.
    let events = state.repository.read_run_events(&run_id).unwrap_or_default();
    match events.iter().find(|e| e.kind == kind::RUN_COMPLETE) {
        Some(complete) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "completed",
                "run_id": id,
                "specialist_ids": complete.payload.get("specialist_ids"),
                "task_force_mode": complete.payload.get("task_force_mode"),
            })),
        )
            .into_response(),
        None => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "running", "run_id": id })),
        )
            .into_response(),
    }
}

fn check_auth(
    state: &AppState,
    headers: &axum::http::HeaderMap,
) -> Result<(), axum::response::Response> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if state.authorized(auth) {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "invalid or missing bearer token"))
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
