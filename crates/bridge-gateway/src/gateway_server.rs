use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Path as RoutePath, Request, State};
use axum::http::{header::AUTHORIZATION, header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use bridge_core::{current_iso8601_timestamp, current_unix_timestamp, duration_ms_to_nanos};
use bridge_provider::{
    AssistantClient, AssistantReply, BridgeError, ChunkItem, InvocationRequest, NormalizedChunk,
};
use futures_util::{stream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod auth_runtime;
mod chat_validation;
mod ollama_compat;
mod openai_compat;
mod prompt_composer;
mod request_context;
mod session_registry;
mod types;

use auth_runtime::authorize_request;
use chat_validation::validate_native_chat_request;
use ollama_compat::{handle_ollama_chat, handle_ollama_root, handle_ollama_tags};
use openai_compat::{handle_openai_chat_completions, handle_openai_models};
use request_context::{assign_request_id, log_request, RequestId};
use session_registry::SessionRegistry;
use types::{ApiError, CompatMessage, NativeChatRequest, NativeChatResponse, NativeUsage};

const HEALTH_ENDPOINT: &str = "/health";
const READY_ENDPOINT: &str = "/ready";
const NATIVE_CHAT_ENDPOINT: &str = "/v1/chat";
const SESSIONS_ENDPOINT: &str = "/v1/sessions";
const SESSION_ENDPOINT: &str = "/v1/sessions/{id}";
const OLLAMA_ROOT_ENDPOINT: &str = "/";
const OLLAMA_CHAT_ENDPOINT: &str = "/api/chat";
const OLLAMA_TAGS_ENDPOINT: &str = "/api/tags";
const OLLAMA_GENERATE_ENDPOINT: &str = "/api/generate";
const OPENAI_CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";
const OPENAI_MODELS_ENDPOINT: &str = "/v1/models";
const REQUEST_ID_HEADER: &str = "x-request-id";
const SESSION_ID_HEADER: &str = "x-session-id";
const API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_COMPAT_MODEL_NAME: &str = "claude-code";

#[derive(Clone)]
pub struct GatewayServerConfig {
    pub client: Arc<dyn AssistantClient>,
    pub bind: String,
    pub api_keys: Vec<String>,
    pub ollama_api_enabled: bool,
    pub compat_model_name: String,
    /// Base for relative `workingDirectory` values and the recorded default.
    pub service_working_directory: PathBuf,
}

struct GatewayServerState {
    config: GatewayServerConfig,
    sessions: SessionRegistry,
    sequence: AtomicU64,
}

impl GatewayServerState {
    fn new(config: GatewayServerConfig) -> Self {
        Self {
            config,
            sessions: SessionRegistry::default(),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn next_request_id(&self) -> String {
        format!("req_{:016x}", self.next_sequence())
    }

    fn next_completion_id(&self) -> String {
        format!("chatcmpl-{:016x}", self.next_sequence())
    }

    /// Model name echoed by the compat surfaces. Never forwarded to the CLI.
    fn compat_model_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.config.compat_model_name.as_str())
            .to_string()
    }
}

pub async fn run_gateway_server(config: GatewayServerConfig) -> Result<()> {
    let bind_addr = validate_gateway_bind(&config.bind)?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind claude bridge on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound claude bridge address")?;

    tracing::info!(
        addr = %local_addr,
        ollama_api_enabled = config.ollama_api_enabled,
        api_keys = config.api_keys.len(),
        "claude bridge listening"
    );

    let app = build_gateway_router(config);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("claude bridge server exited unexpectedly")?;
    tracing::info!("claude bridge stopped");
    Ok(())
}

pub fn validate_gateway_bind(bind: &str) -> Result<SocketAddr> {
    bind.parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address '{bind}'"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

/// Builds the full router, including the compat surfaces when enabled.
pub fn build_gateway_router(config: GatewayServerConfig) -> Router {
    build_router_with_state(Arc::new(GatewayServerState::new(config)))
}

fn build_router_with_state(state: Arc<GatewayServerState>) -> Router {
    let mut router = Router::new()
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(READY_ENDPOINT, get(handle_ready))
        .route(NATIVE_CHAT_ENDPOINT, post(handle_native_chat))
        .route(SESSIONS_ENDPOINT, get(handle_list_sessions))
        .route(
            SESSION_ENDPOINT,
            get(handle_get_session).delete(handle_delete_session),
        );
    if state.config.ollama_api_enabled {
        router = router
            .route(OLLAMA_ROOT_ENDPOINT, get(handle_ollama_root))
            .route(OLLAMA_CHAT_ENDPOINT, post(handle_ollama_chat))
            .route(OLLAMA_TAGS_ENDPOINT, get(handle_ollama_tags))
            .route(
                OPENAI_CHAT_COMPLETIONS_ENDPOINT,
                post(handle_openai_chat_completions),
            )
            .route(OPENAI_MODELS_ENDPOINT, get(handle_openai_models));
    }

    router
        .fallback(handle_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authorize_request,
        ))
        .layer(middleware::from_fn(log_request))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            assign_request_id,
        ))
        .with_state(state)
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": current_iso8601_timestamp(),
    }))
}

async fn handle_ready() -> Json<Value> {
    Json(json!({
        "status": "ready",
        "timestamp": current_iso8601_timestamp(),
    }))
}

async fn handle_not_found(Extension(request_id): Extension<RequestId>) -> Response {
    ApiError::not_found("Route not found")
        .logged(&request_id)
        .into_response()
}

async fn handle_native_chat(
    State(state): State<Arc<GatewayServerState>>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    match execute_native_chat(&state, &body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error.logged(&request_id).into_response(),
    }
}

async fn execute_native_chat(
    state: &GatewayServerState,
    body: &Bytes,
) -> Result<NativeChatResponse, ApiError> {
    let request = parse_json_body::<NativeChatRequest>(body)?;
    let validated =
        validate_native_chat_request(request, &state.config.service_working_directory)?;
    let working_directory = validated
        .working_directory
        .clone()
        .unwrap_or_else(|| state.config.service_working_directory.clone());
    let invocation = InvocationRequest::new(validated.prompt)?
        .with_resume_session_id(validated.session_id)
        .with_model(validated.model)
        .with_system_prompt(validated.system_prompt)
        .with_allowed_tools(validated.allowed_tools)
        .with_working_directory(validated.working_directory);

    let started = Instant::now();
    let reply = state.config.client.invoke(&invocation).await?;
    let duration_ms = elapsed_ms(started);

    if !reply.session_id.is_empty() {
        state
            .sessions
            .record(&reply.session_id, &working_directory, reply.num_turns)?;
    }

    Ok(NativeChatResponse {
        success: true,
        session_id: reply.session_id.clone(),
        result: reply.result.clone(),
        duration_ms,
        usage: NativeUsage {
            input_tokens: reply.usage.input_tokens,
            output_tokens: reply.usage.output_tokens,
            total_cost_usd: reply.total_cost_usd(),
        },
    })
}

async fn handle_list_sessions(
    State(state): State<Arc<GatewayServerState>>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    match state.sessions.list() {
        Ok(sessions) => Json(json!({
            "success": true,
            "sessions": sessions,
        }))
        .into_response(),
        Err(error) => error.logged(&request_id).into_response(),
    }
}

async fn handle_get_session(
    State(state): State<Arc<GatewayServerState>>,
    Extension(request_id): Extension<RequestId>,
    RoutePath(session_id): RoutePath<String>,
) -> Response {
    let lookup = state.sessions.get(&session_id).and_then(|session| {
        session.ok_or_else(|| ApiError::not_found(format!("Session {session_id} not found")))
    });
    match lookup {
        Ok(session) => Json(json!({
            "success": true,
            "session": session,
        }))
        .into_response(),
        Err(error) => error.logged(&request_id).into_response(),
    }
}

async fn handle_delete_session(
    State(state): State<Arc<GatewayServerState>>,
    Extension(request_id): Extension<RequestId>,
    RoutePath(session_id): RoutePath<String>,
) -> Response {
    let removed = state.sessions.remove(&session_id).and_then(|removed| {
        if removed {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("Session {session_id} not found")))
        }
    });
    match removed {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Session {session_id} deleted"),
        }))
        .into_response(),
        Err(error) => error.logged(&request_id).into_response(),
    }
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice::<T>(body).map_err(|error| {
        ApiError::validation(format!("failed to parse request body: {error}"))
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn session_id_header(reply: &AssistantReply) -> Option<HeaderValue> {
    if reply.session_id.is_empty() {
        return None;
    }
    HeaderValue::from_str(&reply.session_id).ok()
}
