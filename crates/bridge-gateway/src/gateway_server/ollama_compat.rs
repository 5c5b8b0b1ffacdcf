//! Ollama-compatible chat surface (`/api/chat`, `/api/tags`, `/`).
//!
//! Streaming replies are newline-delimited JSON with no envelope: one record
//! per text fragment, then a `done: true` record carrying the token counts.
use super::prompt_composer::compat_invocation;
use super::*;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const ASSISTANT_ROLE: &str = "assistant";
const DONE_REASON_STOP: &str = "stop";

#[derive(Debug, Deserialize)]
pub(super) struct OllamaChatRequest {
    #[serde(default)]
    pub(super) model: Option<String>,
    #[serde(default)]
    pub(super) messages: Vec<CompatMessage>,
    #[serde(default)]
    pub(super) stream: bool,
}

pub(super) async fn handle_ollama_root() -> &'static str {
    "Ollama is running"
}

pub(super) async fn handle_ollama_tags(State(state): State<Arc<GatewayServerState>>) -> Json<Value> {
    Json(build_ollama_tags_payload(
        state.config.compat_model_name.as_str(),
        &current_iso8601_timestamp(),
    ))
}

pub(super) async fn handle_ollama_chat(
    State(state): State<Arc<GatewayServerState>>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let request = match parse_json_body::<OllamaChatRequest>(&body) {
        Ok(request) => request,
        Err(error) => return error.logged(&request_id).into_ollama_response(),
    };
    let model = state.compat_model_name(request.model.as_deref());
    let invocation = match compat_invocation(&request.messages, request.stream) {
        Ok(invocation) => invocation,
        Err(error) => return error.logged(&request_id).into_ollama_response(),
    };
    tracing::debug!(
        request_id = request_id.as_str(),
        model = model.as_str(),
        messages = request.messages.len(),
        stream = request.stream,
        "ollama chat request"
    );

    let started = Instant::now();
    if request.stream {
        return match state.config.client.invoke_streaming(&invocation).await {
            Ok(chunks) => stream_ollama_chat(chunks, model, started, request_id),
            Err(error) => ApiError::from(error)
                .logged(&request_id)
                .into_ollama_response(),
        };
    }

    match state.config.client.invoke(&invocation).await {
        Ok(reply) => {
            let payload = build_ollama_reply_payload(&model, &reply, elapsed_ms(started));
            let mut response = (StatusCode::OK, Json(payload)).into_response();
            if let Some(session_id) = session_id_header(&reply) {
                response.headers_mut().insert(SESSION_ID_HEADER, session_id);
            }
            response
        }
        Err(error) => ApiError::from(error)
            .logged(&request_id)
            .into_ollama_response(),
    }
}

fn stream_ollama_chat(
    chunks: impl Stream<Item = ChunkItem> + Send + 'static,
    model: String,
    started: Instant,
    request_id: RequestId,
) -> Response {
    let lines = chunks.map(move |item| {
        let record = match item {
            Ok(chunk) => build_ollama_chunk_record(&model, &chunk, elapsed_ms(started)),
            Err(error) => {
                tracing::error!(
                    request_id = request_id.as_str(),
                    reason_code = error.reason_code(),
                    "ollama chat stream failed: {error}"
                );
                build_ollama_error_record(&model, &error)
            }
        };
        Ok::<String, Infallible>(format!("{record}\n"))
    });

    let mut response = Response::new(Body::from_stream(lines));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
    response
}

/// One NDJSON record for a decoded chunk. `elapsed_ms` stands in for the
/// duration when the CLI did not report one.
pub(super) fn build_ollama_chunk_record(
    model: &str,
    chunk: &NormalizedChunk,
    elapsed_ms: u64,
) -> Value {
    match chunk {
        NormalizedChunk::Text { text, .. } => json!({
            "model": model,
            "created_at": current_iso8601_timestamp(),
            "message": {
                "role": ASSISTANT_ROLE,
                "content": text,
            },
            "done": false,
        }),
        NormalizedChunk::Done {
            usage, duration_ms, ..
        } => {
            let usage = usage.clone().unwrap_or_default();
            let duration_ms = duration_ms.filter(|ms| *ms > 0).unwrap_or(elapsed_ms);
            json!({
                "model": model,
                "created_at": current_iso8601_timestamp(),
                "message": {
                    "role": ASSISTANT_ROLE,
                    "content": "",
                },
                "done": true,
                "done_reason": DONE_REASON_STOP,
                "total_duration": duration_ms_to_nanos(duration_ms),
                "prompt_eval_count": usage.input_tokens,
                "eval_count": usage.output_tokens,
            })
        }
    }
}

pub(super) fn build_ollama_error_record(model: &str, error: &BridgeError) -> Value {
    json!({
        "model": model,
        "created_at": current_iso8601_timestamp(),
        "message": {
            "role": ASSISTANT_ROLE,
            "content": format!("Error: {error}"),
        },
        "done": true,
        "done_reason": DONE_REASON_STOP,
        "error": error.to_string(),
    })
}

pub(super) fn build_ollama_reply_payload(
    model: &str,
    reply: &AssistantReply,
    elapsed_ms: u64,
) -> Value {
    json!({
        "model": model,
        "created_at": current_iso8601_timestamp(),
        "message": {
            "role": ASSISTANT_ROLE,
            "content": reply.result,
        },
        "done": true,
        "done_reason": DONE_REASON_STOP,
        "total_duration": duration_ms_to_nanos(elapsed_ms),
        "prompt_eval_count": reply.usage.input_tokens,
        "eval_count": reply.usage.output_tokens,
    })
}

pub(super) fn build_ollama_tags_payload(model_name: &str, modified_at: &str) -> Value {
    json!({
        "models": [{
            "name": model_name,
            "model": format!("{model_name}:latest"),
            "modified_at": modified_at,
            "size": 0,
            "digest": model_name,
            "details": {
                "parent_model": "",
                "format": "claude",
                "family": "claude",
                "families": ["claude"],
                "parameter_size": "unknown",
                "quantization_level": "none",
            },
        }],
    })
}
