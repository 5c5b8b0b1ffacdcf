//! OpenAI-compatible chat surface (`/v1/chat/completions`, `/v1/models`).
use super::prompt_composer::compat_invocation;
use super::*;

const OPENAI_OWNER: &str = "anthropic";
const OPENAI_CHAT_COMPLETION_OBJECT: &str = "chat.completion";
const OPENAI_CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";
const SSE_DONE: &str = "[DONE]";

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiChatCompletionsRequest {
    #[serde(default)]
    pub(super) model: Option<String>,
    #[serde(default)]
    pub(super) messages: Vec<CompatMessage>,
    #[serde(default)]
    pub(super) stream: bool,
}

/// Identity shared by every frame of one streamed completion.
#[derive(Debug, Clone)]
pub(super) struct CompletionFrame {
    pub(super) id: String,
    pub(super) created: u64,
    pub(super) model: String,
}

impl CompletionFrame {
    pub(super) fn chunk_payload(&self, chunk: &NormalizedChunk) -> Value {
        match chunk {
            NormalizedChunk::Text { text, .. } => json!({
                "id": self.id,
                "object": OPENAI_CHAT_COMPLETION_CHUNK_OBJECT,
                "created": self.created,
                "model": self.model,
                "choices": [{
                    "index": 0,
                    "delta": {
                        "content": text,
                    },
                    "finish_reason": Value::Null,
                }],
            }),
            NormalizedChunk::Done { usage, .. } => {
                let usage = usage.clone().unwrap_or_default();
                json!({
                    "id": self.id,
                    "object": OPENAI_CHAT_COMPLETION_CHUNK_OBJECT,
                    "created": self.created,
                    "model": self.model,
                    "choices": [{
                        "index": 0,
                        "delta": {},
                        "finish_reason": "stop",
                    }],
                    "usage": {
                        "prompt_tokens": usage.input_tokens,
                        "completion_tokens": usage.output_tokens,
                        "total_tokens": usage.total_tokens(),
                    },
                })
            }
        }
    }

    /// SSE `data:` payloads for one stream item. Terminal items close with `[DONE]`.
    pub(super) fn frame_data(&self, item: &ChunkItem) -> Vec<String> {
        match item {
            Ok(chunk @ NormalizedChunk::Text { .. }) => vec![self.chunk_payload(chunk).to_string()],
            Ok(chunk @ NormalizedChunk::Done { .. }) => vec![
                self.chunk_payload(chunk).to_string(),
                SSE_DONE.to_string(),
            ],
            Err(error) => vec![
                ApiError::from(error).openai_payload().to_string(),
                SSE_DONE.to_string(),
            ],
        }
    }
}

pub(super) async fn handle_openai_models(
    State(state): State<Arc<GatewayServerState>>,
) -> Json<Value> {
    Json(build_models_payload(
        state.config.compat_model_name.as_str(),
        current_unix_timestamp(),
    ))
}

pub(super) async fn handle_openai_chat_completions(
    State(state): State<Arc<GatewayServerState>>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let request = match parse_json_body::<OpenAiChatCompletionsRequest>(&body) {
        Ok(request) => request,
        Err(error) => return error.logged(&request_id).into_openai_response(),
    };
    let model = state.compat_model_name(request.model.as_deref());
    let invocation = match compat_invocation(&request.messages, request.stream) {
        Ok(invocation) => invocation,
        Err(error) => return error.logged(&request_id).into_openai_response(),
    };
    tracing::debug!(
        request_id = request_id.as_str(),
        model = model.as_str(),
        messages = request.messages.len(),
        stream = request.stream,
        "openai chat completions request"
    );

    if request.stream {
        let frame = CompletionFrame {
            id: state.next_completion_id(),
            created: current_unix_timestamp(),
            model,
        };
        return match state.config.client.invoke_streaming(&invocation).await {
            Ok(chunks) => stream_openai_chat_completions(chunks, frame, request_id),
            Err(error) => ApiError::from(error)
                .logged(&request_id)
                .into_openai_response(),
        };
    }

    match state.config.client.invoke(&invocation).await {
        Ok(reply) => {
            let id = if reply.session_id.is_empty() {
                state.next_completion_id()
            } else {
                format!("chatcmpl-{}", reply.session_id)
            };
            let payload = build_chat_completion_payload(&id, current_unix_timestamp(), &model, &reply);
            let mut response = (StatusCode::OK, Json(payload)).into_response();
            if let Some(session_id) = session_id_header(&reply) {
                response.headers_mut().insert(SESSION_ID_HEADER, session_id);
            }
            response
        }
        Err(error) => ApiError::from(error)
            .logged(&request_id)
            .into_openai_response(),
    }
}

fn stream_openai_chat_completions(
    chunks: impl Stream<Item = ChunkItem> + Send + 'static,
    frame: CompletionFrame,
    request_id: RequestId,
) -> Response {
    let events = chunks.flat_map(move |item| {
        if let Err(error) = &item {
            tracing::error!(
                request_id = request_id.as_str(),
                reason_code = error.reason_code(),
                "openai chat completions stream failed: {error}"
            );
        }
        let data = frame.frame_data(&item);
        stream::iter(
            data.into_iter()
                .map(|payload| Ok::<Event, Infallible>(Event::default().data(payload))),
        )
    });
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub(super) fn build_chat_completion_payload(
    id: &str,
    created: u64,
    model: &str,
    reply: &AssistantReply,
) -> Value {
    json!({
        "id": id,
        "object": OPENAI_CHAT_COMPLETION_OBJECT,
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": reply.result,
            },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": reply.usage.input_tokens,
            "completion_tokens": reply.usage.output_tokens,
            "total_tokens": reply.usage.total_tokens(),
        },
    })
}

pub(super) fn build_models_payload(model_name: &str, created: u64) -> Value {
    json!({
        "object": "list",
        "data": [{
            "id": model_name,
            "object": "model",
            "created": created,
            "owned_by": OPENAI_OWNER,
        }],
    })
}
