//! Gateway request/response/error types shared by the native and compat handlers.

use super::*;

pub(super) const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub(super) const AUTHENTICATION_ERROR: &str = "AUTHENTICATION_ERROR";
pub(super) const NOT_FOUND: &str = "NOT_FOUND";
pub(super) const CLAUDE_ERROR: &str = "CLAUDE_ERROR";
pub(super) const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
pub(super) const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Failure surfaced at the HTTP boundary, rendered per protocol family.
#[derive(Debug)]
pub(super) struct ApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
    pub(super) diagnostics: Option<String>,
    pub(super) request_id: Option<String>,
}

impl ApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            diagnostics: None,
            request_id: None,
        }
    }

    pub(super) fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, VALIDATION_ERROR, message)
    }

    pub(super) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, AUTHENTICATION_ERROR, message)
    }

    pub(super) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND, message)
    }

    pub(super) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, message)
    }

    /// Logs the failure against the request and tags the envelope with its id.
    pub(super) fn logged(mut self, request_id: &RequestId) -> Self {
        tracing::error!(
            request_id = request_id.as_str(),
            code = self.code,
            status = self.status.as_u16(),
            "{}",
            self.message
        );
        if let Some(diagnostics) = self.diagnostics.as_deref() {
            tracing::debug!(
                request_id = request_id.as_str(),
                diagnostics,
                "claude cli diagnostics"
            );
        }
        self.request_id = Some(request_id.as_str().to_string());
        self
    }

    /// `{error:{type,code,message}}` body used by the OpenAI surface.
    pub(super) fn openai_payload(&self) -> Value {
        let error_type = if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        };
        json!({
            "error": {
                "type": error_type,
                "code": self.code,
                "message": self.message,
            }
        })
    }

    pub(super) fn into_openai_response(self) -> Response {
        (self.status, Json(self.openai_payload())).into_response()
    }

    pub(super) fn into_ollama_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self::from(&error)
    }
}

impl From<&BridgeError> for ApiError {
    fn from(error: &BridgeError) -> Self {
        let (status, code) = match error {
            BridgeError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, VALIDATION_ERROR),
            BridgeError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, TIMEOUT_ERROR),
            BridgeError::Spawn { .. }
            | BridgeError::ProcessFailed { .. }
            | BridgeError::Decode { .. }
            | BridgeError::Io(_) => (StatusCode::BAD_GATEWAY, CLAUDE_ERROR),
        };
        let message = match error {
            BridgeError::InvalidRequest(message) => message.clone(),
            other => other.to_string(),
        };
        Self {
            diagnostics: error.diagnostics().map(str::to_string),
            ..Self::new(status, code, message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut payload = json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        });
        if let Some(request_id) = self.request_id {
            payload["requestId"] = Value::String(request_id);
        }
        (self.status, Json(payload)).into_response()
    }
}

/// Native `/v1/chat` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NativeChatRequest {
    pub(super) prompt: String,
    #[serde(default)]
    pub(super) session_id: Option<String>,
    #[serde(default)]
    pub(super) working_directory: Option<String>,
    #[serde(default)]
    pub(super) model: Option<String>,
    #[serde(default)]
    pub(super) system_prompt: Option<String>,
    #[serde(default)]
    pub(super) allowed_tools: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NativeChatResponse {
    pub(super) success: bool,
    pub(super) session_id: String,
    pub(super) result: String,
    pub(super) duration_ms: u64,
    pub(super) usage: NativeUsage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NativeUsage {
    pub(super) input_tokens: u64,
    pub(super) output_tokens: u64,
    pub(super) total_cost_usd: f64,
}

/// One entry of a compat `messages` array.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct CompatMessage {
    #[serde(default)]
    pub(super) role: String,
    #[serde(default)]
    pub(super) content: Value,
}

impl CompatMessage {
    /// Text of the message; OpenAI content-part arrays are concatenated.
    pub(super) fn text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(map) => map.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }
}
