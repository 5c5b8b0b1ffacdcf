//! API key authentication for every non-public route.
use super::*;

const OLLAMA_PUBLIC_PREFIXES: [&str; 5] = [
    OLLAMA_CHAT_ENDPOINT,
    OLLAMA_TAGS_ENDPOINT,
    OLLAMA_GENERATE_ENDPOINT,
    OPENAI_CHAT_COMPLETIONS_ENDPOINT,
    OPENAI_MODELS_ENDPOINT,
];

pub(super) fn is_public_path(path: &str, ollama_api_enabled: bool) -> bool {
    if path == HEALTH_ENDPOINT || path == READY_ENDPOINT {
        return true;
    }
    if !ollama_api_enabled {
        return false;
    }
    path == OLLAMA_ROOT_ENDPOINT
        || OLLAMA_PUBLIC_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
}

/// `X-API-Key` wins over `Authorization: Bearer`.
fn api_key_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        return Some(key.to_string());
    }
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Walks all of `observed` regardless of where the first mismatch is.
pub(super) fn constant_time_eq(observed: &[u8], expected: &[u8]) -> bool {
    let mut diff = observed.len() ^ expected.len();
    for (index, byte) in observed.iter().enumerate() {
        let other = expected.get(index).copied().unwrap_or_default();
        diff |= usize::from(byte ^ other);
    }
    std::hint::black_box(diff) == 0
}

pub(super) fn is_configured_api_key(observed: &str, configured: &[String]) -> bool {
    let mut matched = false;
    for key in configured {
        matched |= constant_time_eq(observed.as_bytes(), key.as_bytes());
    }
    matched
}

pub(super) async fn authorize_request(
    State(state): State<Arc<GatewayServerState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path(), state.config.ollama_api_enabled) {
        return next.run(request).await;
    }

    let rejection = match api_key_from_headers(request.headers()) {
        None => Some("API key required"),
        Some(key) if !is_configured_api_key(&key, &state.config.api_keys) => {
            Some("Invalid API key")
        }
        Some(_) => None,
    };
    let Some(message) = rejection else {
        return next.run(request).await;
    };

    let error = ApiError::unauthorized(message);
    match request.extensions().get::<RequestId>() {
        Some(request_id) => error.logged(request_id).into_response(),
        None => error.into_response(),
    }
}
