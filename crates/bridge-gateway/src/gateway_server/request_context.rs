//! Request correlation ids and entry/exit request logging.
use super::*;

/// Correlation id assigned to every inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct RequestId(String);

impl RequestId {
    pub(super) fn as_str(&self) -> &str {
        &self.0
    }
}

pub(super) async fn assign_request_id(
    State(state): State<Arc<GatewayServerState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = RequestId(state.next_request_id());
    request.extensions_mut().insert(request_id.clone());
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub(super) async fn log_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    tracing::info!(request_id = request_id.as_str(), "--> {method} {path}");
    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration_ms = elapsed_ms(started);
    tracing::info!(
        request_id = request_id.as_str(),
        status,
        duration_ms,
        "<-- {method} {path} {status} {duration_ms}ms"
    );
    response
}
