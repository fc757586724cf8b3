pub mod error;
pub mod sse;

pub use error::ProxyError;
pub use sse::{parse_sse_line, Endpoint, StreamCollector, DONE_SENTINEL};

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

pub const DEFAULT_BACKEND_PORT: u16 = 7776;
pub const DEFAULT_PROXY_PORT: u16 = 7777;

/// Default upper bound on one backend stream: the whole buffered
/// collection, or any single gap in a relayed stream.
const STREAM_STALL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct ProxyState {
    backend_url: String,
    client: reqwest::Client,
    stall_timeout: Duration,
}

impl ProxyState {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            client: reqwest::Client::new(),
            stall_timeout: STREAM_STALL_TIMEOUT,
        }
    }

    /// Override the stall bound.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/models", get(models))
        .route("/v1/completions", post(completions))
        .route("/v1/chat/completions", post(chat_completions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, backend_url: String) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Proxy listening on {}", addr);
    tracing::info!("Forwarding to backend at {}", backend_url);
    axum::serve(listener, router(ProxyState::new(backend_url))).await
}

/// Static model listing; no backend call.
async fn models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "local", "object": "model", "owned_by": "quantbench"}]
    }))
}

async fn chat_completions(
    State(state): State<ProxyState>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    handle_completions(Endpoint::Chat, state, body).await
}

async fn completions(
    State(state): State<ProxyState>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    handle_completions(Endpoint::Completion, state, body).await
}

/// Every request goes to the backend as a streaming request. Callers
/// that asked for streaming get the backend stream relayed verbatim;
/// everyone else gets the stream buffered into one complete response.
async fn handle_completions(
    endpoint: Endpoint,
    state: ProxyState,
    mut body: Value,
) -> Result<Response, ProxyError> {
    let caller_wants_stream = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("local")
        .to_string();
    body["stream"] = Value::Bool(true);

    let url = format!("{}{}", state.backend_url, endpoint.path());
    let backend = state
        .client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| ProxyError::BackendUnreachable(e.to_string()))?;

    if caller_wants_stream {
        tracing::debug!(?endpoint, "Relaying backend stream");
        // A backend that stops producing closes the relay instead of
        // holding the caller's connection open indefinitely.
        let stall = state.stall_timeout;
        let relay = futures::stream::unfold(backend.bytes_stream(), move |mut upstream| async move {
            match tokio::time::timeout(stall, upstream.next()).await {
                Ok(Some(chunk)) => Some((chunk, upstream)),
                Ok(None) => None,
                Err(_) => {
                    tracing::warn!("Backend stream stalled past {:?}, closing relay", stall);
                    None
                }
            }
        });
        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(relay),
        )
            .into_response());
    }

    tracing::debug!(?endpoint, "Buffering backend stream");
    let collector = tokio::time::timeout(state.stall_timeout, buffer_stream(endpoint, backend))
        .await
        .map_err(|_| ProxyError::BackendTimeout)??;

    Ok(Json(collector.into_response_body(&model)).into_response())
}

/// Consume the whole backend event stream line by line.
async fn buffer_stream(
    endpoint: Endpoint,
    backend: reqwest::Response,
) -> Result<StreamCollector, ProxyError> {
    let mut collector = StreamCollector::new(endpoint);
    let mut stream = backend.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProxyError::BackendUnreachable(e.to_string()))?;
        buf.extend_from_slice(&chunk);
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            collector.push_line(&String::from_utf8_lossy(&line));
        }
    }
    if !buf.is_empty() {
        collector.push_line(&String::from_utf8_lossy(&buf));
    }
    Ok(collector)
}
