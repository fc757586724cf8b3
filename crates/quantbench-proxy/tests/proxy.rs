use std::time::Duration;

use axum::body::Body;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use quantbench_proxy::{router, ProxyState};

const BACKEND_STREAM: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n\
data: [DONE]\n\n";

async fn fake_chat_backend() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        BACKEND_STREAM,
    )
}

async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_proxy_with_fake_backend() -> String {
    let backend = Router::new().route("/v1/chat/completions", post(fake_chat_backend));
    let backend_url = spawn_app(backend).await;
    spawn_app(router(ProxyState::new(backend_url))).await
}

#[tokio::test]
async fn test_buffered_mode_synthesizes_one_response() {
    let proxy_url = spawn_proxy_with_fake_backend().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", proxy_url))
        .json(&serde_json::json!({
            "model": "local",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], -1);
}

#[tokio::test]
async fn test_streaming_passthrough_is_line_identical() {
    let proxy_url = spawn_proxy_with_fake_backend().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", proxy_url))
        .json(&serde_json::json!({
            "model": "local",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(
        resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/event-stream"
    );
    let body = resp.text().await.unwrap();
    assert_eq!(body, BACKEND_STREAM);
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    // Port 9 (discard) is not listening on localhost.
    let proxy_url = spawn_app(router(ProxyState::new("http://127.0.0.1:9"))).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/v1/completions", proxy_url))
        .json(&serde_json::json!({"model": "local", "prompt": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 502);
}

/// Emits one event, then never produces another chunk.
async fn stalling_backend() -> impl IntoResponse {
    let stream = futures::stream::unfold(true, |first| async move {
        if first {
            let event = String::from("data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n");
            Some((Ok::<_, std::convert::Infallible>(event), false))
        } else {
            futures::future::pending().await
        }
    });
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
}

#[tokio::test]
async fn test_stalled_backend_closes_relay() {
    let backend = Router::new().route("/v1/chat/completions", post(stalling_backend));
    let backend_url = spawn_app(backend).await;
    let state = ProxyState::new(backend_url).with_stall_timeout(Duration::from_millis(200));
    let proxy_url = spawn_app(router(state)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", proxy_url))
        .json(&serde_json::json!({
            "model": "local",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();

    // The relay must end once the backend stalls; what arrived before
    // the stall is still delivered.
    let body = tokio::time::timeout(Duration::from_secs(5), resp.text())
        .await
        .expect("relay stayed open past the stall bound")
        .unwrap();
    assert!(body.contains("\"content\":\"He\""));
}

#[tokio::test]
async fn test_models_endpoint_is_static() {
    // No backend is spawned at all: the listing must not need one.
    let proxy_url = spawn_app(router(ProxyState::new("http://127.0.0.1:9"))).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/v1/models", proxy_url))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0]["id"], "local");
}
