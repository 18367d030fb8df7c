#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub type SeenQueries = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

pub fn sample_logs() -> Value {
    json!([
        {
            "timestamp": "2025-03-01T12:00:02Z",
            "service": "api",
            "level": "error",
            "message": "upstream timed out",
            "metadata": { "request_id": "r-1" }
        },
        {
            "timestamp": "2025-03-01T12:00:01Z",
            "service": "worker",
            "level": "info",
            "message": "job finished"
        }
    ])
}

pub fn sample_stats() -> Value {
    json!([
        { "timestamp": "2025-03-01T11:59:00Z", "count": 14 },
        { "timestamp": "2025-03-01T12:00:00Z", "count": 3 }
    ])
}

fn record(seen: &SeenQueries, path: &str, params: HashMap<String, String>) {
    seen.lock().unwrap().push((path.to_string(), params));
}

/// Mock log-query service. The path prefix selects the behavior:
/// `/ok`, `/null`, `/fail`, `/garbage`, `/slow`.
pub fn spawn_backend() -> (String, SeenQueries) {
    let seen: SeenQueries = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route(
            "/ok/logs",
            get(|State(seen): State<SeenQueries>, Query(q): Query<HashMap<String, String>>| async move {
                record(&seen, "/logs", q);
                Json(sample_logs())
            }),
        )
        .route(
            "/ok/stats",
            get(|State(seen): State<SeenQueries>, Query(q): Query<HashMap<String, String>>| async move {
                record(&seen, "/stats", q);
                Json(sample_stats())
            }),
        )
        .route("/null/logs", get(|| async { "null" }))
        .route("/null/stats", get(|| async { "null" }))
        .route(
            "/fail/logs",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
        )
        .route("/garbage/logs", get(|| async { "{not json" }))
        .route(
            "/slow/logs",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(sample_logs())
            }),
        )
        .with_state(seen.clone());

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = hyper::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("http://{}", addr), seen)
}

/// Mock push server: every connection receives `frames` and is then held
/// open until the client goes away.
pub async fn spawn_ws_server(frames: Vec<Message>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frames = frames.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                for frame in frames {
                    if ws.send(frame).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    format!("ws://{}/ws", addr)
}

/// Poll `check` until it returns true or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
