mod common;

use common::spawn_backend;
use logstream_dashboard::app::ports::LogQueryPort;
use logstream_dashboard::error::DashboardError;
use logstream_dashboard::infra::ReqwestLogQuery;
use logstream_dashboard::query::{build_query, Filter};
use logstream_dashboard::types::Level;
use std::time::Duration;

fn client(base: &str, prefix: &str) -> ReqwestLogQuery {
    ReqwestLogQuery::new(&format!("{}/{}", base, prefix), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_logs_request_carries_filter_parameters() {
    let (base, seen) = spawn_backend();
    let filter = Filter::default()
        .with_service("api")
        .with_level(Level::Error)
        .with_search("disk full");

    let entries = client(&base, "ok").fetch_logs(&build_query(&filter)).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].service, "api");
    assert_eq!(entries[0].level, Level::Error);
    assert_eq!(
        entries[0].metadata.as_ref().and_then(|m| m.get("request_id")).map(String::as_str),
        Some("r-1")
    );

    let seen = seen.lock().unwrap();
    let (path, params) = &seen[0];
    assert_eq!(path, "/logs");
    assert_eq!(params.get("service").map(String::as_str), Some("api"));
    assert_eq!(params.get("level").map(String::as_str), Some("error"));
    assert_eq!(params.get("search").map(String::as_str), Some("disk full"));
    assert_eq!(params.get("limit").map(String::as_str), Some("100"));
    assert!(!params.contains_key("start_time"));
}

#[tokio::test]
async fn test_unfiltered_stats_request_sends_only_limit() {
    let (base, seen) = spawn_backend();

    let stats = client(&base, "ok").fetch_stats(&build_query(&Filter::default())).await.unwrap();

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].count, 14);
    let seen = seen.lock().unwrap();
    let (path, params) = &seen[0];
    assert_eq!(path, "/stats");
    assert_eq!(params.len(), 1);
    assert_eq!(params.get("limit").map(String::as_str), Some("100"));
}

#[tokio::test]
async fn test_null_body_is_an_empty_result() {
    let (base, _) = spawn_backend();
    let query = build_query(&Filter::default());
    let api = client(&base, "null");

    assert!(api.fetch_logs(&query).await.unwrap().is_empty());
    assert!(api.fetch_stats(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_status_is_a_failure() {
    let (base, _) = spawn_backend();
    let err = client(&base, "fail")
        .fetch_logs(&build_query(&Filter::default()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DashboardError::Status {
            endpoint: "logs",
            status: 500
        }
    ));
}

#[tokio::test]
async fn test_malformed_body_is_a_failure() {
    let (base, _) = spawn_backend();
    let err = client(&base, "garbage")
        .fetch_logs(&build_query(&Filter::default()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "malformed");
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let (base, _) = spawn_backend();
    let api = ReqwestLogQuery::new(&format!("{}/slow", base), Duration::from_millis(100)).unwrap();
    let err = api.fetch_logs(&build_query(&Filter::default())).await.unwrap_err();
    assert!(matches!(err, DashboardError::Timeout { endpoint: "logs" }));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let api = ReqwestLogQuery::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(1))
        .unwrap();
    let err = api.fetch_logs(&build_query(&Filter::default())).await.unwrap_err();
    assert_eq!(err.kind(), "http");
}
