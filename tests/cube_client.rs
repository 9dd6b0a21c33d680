//! `CubeClient` against a local stub of the `/load` endpoint.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query as QueryParams;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use cubecheck::api::LoadResponse;
use cubecheck::cli::QueryArgs;
use cubecheck::commands::{EXIT_FAILURE, EXIT_SUCCESS, query_with};
use cubecheck::query::Query;
use cubecheck::{CubeClient, Harness, LoadError, Status, TestCase, Transport};

const TOKEN: &str = "test-token";

async fn load(
    headers: HeaderMap,
    QueryParams(params): QueryParams<HashMap<String, String>>,
) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(TOKEN) {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "Invalid token"}))).into_response();
    }
    let Some(query) = params
        .get("query")
        .and_then(|q| serde_json::from_str::<Value>(q).ok())
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Missing query"}))).into_response();
    };

    match query["measures"][0].as_str().unwrap_or_default() {
        "orders.count" => Json(json!({
            "query": query,
            "data": [
                {"orders.status": "shipped", "orders.count": "42"},
                {"orders.status": "open", "orders.count": "1337"}
            ]
        }))
        .into_response(),
        "orders.broken" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Error: 'orders.broken' not found"})),
        )
            .into_response(),
        "orders.slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"data": []})).into_response()
        }
        _ => (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").into_response(),
    }
}

async fn spawn_stub() -> String {
    let app = Router::new().route("/cubejs-api/v1/load", get(load));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/cubejs-api/v1")
}

fn stub_client(base: &str, token: &str, timeout: Duration) -> CubeClient {
    let http = reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .unwrap();
    CubeClient::with_http(base, token, timeout, http)
}

fn measure(name: &str) -> Query {
    Query {
        measures: vec![name.to_string()],
        dimensions: vec!["orders.status".to_string()],
        ..Query::default()
    }
}

#[tokio::test]
async fn sends_encoded_query_and_token() {
    let base = spawn_stub().await;
    let client = stub_client(&format!("{base}/load"), TOKEN, Duration::from_secs(5));
    assert_eq!(client.load_url(), format!("{base}/load"));

    let raw = client.load(&measure("orders.count")).await.unwrap();
    assert_eq!(raw.status.as_u16(), 200);
    let echoed: Value = serde_json::from_str(&raw.body).unwrap();
    assert_eq!(
        echoed["query"],
        json!({"measures": ["orders.count"], "dimensions": ["orders.status"]})
    );

    let rows = LoadResponse::parse(&raw).unwrap().rows.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["orders.count"], "1337");
}

#[tokio::test]
async fn server_error_payload_is_reported() {
    let base = spawn_stub().await;
    let client = stub_client(&base, TOKEN, Duration::from_secs(5));
    let raw = client.load(&measure("orders.broken")).await.unwrap();
    assert_eq!(
        LoadResponse::parse(&raw),
        Err(LoadError::Server("Error: 'orders.broken' not found".into()))
    );

    let wrong_token = stub_client(&base, "nope", Duration::from_secs(5));
    let raw = wrong_token.load(&measure("orders.count")).await.unwrap();
    assert_eq!(
        LoadResponse::parse(&raw),
        Err(LoadError::Server("Invalid token".into()))
    );
}

#[tokio::test]
async fn harness_over_http_classifies_each_outcome() {
    let base = spawn_stub().await;
    let timeout = Duration::from_secs(1);
    let client = stub_client(&base, TOKEN, timeout);
    let cases = vec![
        TestCase::new("OK", "Orders by status", measure("orders.count")),
        TestCase::new("BROKEN", "Unknown measure", measure("orders.broken")),
        TestCase::new("SLOW", "Slow measure", measure("orders.slow")),
        TestCase::new("GATEWAY", "Proxy failure", measure("orders.gateway")),
    ];

    let mut harness = Harness::new(client, timeout);
    harness.run_all(&cases).await;
    let statuses: Vec<Status> = harness.results().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [Status::Passed, Status::Failed, Status::Timeout, Status::Error]
    );
    assert_eq!(
        harness.results()[3].error.as_deref(),
        Some("HTTP Error 502: Bad Gateway")
    );
    assert_eq!(harness.exit_code(), 1);
}

#[tokio::test]
async fn unreachable_host_is_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let timeout = Duration::from_secs(5);
    let client = stub_client(&format!("http://{addr}/cubejs-api/v1"), TOKEN, timeout);
    let mut harness = Harness::new(client, timeout);
    let record = harness
        .run_case(&TestCase::new("DOWN", "Server down", measure("orders.count")))
        .await;
    assert_eq!(record.status, Status::Error);
    assert!(record.error.is_some());
}

#[tokio::test]
async fn ad_hoc_query_prints_rows() {
    let base = spawn_stub().await;
    let client = stub_client(&base, TOKEN, Duration::from_secs(5));
    let args = QueryArgs {
        query: String::new(),
        sort_by: Some("orders.count".into()),
        totals: true,
    };
    assert_eq!(
        query_with(&client, &measure("orders.count"), &args).await.unwrap(),
        EXIT_SUCCESS
    );
    assert_eq!(
        query_with(&client, &measure("orders.broken"), &args).await.unwrap(),
        EXIT_FAILURE
    );
}
