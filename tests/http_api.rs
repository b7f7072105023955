//! HTTP API tests: the router is served on an ephemeral port and driven
//! with a real client.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use common::*;
use ncm_search::config::ServerConfig;
use ncm_search::models::hash_text;
use ncm_search::search::SearchSettings;
use ncm_search::server::router;

const TOKEN: &str = "test-token-123";

async fn spawn_server() -> String {
    let store = embedded_store(&sample_entries()).await;
    let engine = Arc::new(engine_with(
        store,
        KeywordProvider::new(),
        SearchSettings::default(),
    ));
    let server = ServerConfig {
        api_token_sha256: vec![hash_text(TOKEN)],
        ..ServerConfig::default()
    };
    let app = router(engine, &server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let base = spawn_server().await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_search_requires_bearer_token() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ncm/search", base))
        .json(&json!({ "query": "laptop" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    let resp = client
        .post(format!("{}/ncm/search", base))
        .bearer_auth("wrong-token")
        .json(&json!({ "query": "laptop" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/ncm/8471.30.12", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_search_returns_ranked_results() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ncm/search", base))
        .bearer_auth(TOKEN)
        .json(&json!({ "query": "laptop", "limit": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["code"], "8471.30.12");
    assert_eq!(results[0]["matchType"], "semantic");
    assert!(results[0]["score"].as_f64().unwrap() > 0.5);
    assert!(results[0]["description"].is_string());
}

#[tokio::test]
async fn test_search_rejects_blank_query() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/ncm/search", base))
        .bearer_auth(TOKEN)
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/ncm/search", base))
        .bearer_auth(TOKEN)
        .header("content-type", "application/json")
        .body("{\"limit\": 3}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_get_entry_by_code() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/ncm/84713012", base))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "8471.30.12");
    assert_eq!(body["chapter"], "84");
    assert_eq!(body["section"], "XVI");

    let resp = client
        .get(format!("{}/ncm/9999.99.99", base))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .get(format!("{}/ncm/not-a-code", base))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
