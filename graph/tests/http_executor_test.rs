use std::collections::HashMap;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Json, Router};
use graph::{GraphEndpoint, GraphScript, HttpGraphExecutor};
use ragraph_core::error::{ErrorCode, RagraphError};
use serde_json::json;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/openCypher")
}

fn script() -> GraphScript {
    GraphScript::new("MERGE (n:Person {name: 'Alice'});")
}

#[tokio::test]
async fn posts_script_as_form_and_returns_results() {
    let app = Router::new().route(
        "/openCypher",
        post(|Form(form): Form<HashMap<String, String>>| async move {
            Json(json!({ "results": [{ "echo": form.get("query").cloned().unwrap_or_default() }] }))
        }),
    );
    let endpoint = spawn(app).await;

    let executor = HttpGraphExecutor::new(Duration::from_secs(5)).unwrap();
    let results = executor.execute(&script(), &endpoint).await.unwrap();
    assert_eq!(results[0]["echo"], "MERGE (n:Person {name: 'Alice'});");
}

#[tokio::test]
async fn body_without_results_field_is_returned_whole() {
    let app = Router::new().route("/openCypher", post(|| async { Json(json!({ "ok": true })) }));
    let endpoint = spawn(app).await;

    let executor = HttpGraphExecutor::new(Duration::from_secs(5)).unwrap();
    let results = executor.execute(&script(), &endpoint).await.unwrap();
    assert_eq!(results, json!({ "ok": true }));
}

#[tokio::test]
async fn upstream_status_is_preserved() {
    let app = Router::new().route(
        "/openCypher",
        post(|| async { (StatusCode::BAD_REQUEST, "MalformedQueryException") }),
    );
    let endpoint = spawn(app).await;

    let executor = HttpGraphExecutor::new(Duration::from_secs(5)).unwrap();
    let err = executor.execute(&script(), &endpoint).await.unwrap_err();
    assert_eq!(err.status_code, 400);
    assert_eq!(err.detail, "MalformedQueryException");
    assert_eq!(RagraphError::status_code(&err), 400);
}

#[tokio::test]
async fn slow_endpoint_times_out_with_504() {
    let app = Router::new().route(
        "/openCypher",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "results": [] }))
        }),
    );
    let endpoint = spawn(app).await;

    let executor = HttpGraphExecutor::new(Duration::from_millis(100)).unwrap();
    let err = executor.execute(&script(), &endpoint).await.unwrap_err();
    assert_eq!(err.status_code, 504);
    assert_eq!(err.error_code(), ErrorCode::Timeout);
}

#[tokio::test]
async fn unreachable_endpoint_is_502() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let executor = HttpGraphExecutor::new(Duration::from_secs(2)).unwrap();
    let err = executor
        .execute(&script(), &format!("http://{addr}/openCypher"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code, 502);
}
