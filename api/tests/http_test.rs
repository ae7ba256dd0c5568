use graph::{HttpGraphExecutor, MemoryGraphRegistry, RoutingGraphExecutor};
use ingestion::DeterministicEmbedder;
use llm::{InferenceConfig, ScriptedGenerator, TemplateSynthesizer};
use ragraph_api::ops::CreateVectorCollection;
use ragraph_api::{decode, make_router, AppState, Dispatcher, Envelope, Services};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use storage::InMemoryObjectStore;

async fn spawn_server() -> String {
    let services = Services::new(
        Arc::new(InMemoryObjectStore::new()),
        "catalog",
        Arc::new(DeterministicEmbedder::new(8)),
        Arc::new(ScriptedGenerator::default()),
        Arc::new(TemplateSynthesizer),
        Arc::new(RoutingGraphExecutor::new(
            HttpGraphExecutor::new(Duration::from_secs(1)).unwrap(),
            Arc::new(MemoryGraphRegistry::new()),
        )),
        InferenceConfig::default(),
    );
    let router = make_router(AppState::new(Dispatcher::new(services)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_check_answers_ok() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn http_status_mirrors_envelope_status() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/v1/createVectorCollection");
    let arguments = json!({ "arguments": { "collectionName": "manuals", "description": "docs" } });

    let response = client.post(&url).json(&arguments).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let payload: Value = response.json().await.unwrap();
    let body = decode::<CreateVectorCollection>(&payload).unwrap();
    assert_eq!(body.message, "Collection 'manuals' created successfully.");

    let response = client.post(&url).json(&arguments).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let payload: Value = response.json().await.unwrap();
    assert_eq!(Envelope::from_transport(&payload).unwrap().status_code, 409);
}

#[tokio::test]
async fn undecodable_request_body_is_an_error_envelope() {
    let base = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/v1/ragQuery"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let payload: Value = response.json().await.unwrap();
    let envelope = Envelope::from_transport(&payload).unwrap();
    assert_eq!(envelope.error_body().unwrap().code.to_string(), "INVALID_ARGUMENT");
}
