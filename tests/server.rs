mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use catalog_harvest::pipeline::Harvester;
use catalog_harvest::repository::{MemoryRepository, Repository};
use catalog_harvest::server::{router, AppState, Job};

use common::{catalog, config, EchoGenerator, BASE};

async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn state(tmp: &TempDir, repository: Arc<MemoryRepository>) -> AppState {
    let harvester = Harvester::new(config(tmp.path()), Arc::new(catalog()))
        .with_generator(Some(Arc::new(EchoGenerator)));
    AppState::new(Arc::new(harvester), repository)
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let base = serve(state(&tmp, Arc::new(MemoryRepository::new()))).await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_triggers_accept_immediately() {
    let tmp = TempDir::new().unwrap();
    let base = serve(state(&tmp, Arc::new(MemoryRepository::new()))).await;

    for route in [
        "scrape-new-data",
        "merge-all-products",
        "scrape-products-content",
        "scrape-data-to-json",
        "scrape-data-to-database",
    ] {
        let response = reqwest::get(format!("{base}/{route}")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"status": "accepted", "job": route}));
    }
}

#[tokio::test]
async fn test_jobs_run_to_completion() {
    let tmp = TempDir::new().unwrap();
    let repository = Arc::new(MemoryRepository::new());
    let state = state(&tmp, repository.clone());

    state.spawn(Job::FullCrawl).await.unwrap();
    state.spawn(Job::SyncToDatabase).await.unwrap();

    let saved = repository.find().await.unwrap();
    assert_eq!(saved.len(), 2);
    assert!(saved.iter().any(|e| e.url == format!("{BASE}/p/r2")));
}

#[tokio::test]
async fn test_query() {
    let tmp = TempDir::new().unwrap();
    let harvester = Arc::new(
        Harvester::new(config(tmp.path()), Arc::new(catalog()))
            .with_generator(Some(Arc::new(EchoGenerator))),
    );
    let base = serve(AppState::new(
        harvester.clone(),
        Arc::new(MemoryRepository::new()),
    ))
    .await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/query"))
        .json(&json!({"question": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let response = client
        .post(format!("{base}/query"))
        .json(&json!({"question": "router"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    harvester.run_full_crawl_and_retry_ladder().await.unwrap();
    harvester.build_vector_index().await.unwrap();

    let response = client
        .post(format!("{base}/query"))
        .json(&json!({"question": "pocket router"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["answer"]
        .as_str()
        .unwrap()
        .ends_with("Question: pocket router"));
    assert_eq!(body["sources"][0]["url"], format!("{BASE}/p/r2"));
}
