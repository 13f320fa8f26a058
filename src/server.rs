//! HTTP trigger surface.
//!
//! Thin shims over [`Harvester`]: each trigger route starts one pipeline
//! stage in the background and answers `202 Accepted` straight away. Stage
//! outcomes only show up in the logs and the persisted artifacts. Jobs are
//! serialized through a single lock, so two triggers never run stages
//! concurrently.
//!
//! # Endpoints
//!
//! | Method | Path | Stage |
//! |--------|------|-------|
//! | `POST` | `/query` | answer a question (synchronous) |
//! | `GET`  | `/scrape-data-to-json` | full crawl and retry ladder |
//! | `GET`  | `/scrape-data-to-database` | sync canonical records to the repository |
//! | `GET`  | `/scrape-new-data` | category → product discovery |
//! | `GET`  | `/merge-all-products` | merge the catalog tree into a flat list |
//! | `GET`  | `/scrape-products-content` | fetch internal document content |
//! | `GET`  | `/health` | health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::Harvester;
use crate::repository::Repository;
use crate::retrieval::Answer;

/// A background pipeline stage started by a trigger route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    FullCrawl,
    SyncToDatabase,
    DiscoverCatalog,
    MergeProducts,
    EnrichContent,
}

impl Job {
    pub fn name(self) -> &'static str {
        match self {
            Job::FullCrawl => "scrape-data-to-json",
            Job::SyncToDatabase => "scrape-data-to-database",
            Job::DiscoverCatalog => "scrape-new-data",
            Job::MergeProducts => "merge-all-products",
            Job::EnrichContent => "scrape-products-content",
        }
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    harvester: Arc<Harvester>,
    repository: Arc<dyn Repository>,
    jobs: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(harvester: Arc<Harvester>, repository: Arc<dyn Repository>) -> Self {
        Self {
            harvester,
            repository,
            jobs: Arc::new(Mutex::new(())),
        }
    }

    /// Start `job` behind the job lock and return immediately.
    pub fn spawn(&self, job: Job) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let _guard = state.jobs.lock().await;
            tracing::info!(job = job.name(), "Job started");
            match state.run(job).await {
                Ok(()) => tracing::info!(job = job.name(), "Job finished"),
                Err(e) => tracing::error!(job = job.name(), error = %format!("{e:#}"), "Job failed"),
            }
        })
    }

    async fn run(&self, job: Job) -> anyhow::Result<()> {
        let harvester = &self.harvester;
        match job {
            Job::FullCrawl => {
                let summary = harvester.run_full_crawl_and_retry_ladder().await?;
                tracing::info!(
                    products = summary.products,
                    extracted = summary.ladder.extracted(),
                    remaining = summary.ladder.remaining,
                    "Crawl summary"
                );
            }
            Job::SyncToDatabase => {
                let ok = harvester
                    .sync_json_store_to_repository(self.repository.as_ref())
                    .await?;
                if !ok {
                    anyhow::bail!("some records failed to save");
                }
            }
            Job::DiscoverCatalog => {
                let tree = harvester.run_category_product_discovery().await?;
                tracing::info!(categories = tree.len(), "Catalog tree written");
            }
            Job::MergeProducts => {
                harvester.merge_category_products_to_flat_list()?;
            }
            Job::EnrichContent => {
                let summary = harvester.enrich_internal_links_with_content().await?;
                tracing::info!(
                    documents = summary.documents,
                    skipped = summary.skipped,
                    "Internal content written"
                );
            }
        }
        Ok(())
    }
}

/// The full route table, with CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/scrape-data-to-json", get(trigger_full_crawl))
        .route("/scrape-data-to-database", get(trigger_sync))
        .route("/scrape-new-data", get(trigger_discovery))
        .route("/merge-all-products", get(trigger_merge))
        .route("/scrape-products-content", get(trigger_enrich))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    println!("Harvest server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn classify_answer_error(err: anyhow::Error) -> AppError {
    let message = format!("{err:#}");
    if message.contains("No vector index") {
        AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message,
        }
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Answer>, AppError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let answer = state
        .harvester
        .answer(question)
        .await
        .map_err(classify_answer_error)?;
    Ok(Json(answer))
}

// ============ Triggers ============

#[derive(Serialize)]
struct Accepted {
    status: &'static str,
    job: &'static str,
}

fn accept(state: &AppState, job: Job) -> (StatusCode, Json<Accepted>) {
    state.spawn(job);
    (
        StatusCode::ACCEPTED,
        Json(Accepted {
            status: "accepted",
            job: job.name(),
        }),
    )
}

async fn trigger_full_crawl(State(state): State<AppState>) -> impl IntoResponse {
    accept(&state, Job::FullCrawl)
}

async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    accept(&state, Job::SyncToDatabase)
}

async fn trigger_discovery(State(state): State<AppState>) -> impl IntoResponse {
    accept(&state, Job::DiscoverCatalog)
}

async fn trigger_merge(State(state): State<AppState>) -> impl IntoResponse {
    accept(&state, Job::MergeProducts)
}

async fn trigger_enrich(State(state): State<AppState>) -> impl IntoResponse {
    accept(&state, Job::EnrichContent)
}
