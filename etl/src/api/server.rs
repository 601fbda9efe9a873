//! HTTP server for listings-etl.
//!
//! Every request builds its own pipeline and logger; the only shared state is
//! the log broadcaster and the configuration.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/steps`      | Transform steps, in order            |
//! | POST   | `/api/transform`  | Transform a JSON array of documents  |
//! | POST   | `/api/upload`     | Upload CSV for transformation        |
//! | GET    | `/api/runs`       | Recorded ETL runs                    |
//! | GET    | `/api/runs/{id}`  | One recorded run                     |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::types::{error_response, CsvMetadata, StepInfo, TransformResponse};
use crate::config::EtlConfig;
use crate::error::ServerResult;
use crate::logs::{LogBroadcaster, RunLogger};
use crate::parser::parse_bytes_auto;
use crate::runs::{RunRecord, RunRegistry};
use crate::transform::TransformPipeline;

type ApiError = (StatusCode, Json<Value>);

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: EtlConfig,
    pub broadcaster: LogBroadcaster,
}

impl AppState {
    pub fn new(config: EtlConfig) -> Self {
        Self {
            config,
            broadcaster: LogBroadcaster::new(),
        }
    }

    /// Logger for one request: log file plus live broadcast.
    ///
    /// Falls back to broadcast only when the log directory is not writable.
    fn request_logger(&self) -> RunLogger {
        let run_id = format!("{}_{}", RunLogger::new_run_id(), &Uuid::new_v4().simple().to_string()[..8]);
        RunLogger::with_file("api", run_id.clone(), &self.config.log_dir, Some(self.broadcaster.clone()))
            .unwrap_or_else(|e| {
                tracing::warn!("Cannot open run log in {}: {}", self.config.log_dir.display(), e);
                RunLogger::with_broadcaster("api", run_id, self.broadcaster.clone())
            })
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/steps", get(list_steps))
        .route("/api/transform", post(transform_documents))
        .route("/api/upload", post(upload_csv))
        .route("/api/runs", get(list_runs))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, config: EtlConfig) -> ServerResult<()> {
    let app = router(AppState::new(config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listings-etl server running on http://localhost:{}", port);
    tracing::info!("POST /api/transform - Transform JSON documents");
    tracing::info!("POST /api/upload    - Upload CSV file");
    tracing::info!("GET  /api/logs      - SSE log stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "listings-etl",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "steps": "GET /api/steps",
            "transform": "POST /api/transform",
            "upload": "POST /api/upload",
            "runs": "GET /api/runs",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn list_steps() -> Json<Vec<StepInfo>> {
    Json(StepInfo::all())
}

/// SSE endpoint for real-time log streaming
async fn sse_logs(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Transform a JSON array of documents
async fn transform_documents(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<TransformResponse>, ApiError> {
    let documents = body
        .as_array()
        .ok_or_else(|| bad_request("Expected a JSON array of documents"))?;

    let logger = state.request_logger();
    logger.info(format!("Received {} documents", documents.len()));

    let mut pipeline = TransformPipeline::from_documents(documents, &logger).map_err(|e| {
        logger.error(format!("Invalid input: {}", e));
        bad_request(&e.to_string())
    })?;
    pipeline.run();

    Ok(Json(TransformResponse::from_pipeline(logger.run_id(), &pipeline, None)))
}

/// Upload CSV endpoint
async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TransformResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&format!("Read error: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided"))?;

    let logger = state.request_logger();
    logger.info(format!(
        "Upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let parsed = parse_bytes_auto(&bytes).map_err(|e| {
        logger.error(format!("CSV error: {}", e));
        bad_request(&e.to_string())
    })?;
    logger.success(format!(
        "Read {} rows (encoding {}, separator '{}')",
        parsed.dataset.len(),
        parsed.encoding,
        parsed.delimiter.escape_default()
    ));

    let csv_info = CsvMetadata::new(&parsed, file_name);
    let mut pipeline = TransformPipeline::new(parsed.dataset, &logger);
    pipeline.run();

    Ok(Json(TransformResponse::from_pipeline(logger.run_id(), &pipeline, Some(csv_info))))
}

/// Recorded runs, most recent first
async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunRecord>> {
    let registry = RunRegistry::with_dir(&state.config.runs_dir);
    Json(registry.list().into_iter().cloned().collect())
}

async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<RunRecord>, ApiError> {
    let registry = RunRegistry::with_dir(&state.config.runs_dir);
    registry
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(error_response(&format!("Run not found: {}", id)))))
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn spawn(config: EtlConfig) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(AppState::new(config))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(root: &std::path::Path) -> EtlConfig {
        EtlConfig {
            log_dir: root.join("logs"),
            runs_dir: root.join("runs"),
            ..EtlConfig::default()
        }
    }

    #[tokio::test]
    async fn test_health_and_steps() {
        let dir = tempdir().unwrap();
        let url = spawn(config(dir.path())).await;

        let health: Value = reqwest::get(format!("{}/health", url)).await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "ok");

        let steps: Vec<StepInfo> = reqwest::get(format!("{}/api/steps", url)).await.unwrap().json().await.unwrap();
        assert_eq!(steps.len(), 6);
    }

    #[tokio::test]
    async fn test_transform_documents() {
        let dir = tempdir().unwrap();
        let url = spawn(config(dir.path())).await;

        let body = json!([
            {"price": "$1,200", "amenities": "{\"Wifi\",\"Kitchen\"}"},
            {"price": "850", "amenities": "{\"Wifi\"}"},
            {"price": "850", "amenities": "{\"Wifi\"}"}
        ]);
        let response = reqwest::Client::new()
            .post(format!("{}/api/transform", url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let result: TransformResponse = response.json().await.unwrap();
        assert_eq!(result.metadata.input_rows, 3);
        assert_eq!(result.metadata.output_rows, 2);
        assert_eq!(result.documents[1]["amenity_kitchen"], 0);

        // The request logged to its own file
        let log = dir.path().join("logs").join(format!("log_{}.log", result.run_id));
        assert!(std::fs::read_to_string(log).unwrap().contains("Cleanup: 3 => 2"));
    }

    #[tokio::test]
    async fn test_transform_rejects_invalid_documents() {
        let dir = tempdir().unwrap();
        let url = spawn(config(dir.path())).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/transform", url))
            .json(&json!([{"price": 1}, "oops"]))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let response = client
            .post(format!("{}/api/transform", url))
            .json(&json!({"price": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_upload_csv() {
        let dir = tempdir().unwrap();
        let url = spawn(config(dir.path())).await;

        let boundary = "listings-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"listado.csv\"\r\n\
             Content-Type: text/csv\r\n\r\nname;price\nLoft;$1.200\nCabin;$85\nCabin;$85\n\r\n--{b}--\r\n",
            b = boundary
        );
        let response = reqwest::Client::new()
            .post(format!("{}/api/upload", url))
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let result: TransformResponse = response.json().await.unwrap();
        let csv_info = result.metadata.csv_info.unwrap();
        assert_eq!(csv_info.file_name.as_deref(), Some("listado.csv"));
        assert_eq!(csv_info.delimiter, ";");
        assert_eq!(result.metadata.input_rows, 3);
        assert_eq!(result.metadata.output_rows, 2);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let dir = tempdir().unwrap();
        let url = spawn(config(dir.path())).await;

        let boundary = "listings-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{b}--\r\n",
            b = boundary
        );
        let response = reqwest::Client::new()
            .post(format!("{}/api/upload", url))
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let dir = tempdir().unwrap();
        let url = spawn(config(dir.path())).await;

        let runs: Vec<Value> = reqwest::get(format!("{}/api/runs", url)).await.unwrap().json().await.unwrap();
        assert!(runs.is_empty());

        let response = reqwest::get(format!("{}/api/runs/nope", url)).await.unwrap();
        assert_eq!(response.status(), 404);
    }
}
