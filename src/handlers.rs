use crate::config::Config;
use crate::db_storage::ReportStorage;
use crate::errors::AppError;
use crate::extraction::extract_credit_report;
use crate::models::*;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use moka::future::Cache;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Report persistence.
    pub storage: ReportStorage,
    /// Reports recently read or written by id (5 minute TTL).
    pub report_cache: Cache<Uuid, StoredReport>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let report_cache = Cache::builder()
            .time_to_live(Duration::from_secs(300))
            .max_capacity(1_000)
            .build();

        Self {
            storage: ReportStorage::new(db),
            config,
            report_cache,
        }
    }
}

/// Request body limit for the report routes, given the file size limit.
pub fn upload_body_limit(max_file_size: usize) -> usize {
    max_file_size.saturating_add(MULTIPART_OVERHEAD)
}

/// Report and documentation routes.
///
/// Returned without state so the caller can add its own layers (rate
/// limiting) before merging into [`build_app`].
pub fn report_routes(max_file_size: usize) -> Router<Arc<AppState>> {
    Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        // Report endpoints
        .route("/api/reports", get(list_reports))
        .route("/api/reports/upload", post(upload_report))
        .route("/api/reports/stats/overview", get(report_stats))
        .route("/api/reports/search/pan/:pan", get(search_by_pan))
        .route("/api/reports/search/phone/:phone", get(search_by_phone))
        .route("/api/reports/:id", get(get_report).delete(delete_report))
        .layer(DefaultBodyLimit::max(upload_body_limit(max_file_size)))
}

/// Final application: health check, the given report routes, fallback,
/// request tracing and CORS.
pub fn build_app(state: Arc<AppState>, report_routes: Router<Arc<AppState>>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health))
        .merge(report_routes)
        .fallback(route_not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS restricted to the configured dashboard origins.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Health check endpoint.
///
/// Returns the service status, version, and current time.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "service": "credit-report-api",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Fallback for unknown routes.
pub async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

/// Serves the OpenAPI specification YAML file.
///
/// Reads `openapi.yml` from the working directory; 404 if it is missing.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Serves the Swagger UI HTML page pointing at [`serve_openapi_spec`].
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Credit Report API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// The `file` part of an upload form.
struct Upload {
    file_name: String,
    bytes: Bytes,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File exceeds the maximum upload size".to_string())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some(Upload { file_name, bytes }));
    }
    Ok(None)
}

pub fn is_xml_file_name(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".xml")
}

fn parse_report_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid report id: {}", raw)))
}

/// POST /api/reports/upload
///
/// Accepts a multipart form with an XML report in the `file` field,
/// extracts it and stores the result.
///
/// # Returns
///
/// * `201` with the stored report, `400` for a missing or non-XML file,
///   `413` when the file is too large, `422` when the XML cannot be decoded
///   or the report has no holder name.
pub async fn upload_report(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<StoredReport>>), AppError> {
    let upload = read_upload(&mut multipart)
        .await?
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    if !is_xml_file_name(&upload.file_name) {
        return Err(AppError::BadRequest(
            "Only XML files are allowed".to_string(),
        ));
    }
    if upload.bytes.len() > state.config.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the maximum upload size of {} bytes",
            state.config.max_file_size
        )));
    }

    let content_sha256 = hex::encode(Sha256::digest(&upload.bytes));
    tracing::info!(
        "POST /reports/upload - {} ({} bytes, sha256 {})",
        upload.file_name,
        upload.bytes.len(),
        content_sha256
    );

    let record = tokio::task::spawn_blocking(move || {
        extract_credit_report(&upload.bytes, &upload.file_name)
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Extraction task failed: {}", e)))??;

    if !record.degraded_sections.is_empty() {
        tracing::warn!(
            "Report {} stored with defaulted sections: {:?}",
            record.source_file_name,
            record.degraded_sections
        );
    }

    let stored = state.storage.insert(&record, &content_sha256).await?;
    state.report_cache.insert(stored.id, stored.clone()).await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Report uploaded and processed successfully",
            stored,
        )),
    ))
}

/// GET /api/reports
///
/// Most recent reports, newest first, capped by `REPORT_LIST_LIMIT`.
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StoredReport>>>, AppError> {
    let reports = state
        .storage
        .list_recent(state.config.report_list_limit)
        .await?;
    tracing::debug!("GET /reports - {} reports", reports.len());
    Ok(Json(ApiResponse::list(reports)))
}

/// GET /api/reports/:id
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StoredReport>>, AppError> {
    let id = parse_report_id(&id)?;

    if let Some(cached) = state.report_cache.get(&id).await {
        tracing::debug!("GET /reports/{} - cache hit", id);
        return Ok(Json(ApiResponse::data(cached)));
    }

    let report = state
        .storage
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;
    state.report_cache.insert(id, report.clone()).await;

    Ok(Json(ApiResponse::data(report)))
}

/// GET /api/reports/search/pan/:pan
pub async fn search_by_pan(
    State(state): State<Arc<AppState>>,
    Path(pan): Path<String>,
) -> Result<Json<ApiResponse<StoredReport>>, AppError> {
    let report = state
        .storage
        .find_latest_by_pan(&pan)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found for given PAN".to_string()))?;
    Ok(Json(ApiResponse::data(report)))
}

/// GET /api/reports/search/phone/:phone
pub async fn search_by_phone(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> Result<Json<ApiResponse<StoredReport>>, AppError> {
    let report = state
        .storage
        .find_latest_by_phone(&phone)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Report not found for given phone number".to_string())
        })?;
    Ok(Json(ApiResponse::data(report)))
}

/// GET /api/reports/stats/overview
pub async fn report_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ReportStats>>, AppError> {
    let stats = state.storage.stats().await?;
    Ok(Json(ApiResponse::data(stats)))
}

/// DELETE /api/reports/:id
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StoredReport>>, AppError> {
    let id = parse_report_id(&id)?;

    let report = state
        .storage
        .delete(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;
    state.report_cache.invalidate(&id).await;

    Ok(Json(ApiResponse::with_message(
        "Report deleted successfully",
        report,
    )))
}
