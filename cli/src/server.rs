use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use glyco_core::error::StoreError;
use glyco_core::models::{GlucoseRecord, History, ReadingInput, Submission};
use glyco_core::service::GlucoseService;

const BODY_LIMIT: usize = 64 * 1024; // 64 KB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<GlucoseService>>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SaveReadingsRequest {
    fasting: Option<f64>,
    postprandial: Option<f64>,
    bedtime: Option<f64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Store errors carry a message that is safe to show; the source stays in the log.
        match err.downcast_ref::<StoreError>() {
            Some(store_err) => {
                error!("Storage error: {err:#}");
                Self::Unavailable(store_err.to_string())
            }
            None => Self::Internal(err),
        }
    }
}

fn parse_api_date(date_str: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn list_readings(State(state): State<AppState>) -> Result<Json<History>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let history = svc.history().context("database error")?;
    Ok(Json(history))
}

async fn get_readings(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<GlucoseRecord>, ApiError> {
    let date = parse_api_date(&date_str)?;

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let record = svc
        .day(date)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("No readings for {date_str}")))?;
    Ok(Json(record))
}

/// Overwrite the readings for one date, then answer with the saved record,
/// the confirmation message and the history as re-read after the write.
///
/// A failed re-read still answers 200: the write has committed, and the body
/// carries `history: null` with a `history_error`.
async fn save_readings(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Json(req): Json<SaveReadingsRequest>,
) -> Result<Json<Submission>, ApiError> {
    let date = parse_api_date(&date_str)?;
    let input = ReadingInput {
        date,
        fasting: req.fasting,
        postprandial: req.postprandial,
        bedtime: req.bedtime,
    };
    input
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let submission = svc.submit(&input).context("failed to save readings")?;
    Ok(Json(submission))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/readings", get(list_readings))
        .route("/api/readings/{date}", get(get_readings).put(save_readings))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(svc: GlucoseService, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
    };

    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        warn!(
            "Listening on {bind} with no authentication. Any device on your network can read and change your readings."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
