//! HTTP front end: `POST /verify`, `GET /health`, `GET /attendance`.

use crate::engine::{EngineHandle, Verdict};
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the image.
const UPLOAD_FIELD: &str = "file";

/// Placeholder user shown by clients while nobody is recognised.
pub const SCANNING_USER: &str = "SCANNING...";
pub const EMPTY_REFERENCES_MESSAGE: &str = "Add photos to the reference images folder!";
/// Deliberately vague; the cause is only logged.
pub const PROCESSING_MESSAGE: &str = "Processing...";

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Success,
    Unknown,
    Error,
}

/// Body of every `/verify` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub status: VerifyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerifyResponse {
    fn success(user: String, confidence: f32) -> Self {
        Self {
            status: VerifyStatus::Success,
            user: Some(user),
            confidence: Some(confidence),
            message: None,
        }
    }

    fn unknown() -> Self {
        Self {
            status: VerifyStatus::Unknown,
            user: Some(SCANNING_USER.to_string()),
            confidence: None,
            message: None,
        }
    }

    fn error(message: &str) -> Self {
        Self {
            status: VerifyStatus::Error,
            user: None,
            confidence: None,
            message: Some(message.to_string()),
        }
    }
}

impl From<Verdict> for VerifyResponse {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Present {
                user, confidence, ..
            } => Self::success(user, confidence),
            Verdict::Unknown => Self::unknown(),
            Verdict::NoReferences => Self::error(EMPTY_REFERENCES_MESSAGE),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub references: usize,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    /// `YYYY-MM-DD`; defaults to today.
    pub date: Option<NaiveDate>,
}

/// Create the service router.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/verify", post(verify))
        .route("/health", get(health))
        .route("/attendance", get(attendance))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every outcome is reported with HTTP 200; clients poll on `status`.
async fn verify(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<VerifyResponse> {
    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await,
        Err(rejection) => {
            tracing::error!(error = %rejection, "verify: not a multipart request");
            return Json(VerifyResponse::error(PROCESSING_MESSAGE));
        }
    };

    let image = match upload {
        Ok(Some(image)) => image,
        Ok(None) => {
            tracing::error!(field = UPLOAD_FIELD, "verify: upload field missing");
            return Json(VerifyResponse::error(PROCESSING_MESSAGE));
        }
        Err(e) => {
            tracing::error!(error = %e, "verify: failed to read upload");
            return Json(VerifyResponse::error(PROCESSING_MESSAGE));
        }
    };

    match state.engine.verify(image).await {
        Ok(verdict) => Json(verdict.into()),
        Err(e) => {
            tracing::error!(error = %e, "verify failed");
            Json(VerifyResponse::error(PROCESSING_MESSAGE))
        }
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Option<Vec<u8>>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(Some(field.bytes().await?.to_vec()));
        }
    }
    Ok(None)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.reference_count().await {
        Ok(references) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                references,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health: engine unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    references: 0,
                }),
            )
        }
    }
}

async fn attendance(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> impl IntoResponse {
    let date = query.date.unwrap_or_else(rollcall_ledger::today);
    match state.engine.attendance(date).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, %date, "attendance: ledger read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerifyResponse::error(PROCESSING_MESSAGE)),
            )
                .into_response()
        }
    }
}
