//! HTTP surface: edge identification endpoints plus the staff customer CRUD
//! the dashboard consumes.
//!
//! Every route sits behind the shared-key check; a missing or wrong
//! `X-API-Key` is rejected before any matching runs.

use crate::service::{IdentifyError, IdentityService, VisitorMeta};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clientbridge_core::{CustomerRecord, Embedding, Flag, MatcherError};
use clientbridge_store::{CustomerRepository, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IdentityService>,
    pub api_key: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/edge/health", get(health))
        .route("/api/edge/identify", post(identify))
        .route("/api/customers", get(list_customers))
        .route("/api/customers/:id/flag", post(set_flag))
        .route("/api/customers/:id", delete(delete_customer))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

/// Shared-key authentication. A single static key identifies edge devices
/// and dashboard callers; there is no per-user identity at this layer.
async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    match presented {
        Some(key) if key == state.api_key => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized),
    }
}

enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound,
    StoreUnavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid or missing API key".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "customer not found".to_string()),
            ApiError::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

impl From<IdentifyError> for ApiError {
    fn from(err: IdentifyError) -> Self {
        match err {
            IdentifyError::Matcher(e @ MatcherError::DimensionMismatch { .. }) => {
                ApiError::BadRequest(e.to_string())
            }
            IdentifyError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::Unavailable(e) => {
                tracing::error!(error = %e, "store unavailable");
                ApiError::StoreUnavailable("store unavailable, retry the request".to_string())
            }
            StoreError::CorruptRecord { .. } => {
                tracing::error!(error = %err, "corrupt customer record");
                ApiError::Internal("corrupt customer record".to_string())
            }
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyRequest {
    embedding: Embedding,
    location_id: i64,
    face_id: Option<String>,
    name: Option<String>,
    image_base64: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyResponse {
    success: bool,
    status: &'static str,
    customer_id: String,
    visit_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f32>,
}

async fn identify(
    State(state): State<AppState>,
    Json(req): Json<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>, ApiError> {
    let outcome = state
        .service
        .identify(
            req.location_id,
            req.embedding,
            VisitorMeta {
                face_id: req.face_id,
                name: req.name,
                image_base64: req.image_base64,
            },
        )
        .await?;

    Ok(Json(IdentifyResponse {
        success: true,
        status: match outcome.status {
            crate::service::VisitStatus::New => "new",
            crate::service::VisitStatus::Returning => "returning",
        },
        customer_id: outcome.customer_id,
        visit_count: outcome.visit_count,
        similarity: outcome.similarity,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    location_id: i64,
}

/// Customer view for the dashboard: everything except the raw embedding.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerView {
    id: String,
    location_id: i64,
    face_id: Option<String>,
    visit_count: i64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    flag: Flag,
    name: Option<String>,
    photo_url: Option<String>,
}

impl From<CustomerRecord> for CustomerView {
    fn from(r: CustomerRecord) -> Self {
        Self {
            id: r.id,
            location_id: r.location_id,
            face_id: r.face_id,
            visit_count: r.visit_count,
            first_seen: r.first_seen,
            last_seen: r.last_seen,
            flag: r.flag,
            name: r.name,
            photo_url: r.photo_url,
        }
    }
}

async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let customers: Vec<CustomerView> = state
        .service
        .repo()
        .list_by_location(query.location_id)
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(CustomerView::from)
        .collect();

    Ok(Json(json!({ "success": true, "customers": customers })))
}

#[derive(Deserialize)]
struct FlagRequest {
    flag: String,
}

async fn set_flag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FlagRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let flag = Flag::parse(&req.flag).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "invalid flag {:?}; expected one of red, yellow, green, none",
            req.flag
        ))
    })?;

    state.service.repo().set_flag(&id, flag).await.map_err(ApiError::from)?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service.repo().delete(&id).await.map_err(ApiError::from)?;
    Ok(Json(json!({ "success": true })))
}
