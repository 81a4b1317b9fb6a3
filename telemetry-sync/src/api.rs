//! HTTP surface over the reconciler.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::SyncError,
    reconcile::{DeleteReport, ReadingsReport, Reconciler, SyncReport},
};

#[derive(Clone)]
pub struct ApiState {
    pub reconciler: Arc<Reconciler>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing or invalid token")
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::MissingDatabase(_) => StatusCode::BAD_REQUEST,
            SyncError::BuildingNotFound(_) | SyncError::UnitNotFound(_) | SyncError::MeterNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            SyncError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, status = %status, "request failed");
        }
        let message = match &err {
            SyncError::Store(_) => "database error".to_string(),
            other => other.to_string(),
        };
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct FetchParams {
    #[serde(default)]
    with_readings: bool,
}

pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/buildings/:id/fetch_units", post(fetch_units))
        .route("/buildings/:id/reload_units", post(reload_units))
        .route("/buildings/:id/units", delete(delete_units))
        .route("/meters/:id/sync_readings", post(sync_meter_readings))
        .route("/units/:id/sync_readings", post(sync_unit_readings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn require_bearer(State(state): State<ApiState>, req: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(expected) = state.auth_token.as_deref() {
        let presented = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        if presented != Some(expected) {
            metrics::counter!("http_unauthorized_total").increment(1);
            return Err(ApiError::unauthorized());
        }
    }
    Ok(next.run(req).await)
}

async fn health() -> &'static str {
    "ok"
}

async fn fetch_units(
    State(state): State<ApiState>,
    Path(building_id): Path<Uuid>,
    Query(params): Query<FetchParams>,
) -> ApiResult<SyncReport> {
    let report = state.reconciler.fetch_units(building_id, params.with_readings).await?;
    Ok(Json(report))
}

async fn reload_units(State(state): State<ApiState>, Path(building_id): Path<Uuid>) -> ApiResult<SyncReport> {
    Ok(Json(state.reconciler.reload_units(building_id).await?))
}

async fn delete_units(State(state): State<ApiState>, Path(building_id): Path<Uuid>) -> ApiResult<DeleteReport> {
    Ok(Json(state.reconciler.delete_units(building_id).await?))
}

async fn sync_meter_readings(State(state): State<ApiState>, Path(meter_id): Path<Uuid>) -> ApiResult<ReadingsReport> {
    Ok(Json(state.reconciler.sync_meter_readings(meter_id).await?))
}

async fn sync_unit_readings(State(state): State<ApiState>, Path(unit_id): Path<Uuid>) -> ApiResult<ReadingsReport> {
    Ok(Json(state.reconciler.sync_unit_readings(unit_id).await?))
}
