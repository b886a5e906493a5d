use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::api::ApiResponse;
use crate::models::enrichment::EnrichmentStatus;
use crate::routes::auth::AuthUser;

/// POST /api/ai/verify/{id} — reset and re-queue text verification.
pub async fn retry_verify(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    state.enrichment.retry_verify(id).await?;
    tracing::info!(poetry_id = %id, user_id = %user.id, "Manual verification queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::message("verification started")),
    ))
}

/// POST /api/ai/generate-image/{id} — reset and re-queue artwork generation.
pub async fn retry_generate_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ApiError> {
    state.enrichment.retry_generate_image(id).await?;
    tracing::info!(poetry_id = %id, user_id = %user.id, "Manual image generation queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::message("image generation started")),
    ))
}

/// GET /api/ai/status/{id}
pub async fn enrichment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<EnrichmentStatus>>, ApiError> {
    let status = state
        .enrichment
        .enrichment_status(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("poem not found".to_string()))?;
    Ok(Json(ApiResponse::ok(status)))
}
