use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use garde::Validate;
use image::ImageFormat;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::api::{
    ApiResponse, AuthorParams, LikeResponse, PoetryForm, PoetryListParams, PoetryListResponse,
};
use crate::models::poetry::{
    normalize_tags, AuthorCount, NewPoetry, Pagination, PoetryPatch, PoetryQuery, PoetryRecord,
    PoetryStats,
};
use crate::models::user::{User, UserRole};
use crate::routes::auth::AuthUser;
use crate::services::poetry as records;
use crate::services::storage::upload_key;

const MAX_PAGE_SIZE: u32 = 100;
const TOP_AUTHORS: u32 = 50;

/// GET /api/poetry
pub async fn list_poetry(
    State(state): State<AppState>,
    Query(params): Query<PoetryListParams>,
) -> Result<Json<ApiResponse<PoetryListResponse>>, ApiError> {
    let defaults = PoetryQuery::default();
    let query = PoetryQuery {
        page: params.page.unwrap_or(defaults.page).max(1),
        limit: params.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        dynasty: non_blank(params.dynasty),
        author: non_blank(params.author),
        search: non_blank(params.search),
        sort_by: params.sort_by.unwrap_or(defaults.sort_by),
        sort_order: params.sort_order.unwrap_or(defaults.sort_order),
    };

    let page = state.poetry.list_poetry(&query).await?;
    Ok(Json(ApiResponse::ok(PoetryListResponse {
        poetries: page.items,
        pagination: Pagination::new(page.total, query.page, query.limit),
    })))
}

/// GET /api/poetry/stats
pub async fn poetry_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PoetryStats>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.poetry.poetry_stats().await?)))
}

/// GET /api/poetry/dynasties
pub async fn list_dynasties(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.poetry.list_dynasties().await?)))
}

/// GET /api/poetry/authors
pub async fn list_authors(
    State(state): State<AppState>,
    Query(params): Query<AuthorParams>,
) -> Result<Json<ApiResponse<Vec<AuthorCount>>>, ApiError> {
    let dynasty = non_blank(params.dynasty);
    let authors = state
        .poetry
        .list_authors(dynasty.as_deref(), TOP_AUTHORS)
        .await?;
    Ok(Json(ApiResponse::ok(authors)))
}

/// GET /api/poetry/{id} — also counts a view.
pub async fn get_poetry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PoetryRecord>>, ApiError> {
    let record = state
        .poetry
        .record_view(id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(ApiResponse::ok(record)))
}

/// POST /api/poetry (multipart)
pub async fn create_poetry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<PoetryRecord>>), ApiError> {
    let submission = read_submission(&state, multipart).await?;
    let form = submission.form;
    let (Some(title), Some(content), Some(author), Some(dynasty)) =
        (form.title, form.content, form.author, form.dynasty)
    else {
        return Err(ApiError::BadRequest(
            "title, content, author and dynasty are required".to_string(),
        ));
    };

    let images = store_uploads(&state, submission.uploads).await?;
    let new = NewPoetry {
        title,
        author,
        dynasty,
        content,
        tags: form.tags.unwrap_or_default(),
        images: images.clone(),
        created_by: user.id,
    };

    let record = match records::create_poetry(state.poetry.as_ref(), &state.enrichment, new).await
    {
        Ok(record) => record,
        Err(e) => {
            discard_uploads(&state, &images).await;
            return Err(e.into());
        }
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("poem created", record)),
    ))
}

/// PUT /api/poetry/{id} (multipart, owner or admin)
pub async fn update_poetry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<PoetryRecord>>, ApiError> {
    let existing = state.poetry.find_poetry(id).await?.ok_or_else(not_found)?;
    ensure_can_modify(&user, &existing)?;

    let submission = read_submission(&state, multipart).await?;
    let form = submission.form;
    let mut patch = PoetryPatch {
        title: form.title,
        author: form.author,
        dynasty: form.dynasty,
        content: form.content,
        tags: form.tags,
        images: None,
    };
    if patch.is_empty() && submission.uploads.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }

    let images = store_uploads(&state, submission.uploads).await?;
    if !images.is_empty() {
        patch.images = Some(images.clone());
    }

    let updated = match records::update_poetry(state.poetry.as_ref(), &state.enrichment, id, patch)
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => {
            discard_uploads(&state, &images).await;
            return Err(not_found());
        }
        Err(e) => {
            discard_uploads(&state, &images).await;
            return Err(e.into());
        }
    };
    Ok(Json(ApiResponse::with_message("poem updated", updated)))
}

/// DELETE /api/poetry/{id} (owner or admin)
pub async fn delete_poetry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let existing = state.poetry.find_poetry(id).await?.ok_or_else(not_found)?;
    ensure_can_modify(&user, &existing)?;

    if !state.poetry.delete_poetry(id).await? {
        return Err(not_found());
    }
    tracing::info!(poetry_id = %id, user_id = %user.id, "Poem deleted");
    Ok(Json(ApiResponse::message("poem deleted")))
}

/// POST /api/poetry/{id}/like
pub async fn like_poetry(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LikeResponse>>, ApiError> {
    let like_count = state.poetry.record_like(id).await?.ok_or_else(not_found)?;
    Ok(Json(ApiResponse::ok(LikeResponse { like_count })))
}

fn not_found() -> ApiError {
    ApiError::NotFound("poem not found".to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn ensure_can_modify(user: &User, poetry: &PoetryRecord) -> Result<(), ApiError> {
    if user.role == UserRole::Admin || poetry.created_by == Some(user.id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "only the author or an admin may change this poem".to_string(),
        ))
    }
}

/// An image accepted from the form but not yet stored.
struct Upload {
    data: Vec<u8>,
    format: ImageFormat,
}

struct Submission {
    form: PoetryForm,
    uploads: Vec<Upload>,
}

/// Collect text fields and image files from a poem form. Text is trimmed
/// and validated; images are size-checked and sniffed, not stored.
async fn read_submission(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<Submission, ApiError> {
    let limits = state.uploads;
    let mut form = PoetryForm::default();
    let mut raw_tags: Vec<String> = Vec::new();
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" | "images[]" => {
                let data = field.bytes().await?;
                if data.is_empty() {
                    continue;
                }
                if uploads.len() >= limits.max_files {
                    return Err(ApiError::BadRequest(format!(
                        "at most {} images per poem",
                        limits.max_files
                    )));
                }
                if data.len() > limits.max_file_size {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "image exceeds {} bytes",
                        limits.max_file_size
                    )));
                }
                let format = sniff_image(&data)?;
                uploads.push(Upload {
                    data: data.to_vec(),
                    format,
                });
            }
            "title" => form.title = Some(field.text().await?.trim().to_string()),
            "content" => form.content = Some(field.text().await?.trim().to_string()),
            "author" => form.author = Some(field.text().await?.trim().to_string()),
            "dynasty" => form.dynasty = Some(field.text().await?.trim().to_string()),
            "tags" | "tags[]" => raw_tags.push(field.text().await?),
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    if !raw_tags.is_empty() {
        form.tags = Some(normalize_tags(raw_tags));
    }
    form.validate()?;
    Ok(Submission { form, uploads })
}

fn sniff_image(data: &[u8]) -> Result<ImageFormat, ApiError> {
    match image::guess_format(data) {
        Ok(
            format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP),
        ) => Ok(format),
        _ => Err(ApiError::UnsupportedMediaType(
            "only jpeg, png, gif and webp images are accepted".to_string(),
        )),
    }
}

async fn store_uploads(state: &AppState, uploads: Vec<Upload>) -> Result<Vec<String>, ApiError> {
    let mut references = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let extension = upload
            .format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("bin");
        let key = upload_key(Utc::now(), extension);
        match state
            .images
            .put(&key, &upload.data, upload.format.to_mime_type())
            .await
        {
            Ok(reference) => references.push(reference),
            Err(e) => {
                discard_uploads(state, &references).await;
                return Err(e.into());
            }
        }
    }
    Ok(references)
}

async fn discard_uploads(state: &AppState, references: &[String]) {
    for reference in references {
        if let Err(e) = state.images.delete(reference).await {
            tracing::warn!(image = %reference, error = %e, "Failed to delete unused upload");
        }
    }
}
