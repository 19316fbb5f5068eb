use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::{
    AppState, audit,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{
        ContentItem, ContentKind, ContentStatus, CreateContentRequest, MediaUploadRequest,
        MediaUploadResponse, Page, UpdateContentRequest,
    },
    pagination::{PageParams, PageRequest},
    rbac::{Action, Resource},
    repository::ContentFilter,
    sanitize,
    storage::{is_allowed_media_type, media_key_for},
};

/// ContentQuery
///
/// Filters of `GET /admin/content`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ContentQuery {
    pub status: Option<ContentStatus>,
    pub kind: Option<ContentKind>,
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive match on title or summary.
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/content",
    params(ContentQuery, PageParams),
    responses(
        (status = 200, description = "One page of content, newest first", body = Page<ContentItem>),
        (status = 400, description = "Unknown cursor")
    )
)]
pub async fn list_content(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<ContentItem>>> {
    state
        .access
        .require_permission(&user, Resource::Content, Action::Read)
        .await?;

    let filter = ContentFilter {
        status: query.status,
        kind: query.kind,
        category: query
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty()),
        tag: query
            .tag
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty()),
        search: sanitize::search_term(query.search),
    };
    let page = state
        .repo
        .list_content(&filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/admin/content/{id}",
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 200, description = "Content item", body = ContentItem),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_content(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContentItem>> {
    state
        .access
        .require_permission(&user, Resource::Content, Action::Read)
        .await?;
    let item = state
        .repo
        .get_content(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("content"))?;
    Ok(Json(item))
}

/// create_content
///
/// New items always start as drafts authored by the caller.
#[utoipa::path(
    post,
    path = "/admin/content",
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Created", body = ContentItem),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn create_content(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateContentRequest>,
) -> ApiResult<(StatusCode, Json<ContentItem>)> {
    state
        .access
        .require_permission(&user, Resource::Content, Action::Create)
        .await?;

    let item = sanitize::new_content(payload, &user.id, Utc::now())?;
    let created = state.repo.create_content(item).await?;

    audit::record(
        &state,
        &user,
        "content.create",
        Resource::Content,
        Some(&created.id),
        json!({ "title": created.title, "kind": created.kind }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// update_content
///
/// Partial update. Moving an item to `published` for the first time stamps
/// `published_at`; later transitions keep the original date.
#[utoipa::path(
    patch,
    path = "/admin/content/{id}",
    params(("id" = String, Path, description = "Content id")),
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Updated", body = ContentItem),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn update_content(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateContentRequest>,
) -> ApiResult<Json<ContentItem>> {
    state
        .access
        .require_permission(&user, Resource::Content, Action::Update)
        .await?;

    let existing = state
        .repo
        .get_content(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("content"))?;
    let patch = sanitize::content_patch(payload, &existing, Utc::now())?;
    let status_change = patch.status.filter(|s| *s != existing.status);

    let updated = state
        .repo
        .update_content(&id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("content"))?;

    if let Some(status) = status_change {
        tracing::info!(content_id = %id, status = ?status, "content status changed");
    }
    audit::record(
        &state,
        &user,
        "content.update",
        Resource::Content,
        Some(&id),
        json!({ "status": updated.status }),
    )
    .await;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/admin/content/{id}",
    params(("id" = String, Path, description = "Content id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_content(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .access
        .require_permission(&user, Resource::Content, Action::Delete)
        .await?;

    if !state.repo.delete_content(&id).await? {
        return Err(ApiError::not_found("content"));
    }
    audit::record(&state, &user, "content.delete", Resource::Content, Some(&id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}

/// create_media_upload
///
/// Issues a short-lived presigned PUT URL so the admin UI can upload media straight to
/// object storage. The returned `media_key` goes on the content item afterwards.
#[utoipa::path(
    post,
    path = "/admin/content/media/presigned",
    request_body = MediaUploadRequest,
    responses(
        (status = 200, description = "Presigned upload URL", body = MediaUploadResponse),
        (status = 422, description = "Unsupported media type"),
        (status = 500, description = "Storage unavailable")
    )
)]
pub async fn create_media_upload(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<MediaUploadRequest>,
) -> ApiResult<Json<MediaUploadResponse>> {
    state
        .access
        .require_permission(&user, Resource::Content, Action::Create)
        .await?;

    let filename = sanitize::required_text("filename", &payload.filename, sanitize::MAX_NAME)?;
    let file_type = payload.file_type.trim().to_ascii_lowercase();
    if !is_allowed_media_type(&file_type) {
        return Err(ApiError::validation(
            "file_type",
            "only image, audio, video and PDF uploads are accepted",
        ));
    }

    let media_key = media_key_for(&filename);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&media_key, &file_type)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, key = %media_key, "presigned url generation failed");
            ApiError::Internal("could not create upload url".into())
        })?;

    Ok(Json(MediaUploadResponse {
        upload_url,
        media_key,
    }))
}
