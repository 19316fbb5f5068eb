use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    AppState, audit,
    auth::AuthUser,
    directory::ProviderFilter,
    error::{ApiError, ApiResult},
    models::{CreateProviderRequest, Page, Provider, UpdateProviderRequest},
    pagination::{PageParams, PageRequest},
    rbac::{Action, Resource},
    sanitize,
};

/// ProviderQuery
///
/// Filters of `GET /admin/providers`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ProviderQuery {
    /// Substring match on the specialty.
    pub specialty: Option<String>,
    /// Two-letter US state code.
    pub state: Option<String>,
    pub accepts_new_patients: Option<bool>,
    pub telehealth: Option<bool>,
    pub active: Option<bool>,
    /// Case-insensitive match on name, specialty or city.
    pub search: Option<String>,
}

impl ProviderQuery {
    fn into_filter(self) -> ApiResult<ProviderFilter> {
        let state = match self.state.filter(|s| !s.trim().is_empty()) {
            Some(code) => Some(sanitize::state_code(&code)?),
            None => None,
        };
        Ok(ProviderFilter {
            specialty: sanitize::search_term(self.specialty),
            state,
            accepts_new_patients: self.accepts_new_patients,
            telehealth: self.telehealth,
            active: self.active,
            search: sanitize::search_term(self.search),
        })
    }
}

/// list_providers
///
/// The provider directory in name order, keyset-paginated on `(name, id)`.
#[utoipa::path(
    get,
    path = "/admin/providers",
    params(ProviderQuery, PageParams),
    responses(
        (status = 200, description = "One page of providers", body = Page<Provider>),
        (status = 400, description = "Malformed cursor")
    )
)]
pub async fn list_providers(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ProviderQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<Provider>>> {
    state
        .access
        .require_permission(&user, Resource::Providers, Action::Read)
        .await?;

    let filter = query.into_filter()?;
    let page = state
        .directory
        .list_providers(&filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/admin/providers/{id}",
    params(("id" = Uuid, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Provider", body = Provider),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_provider(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Provider>> {
    state
        .access
        .require_permission(&user, Resource::Providers, Action::Read)
        .await?;
    let provider = state
        .directory
        .get_provider(id)
        .await?
        .ok_or_else(|| ApiError::not_found("provider"))?;
    Ok(Json(provider))
}

#[utoipa::path(
    post,
    path = "/admin/providers",
    request_body = CreateProviderRequest,
    responses(
        (status = 201, description = "Created", body = Provider),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn create_provider(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProviderRequest>,
) -> ApiResult<(StatusCode, Json<Provider>)> {
    state
        .access
        .require_permission(&user, Resource::Providers, Action::Create)
        .await?;

    let provider = sanitize::new_provider(payload)?;
    let created = state.directory.create_provider(provider).await?;

    let target = created.id.to_string();
    audit::record(
        &state,
        &user,
        "provider.create",
        Resource::Providers,
        Some(&target),
        json!({ "name": created.name, "specialty": created.specialty }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// update_provider
///
/// Partial update; absent fields keep their stored value.
#[utoipa::path(
    patch,
    path = "/admin/providers/{id}",
    params(("id" = Uuid, Path, description = "Provider id")),
    request_body = UpdateProviderRequest,
    responses(
        (status = 200, description = "Updated", body = Provider),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn update_provider(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProviderRequest>,
) -> ApiResult<Json<Provider>> {
    state
        .access
        .require_permission(&user, Resource::Providers, Action::Update)
        .await?;

    let patch = sanitize::provider_patch(payload)?;
    let updated = state
        .directory
        .update_provider(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("provider"))?;

    let target = id.to_string();
    audit::record(
        &state,
        &user,
        "provider.update",
        Resource::Providers,
        Some(&target),
        json!({ "active": updated.active }),
    )
    .await;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/admin/providers/{id}",
    params(("id" = Uuid, Path, description = "Provider id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_provider(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .access
        .require_permission(&user, Resource::Providers, Action::Delete)
        .await?;

    if !state.directory.delete_provider(id).await? {
        return Err(ApiError::not_found("provider"));
    }
    let target = id.to_string();
    audit::record(&state, &user, "provider.delete", Resource::Providers, Some(&target), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}
