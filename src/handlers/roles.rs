use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    AppState, audit,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{CreateRoleRequest, RoleDefinition, RolePermissions, UpdateRoleRequest, UserStatus},
    rbac::{self, Action, Resource},
    repository::UserFilter,
    sanitize,
};

fn reject_system_role(name: &str) -> ApiResult<()> {
    if rbac::is_builtin(name) {
        return Err(ApiError::Forbidden(format!(
            "{} is a system role and cannot be changed",
            name
        )));
    }
    Ok(())
}

/// list_roles
///
/// Built-in roles followed by the custom roles of the `roles` collection.
#[utoipa::path(
    get,
    path = "/admin/roles",
    responses((status = 200, description = "All roles", body = [RoleDefinition]))
)]
pub async fn list_roles(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RoleDefinition>>> {
    state
        .access
        .require_permission(&user, Resource::Roles, Action::Read)
        .await?;

    let mut roles: Vec<RoleDefinition> = rbac::BUILTIN_ROLES
        .iter()
        .filter_map(|name| rbac::builtin_role(name))
        .collect();
    roles.extend(state.repo.list_roles().await?);
    Ok(Json(roles))
}

#[utoipa::path(
    get,
    path = "/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Role", body = RoleDefinition),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<RoleDefinition>> {
    state
        .access
        .require_permission(&user, Resource::Roles, Action::Read)
        .await?;
    let role = state
        .access
        .resolve_role(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("role"))?;
    Ok(Json(role))
}

#[utoipa::path(
    post,
    path = "/admin/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Created", body = RoleDefinition),
        (status = 409, description = "Name taken"),
        (status = 422, description = "Invalid name")
    )
)]
pub async fn create_role(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleDefinition>)> {
    state
        .access
        .require_permission(&user, Resource::Roles, Action::Create)
        .await?;

    let role = sanitize::new_role(payload, Utc::now())?;
    if rbac::is_builtin(&role.name) || state.repo.get_role(&role.name).await?.is_some() {
        return Err(ApiError::Conflict(format!("role {} already exists", role.name)));
    }

    let created = state.repo.put_role(role).await?;
    state.access.invalidate_role(&created.name);

    tracing::info!(actor_id = %user.id, role = %created.name, "custom role created");
    audit::record(
        &state,
        &user,
        "role.create",
        Resource::Roles,
        Some(&created.name),
        json!({ "permissions": created.permissions }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// update_role
///
/// Replaces the description and/or grants of a custom role. Sessions holding the role
/// pick up the change once the role cache entry expires; this node sees it immediately.
#[utoipa::path(
    put,
    path = "/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = RoleDefinition),
        (status = 403, description = "System role"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleDefinition>> {
    state
        .access
        .require_permission(&user, Resource::Roles, Action::Update)
        .await?;
    reject_system_role(&name)?;

    let mut role = state
        .repo
        .get_role(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("role"))?;
    if let Some(description) = payload.description {
        role.description = description
            .trim()
            .chars()
            .take(sanitize::MAX_SUMMARY)
            .collect();
    }
    if let Some(permissions) = payload.permissions {
        role.permissions = rbac::normalize_grants(permissions);
    }
    role.updated_at = Utc::now();

    let updated = state.repo.put_role(role).await?;
    state.access.invalidate_role(&name);

    audit::record(
        &state,
        &user,
        "role.update",
        Resource::Roles,
        Some(&name),
        json!({ "permissions": updated.permissions }),
    )
    .await;

    Ok(Json(updated))
}

/// delete_role
///
/// Custom roles only, and only once no user holds them anymore.
#[utoipa::path(
    delete,
    path = "/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "System role"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Role still assigned to a non-deleted user")
    )
)]
pub async fn delete_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .access
        .require_permission(&user, Resource::Roles, Action::Delete)
        .await?;
    reject_system_role(&name)?;

    if state.repo.get_role(&name).await?.is_none() {
        return Err(ApiError::not_found("role"));
    }
    // Soft-deleted accounts keep their role but no longer hold it.
    let assigned = state
        .repo
        .count_users(&UserFilter {
            role: Some(name.clone()),
            ..UserFilter::default()
        })
        .await?;
    let deleted = state
        .repo
        .count_users(&UserFilter {
            role: Some(name.clone()),
            status: Some(UserStatus::Deleted),
            ..UserFilter::default()
        })
        .await?;
    let holders = assigned - deleted;
    if holders > 0 {
        return Err(ApiError::Conflict(format!(
            "role {} is still assigned to {} user(s)",
            name, holders
        )));
    }

    state.repo.delete_role(&name).await?;
    state.access.invalidate_role(&name);
    audit::record(&state, &user, "role.delete", Resource::Roles, Some(&name), json!({})).await;

    Ok(StatusCode::NO_CONTENT)
}

/// get_permission_matrix
#[utoipa::path(
    get,
    path = "/admin/permissions",
    responses((status = 200, description = "Grants of every role", body = [RolePermissions]))
)]
pub async fn get_permission_matrix(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RolePermissions>>> {
    state
        .access
        .require_permission(&user, Resource::Roles, Action::Read)
        .await?;
    Ok(Json(state.access.permission_matrix().await?))
}
