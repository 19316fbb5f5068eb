use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::{
    AppState, audit,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{
        AdminSession, AssignRoleRequest, CreateStaffUserRequest, EngagementEvent, Page,
        RevokedSessions, UpdateUserRequest, UserPatch, UserRecord, UserStatus,
    },
    pagination::{PageParams, PageRequest},
    rbac::{self, Action, Resource},
    repository::{EventFilter, SessionFilter, UserFilter},
    sanitize,
};

/// UserQuery
///
/// Filters of `GET /admin/users`. Pagination comes from `PageParams`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserQuery {
    pub role: Option<String>,
    pub status: Option<UserStatus>,
    /// Case-insensitive match on email or display name.
    pub search: Option<String>,
    /// Hide end users (`role = user`).
    #[serde(default)]
    pub staff_only: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserSessionQuery {
    #[serde(default)]
    pub active_only: bool,
}

async fn load_user(state: &AppState, id: &str) -> ApiResult<UserRecord> {
    state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))
}

/// list_users
#[utoipa::path(
    get,
    path = "/admin/users",
    params(UserQuery, PageParams),
    responses(
        (status = 200, description = "One page of users, newest first", body = Page<UserRecord>),
        (status = 400, description = "Unknown cursor"),
        (status = 403, description = "Missing users:read")
    )
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<UserRecord>>> {
    state
        .access
        .require_permission(&user, Resource::Users, Action::Read)
        .await?;

    let filter = UserFilter {
        role: query.role.filter(|r| !r.trim().is_empty()),
        status: query.status,
        search: sanitize::search_term(query.search),
        staff_only: query.staff_only,
        ..UserFilter::default()
    };
    let page = state
        .repo
        .list_users(&filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserRecord),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    state
        .access
        .require_permission(&user, Resource::Users, Action::Read)
        .await?;
    Ok(Json(load_user(&state, &id).await?))
}

/// create_staff_user
///
/// Provisions the profile document of a staff member whose account already exists at the
/// identity provider. The requested role must exist; granting `super_admin` requires being
/// one.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateStaffUserRequest,
    responses(
        (status = 201, description = "Created", body = UserRecord),
        (status = 409, description = "Id already taken"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn create_staff_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateStaffUserRequest>,
) -> ApiResult<(StatusCode, Json<UserRecord>)> {
    state
        .access
        .require_permission(&user, Resource::Users, Action::Create)
        .await?;

    let record = sanitize::new_staff_user(payload, Utc::now())?;
    if state.access.resolve_role(&record.role).await?.is_none() {
        return Err(ApiError::validation("role", "unknown role"));
    }
    rbac::check_role_assignment(&user, &record.id, rbac::END_USER, &record.role)?;

    let created = state.repo.create_user(record).await?;
    tracing::info!(actor_id = %user.id, user_id = %created.id, role = %created.role, "staff user created");
    audit::record(
        &state,
        &user,
        "user.create",
        Resource::Users,
        Some(&created.id),
        json!({ "role": created.role, "email": created.email }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// update_user
///
/// Partial update of a profile. Suspending an account also revokes its sessions so the
/// suspension takes effect immediately.
#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserRecord),
        (status = 403, description = "Target is a super admin"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserRecord>> {
    state
        .access
        .require_permission(&user, Resource::Users, Action::Update)
        .await?;

    if payload.status == Some(UserStatus::Deleted) {
        return Err(ApiError::validation(
            "status",
            "use DELETE /admin/users/{id} to delete an account",
        ));
    }
    if id == user.id && payload.status.is_some_and(|s| s != UserStatus::Active) {
        return Err(ApiError::BadRequest(
            "cannot suspend your own account".into(),
        ));
    }

    let target = load_user(&state, &id).await?;
    rbac::check_super_admin_target(&user, &target.role)?;

    let now = Utc::now();
    let patch = sanitize::user_patch(payload, now)?;
    let suspended = patch.status == Some(UserStatus::Suspended);
    let details = serde_json::to_value(&patch).unwrap_or_default();

    let updated = state
        .repo
        .update_user(&id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    if suspended {
        let revoked = state.repo.revoke_user_sessions(&id, now).await?;
        tracing::info!(user_id = %id, revoked, "account suspended");
    }
    audit::record(&state, &user, "user.update", Resource::Users, Some(&id), details).await;

    Ok(Json(updated))
}

/// delete_user
///
/// Soft delete: the profile is kept with `status = deleted` and every session of the
/// account is revoked.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Attempt to delete yourself"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .access
        .require_permission(&user, Resource::Users, Action::Delete)
        .await?;

    if id == user.id {
        return Err(ApiError::BadRequest("cannot delete your own account".into()));
    }
    let target = load_user(&state, &id).await?;
    rbac::check_super_admin_target(&user, &target.role)?;

    let now = Utc::now();
    state
        .repo
        .update_user(
            &id,
            UserPatch {
                status: Some(UserStatus::Deleted),
                updated_at: now,
                ..UserPatch::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    let revoked = state.repo.revoke_user_sessions(&id, now).await?;

    tracing::info!(actor_id = %user.id, user_id = %id, revoked, "user soft-deleted");
    audit::record(
        &state,
        &user,
        "user.delete",
        Resource::Users,
        Some(&id),
        json!({ "revoked_sessions": revoked }),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// assign_role
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = String, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserRecord),
        (status = 403, description = "Own role, or super_admin without being one"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Unknown role")
    )
)]
pub async fn assign_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<Json<UserRecord>> {
    state
        .access
        .require_permission(&user, Resource::Users, Action::Update)
        .await?;

    let role = sanitize::role_name(&payload.role)?;
    if state.access.resolve_role(&role).await?.is_none() {
        return Err(ApiError::validation("role", "unknown role"));
    }
    let target = load_user(&state, &id).await?;
    rbac::check_role_assignment(&user, &id, &target.role, &role)?;

    let updated = state
        .repo
        .update_user(
            &id,
            UserPatch {
                role: Some(role.clone()),
                updated_at: Utc::now(),
                ..UserPatch::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    tracing::info!(actor_id = %user.id, user_id = %id, from = %target.role, to = %role, "role assigned");
    audit::record(
        &state,
        &user,
        "user.assign_role",
        Resource::Users,
        Some(&id),
        json!({ "from": target.role, "to": role }),
    )
    .await;

    Ok(Json(updated))
}

/// list_user_events
///
/// One page of a user's engagement events (`users/{id}/events`), newest first.
#[utoipa::path(
    get,
    path = "/admin/users/{id}/events",
    params(("id" = String, Path, description = "User id"), EventQuery, PageParams),
    responses(
        (status = 200, description = "Events", body = Page<EngagementEvent>),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn list_user_events(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<EngagementEvent>>> {
    state
        .access
        .require_permission(&user, Resource::Engagement, Action::Read)
        .await?;
    load_user(&state, &id).await?;

    let filter = EventFilter {
        user_id: Some(id.clone()),
        event_type: query.event_type.filter(|t| !t.trim().is_empty()),
        since: query.since,
        until: query.until,
    };
    let page = state
        .repo
        .list_user_events(&id, &filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/admin/users/{id}/sessions",
    params(("id" = String, Path, description = "User id"), UserSessionQuery, PageParams),
    responses((status = 200, description = "Sessions of the user", body = Page<AdminSession>))
)]
pub async fn list_user_sessions(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserSessionQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<AdminSession>>> {
    state
        .access
        .require_permission(&user, Resource::Sessions, Action::Read)
        .await?;

    let filter = SessionFilter {
        user_id: Some(id),
        active_only: query.active_only,
    };
    let page = state
        .repo
        .list_sessions(&filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}

/// revoke_user_sessions
///
/// Signs a user out everywhere. Revoking your own sessions this way is refused; it would
/// end the request's session too.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}/sessions",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedSessions),
        (status = 400, description = "Attempt to revoke your own sessions")
    )
)]
pub async fn revoke_user_sessions(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RevokedSessions>> {
    state
        .access
        .require_permission(&user, Resource::Sessions, Action::Delete)
        .await?;

    if id == user.id {
        return Err(ApiError::BadRequest(
            "cannot revoke your own sessions".into(),
        ));
    }
    let revoked = state.repo.revoke_user_sessions(&id, Utc::now()).await?;

    audit::record(
        &state,
        &user,
        "session.revoke_all",
        Resource::Sessions,
        Some(&id),
        json!({ "revoked": revoked }),
    )
    .await;

    Ok(Json(RevokedSessions { revoked }))
}
