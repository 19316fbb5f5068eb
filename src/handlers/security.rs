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
    auth::{AuthUser, ClientIp},
    error::{ApiError, ApiResult},
    models::{AdminSession, AuditEntry, Page, SecuritySettings, UpdateSecuritySettingsRequest},
    pagination::{PageParams, PageRequest},
    rbac::{Action, Resource},
    repository::{AuditFilter, SessionFilter},
    sanitize,
    security::ip_allowed,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SessionQuery {
    pub user_id: Option<String>,
    /// Only sessions that were not revoked.
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    /// e.g. "users", "content", "roles".
    pub resource: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/security/settings",
    responses((status = 200, description = "Current security settings", body = SecuritySettings))
)]
pub async fn get_security_settings(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<SecuritySettings>> {
    state
        .access
        .require_permission(&user, Resource::Security, Action::Read)
        .await?;
    Ok(Json(state.access.security_settings().await?))
}

/// update_security_settings
///
/// Partial update of the security settings document. An allow-list that would not
/// include the caller's own address is refused so an admin cannot lock themselves out.
#[utoipa::path(
    put,
    path = "/admin/security/settings",
    request_body = UpdateSecuritySettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = SecuritySettings),
        (status = 400, description = "Allow-list excludes the caller"),
        (status = 422, description = "Invalid values")
    )
)]
pub async fn update_security_settings(
    user: AuthUser,
    State(state): State<AppState>,
    ClientIp(caller_ip): ClientIp,
    Json(payload): Json<UpdateSecuritySettingsRequest>,
) -> ApiResult<Json<SecuritySettings>> {
    state
        .access
        .require_permission(&user, Resource::Security, Action::Update)
        .await?;

    let current = state.access.security_settings().await?;
    let next = sanitize::security_settings(payload, current, &user.id, Utc::now())?;
    if !ip_allowed(&next.ip_allowlist, caller_ip) {
        return Err(ApiError::BadRequest(
            "the IP allow-list must include your current address".into(),
        ));
    }

    let saved = state.repo.put_security_settings(next).await?;
    state.access.invalidate_settings();

    tracing::info!(actor_id = %user.id, "security settings updated");
    audit::record(
        &state,
        &user,
        "security.update",
        Resource::Security,
        None,
        serde_json::to_value(&saved).unwrap_or_default(),
    )
    .await;

    Ok(Json(saved))
}

#[utoipa::path(
    get,
    path = "/admin/sessions",
    params(SessionQuery, PageParams),
    responses((status = 200, description = "Admin sessions, newest first", body = Page<AdminSession>))
)]
pub async fn list_sessions(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<AdminSession>>> {
    state
        .access
        .require_permission(&user, Resource::Sessions, Action::Read)
        .await?;

    let filter = SessionFilter {
        user_id: query.user_id.filter(|u| !u.trim().is_empty()),
        active_only: query.active_only,
    };
    let page = state
        .repo
        .list_sessions(&filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}

/// revoke_session
///
/// Revokes one session. Revoking an already revoked session is a no-op; revoking the
/// session the request itself runs under is refused.
#[utoipa::path(
    delete,
    path = "/admin/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Revoked"),
        (status = 400, description = "Current session"),
        (status = 404, description = "Not found")
    )
)]
pub async fn revoke_session(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .access
        .require_permission(&user, Resource::Sessions, Action::Delete)
        .await?;

    if user.session_id.as_deref() == Some(id.as_str()) {
        return Err(ApiError::BadRequest(
            "cannot revoke your current session".into(),
        ));
    }

    let session = state
        .repo
        .get_session(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("session"))?;
    if state.repo.revoke_session(&id, Utc::now()).await? {
        tracing::info!(actor_id = %user.id, session_id = %id, "session revoked");
        audit::record(
            &state,
            &user,
            "session.revoke",
            Resource::Sessions,
            Some(&id),
            json!({ "user_id": session.user_id }),
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// list_audit
#[utoipa::path(
    get,
    path = "/admin/audit",
    params(AuditQuery, PageParams),
    responses((status = 200, description = "Audit log, newest first", body = Page<AuditEntry>))
)]
pub async fn list_audit(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<AuditEntry>>> {
    state
        .access
        .require_permission(&user, Resource::Audit, Action::Read)
        .await?;

    let filter = AuditFilter {
        actor_id: query.actor_id.filter(|a| !a.trim().is_empty()),
        resource: query.resource.filter(|r| !r.trim().is_empty()),
    };
    let page = state
        .repo
        .list_audit(&filter, &PageRequest::from(page))
        .await?;
    Ok(Json(page))
}
