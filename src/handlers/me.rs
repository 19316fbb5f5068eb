use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::MeResponse,
};

/// get_me
///
/// [Authenticated Route] The caller's profile, the grants of their role and the tracked
/// session. The admin UI uses the grants to hide what the caller cannot do.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current staff profile", body = MeResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> ApiResult<Json<MeResponse>> {
    let profile = state
        .repo
        .get_user(&user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown user".into()))?;
    let permissions = state.access.effective_permissions(&user.role).await?;
    let session = match &user.session_id {
        Some(sid) => state.repo.get_session(sid).await?,
        None => None,
    };

    Ok(Json(MeResponse {
        user: profile,
        permissions,
        session,
    }))
}
