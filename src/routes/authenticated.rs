use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes wrapped by `auth_middleware`: the caller holds a valid token, an active account
/// and satisfies the security policy, whatever their role.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // Profile, effective permissions and tracked session of the caller.
        .route("/me", get(handlers::get_me))
}
