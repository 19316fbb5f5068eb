use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// The admin dashboard API. The whole router sits behind `staff_middleware` (end users are
/// turned away with 403) and every handler checks its own permission through
/// `AccessControl::require_permission`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Users & engagement ---
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_staff_user),
        )
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/users/{id}/role", put(handlers::assign_role))
        .route("/users/{id}/events", get(handlers::list_user_events))
        .route(
            "/users/{id}/sessions",
            get(handlers::list_user_sessions).delete(handlers::revoke_user_sessions),
        )
        // --- Content library ---
        .route(
            "/content",
            get(handlers::list_content).post(handlers::create_content),
        )
        .route(
            "/content/media/presigned",
            post(handlers::create_media_upload),
        )
        .route(
            "/content/{id}",
            get(handlers::get_content)
                .patch(handlers::update_content)
                .delete(handlers::delete_content),
        )
        // --- Provider directory ---
        .route(
            "/providers",
            get(handlers::list_providers).post(handlers::create_provider),
        )
        .route(
            "/providers/{id}",
            get(handlers::get_provider)
                .patch(handlers::update_provider)
                .delete(handlers::delete_provider),
        )
        // --- Analytics ---
        .route("/analytics/overview", get(handlers::get_overview))
        .route("/analytics/trends", get(handlers::get_trends))
        .route("/analytics/funnel", get(handlers::get_funnel))
        .route("/analytics/engagement/top", get(handlers::get_top_users))
        .route("/analytics/users/{id}", get(handlers::get_user_engagement))
        // --- Roles & permissions ---
        .route("/roles", get(handlers::list_roles).post(handlers::create_role))
        .route(
            "/roles/{name}",
            get(handlers::get_role)
                .put(handlers::update_role)
                .delete(handlers::delete_role),
        )
        .route("/permissions", get(handlers::get_permission_matrix))
        // --- Security policy, sessions, audit ---
        .route(
            "/security/settings",
            get(handlers::get_security_settings).put(handlers::update_security_settings),
        )
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}", delete(handlers::revoke_session))
        .route("/audit", get(handlers::list_audit))
}
