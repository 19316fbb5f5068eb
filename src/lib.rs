use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain logic with no HTTP concerns.
pub mod analytics;
pub mod cache;
pub mod pagination;
pub mod rbac;
pub mod sanitize;
pub mod security;

// Stores and external services.
pub mod directory;
pub mod memory;
pub mod repository;
pub mod storage;

// HTTP surface.
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use error::ApiError;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use cache::TtlCache;
pub use config::AppConfig;
pub use directory::{DirectoryState, PostgresDirectory};
pub use memory::{MemoryDirectory, MemoryRepository};
pub use rbac::AccessControl;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for the admin API, served at `/api-docs/openapi.json` and browsable
/// at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::me::get_me,
        handlers::users::list_users, handlers::users::get_user,
        handlers::users::create_staff_user, handlers::users::update_user,
        handlers::users::delete_user, handlers::users::assign_role,
        handlers::users::list_user_events, handlers::users::list_user_sessions,
        handlers::users::revoke_user_sessions,
        handlers::content::list_content, handlers::content::get_content,
        handlers::content::create_content, handlers::content::update_content,
        handlers::content::delete_content, handlers::content::create_media_upload,
        handlers::providers::list_providers, handlers::providers::get_provider,
        handlers::providers::create_provider, handlers::providers::update_provider,
        handlers::providers::delete_provider,
        handlers::analytics::get_overview, handlers::analytics::get_trends,
        handlers::analytics::get_funnel, handlers::analytics::get_top_users,
        handlers::analytics::get_user_engagement,
        handlers::roles::list_roles, handlers::roles::get_role, handlers::roles::create_role,
        handlers::roles::update_role, handlers::roles::delete_role,
        handlers::roles::get_permission_matrix,
        handlers::security::get_security_settings, handlers::security::update_security_settings,
        handlers::security::list_sessions, handlers::security::revoke_session,
        handlers::security::list_audit,
    ),
    components(
        schemas(
            models::UserRecord, models::UserStatus, models::EngagementEvent,
            models::ContentItem, models::ContentKind, models::ContentStatus,
            models::Provider, models::RoleDefinition, models::PermissionGrant,
            models::SecuritySettings, models::AdminSession, models::AuditEntry,
            models::CreateStaffUserRequest, models::UpdateUserRequest, models::AssignRoleRequest,
            models::CreateContentRequest, models::UpdateContentRequest,
            models::CreateProviderRequest, models::UpdateProviderRequest,
            models::CreateRoleRequest, models::UpdateRoleRequest,
            models::UpdateSecuritySettingsRequest, models::MediaUploadRequest,
            models::MediaUploadResponse, models::MeResponse, models::RolePermissions,
            models::DashboardStats, models::RevokedSessions,
            rbac::Resource, rbac::Action,
            analytics::Interval, analytics::TrendReport, analytics::FunnelReport,
            analytics::UserEngagementReport, analytics::EngagementLeaderboard,
        )
    ),
    tags(
        (name = "wellness-admin", description = "Wellness admin dashboard API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a handler may need. Handlers pull
/// what they use through `State<AppState>` or the `FromRef` impls below.
#[derive(Clone)]
pub struct AppState {
    /// Document store: users, engagement, content, roles, settings, sessions, audit.
    pub repo: RepositoryState,
    /// Relational provider directory.
    pub directory: DirectoryState,
    /// Presigned media uploads.
    pub storage: StorageState,
    pub config: AppConfig,
    /// Role and security-settings resolution, cached.
    pub access: AccessControl,
    /// Analytics reports keyed by query.
    pub analytics_cache: Arc<TtlCache<String, serde_json::Value>>,
}

impl AppState {
    /// Wires the access-control layer and the analytics cache with the configured TTL.
    pub fn new(
        config: AppConfig,
        repo: RepositoryState,
        directory: DirectoryState,
        storage: StorageState,
    ) -> Self {
        let access = AccessControl::new(repo.clone(), config.cache_ttl);
        let analytics_cache = Arc::new(TtlCache::new(config.cache_ttl));
        Self {
            repo,
            directory,
            storage,
            config,
            access,
            analytics_cache,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for DirectoryState {
    fn from_ref(app_state: &AppState) -> DirectoryState {
        app_state.directory.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for AccessControl {
    fn from_ref(app_state: &AppState) -> AccessControl {
        app_state.access.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor (token, account status, security policy, session
/// tracking) and stores the result in the request extensions so the handler's own
/// `AuthUser` argument does not repeat the work.
async fn auth_middleware(user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// staff_middleware
///
/// Same as `auth_middleware`, and turns away end-user accounts: the admin API is for staff
/// roles only, whatever custom grants might say.
async fn staff_middleware(
    user: AuthUser,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if user.role == rbac::END_USER {
        tracing::warn!(user_id = %user.id, "end user attempted to reach the admin API");
        return Err(ApiError::Forbidden(
            "the admin API requires a staff role".into(),
        ));
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the route modules, their access layers, the documentation endpoints and the
/// observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                staff_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span of one HTTP request, correlated by the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
