use std::future::Future;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::IntoParams;

use crate::{
    AppState,
    analytics::{
        self, EngagementLeaderboard, FunnelReport, Interval, MAX_FUNNEL_STEPS, MIN_FUNNEL_STEPS,
        TrendReport, UserEngagementReport,
    },
    auth::AuthUser,
    directory::ProviderFilter,
    error::{ApiError, ApiResult},
    models::{ContentStatus, DashboardStats, EngagementEvent, UserStatus},
    rbac::{Action, Resource},
    repository::{ContentFilter, EventFilter, UserFilter},
};

const DEFAULT_WINDOW_DAYS: u32 = 30;
const MAX_WINDOW_DAYS: u32 = 365;
const DEFAULT_TOP_USERS: usize = 10;
const MAX_TOP_USERS: usize = 100;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TrendQuery {
    /// Window length in days, 1..=365. Defaults to 30.
    pub days: Option<u32>,
    pub interval: Option<Interval>,
    /// Restrict the report to one event type.
    pub event_type: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct FunnelQuery {
    /// Comma-separated event types, in funnel order (2 to 8 of them).
    pub steps: String,
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TopUsersQuery {
    pub days: Option<u32>,
    /// Number of users, 1..=100. Defaults to 10.
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct WindowQuery {
    pub days: Option<u32>,
}

fn window_days(days: Option<u32>) -> ApiResult<u32> {
    match days {
        None => Ok(DEFAULT_WINDOW_DAYS),
        Some(d) if (1..=MAX_WINDOW_DAYS).contains(&d) => Ok(d),
        Some(_) => Err(ApiError::validation(
            "days",
            "window must be between 1 and 365 days",
        )),
    }
}

/// Serves `compute` from the analytics cache when a fresh result exists for `key`.
async fn cached<T, F, Fut>(state: &AppState, key: String, compute: F) -> ApiResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    if let Some(hit) = state.analytics_cache.get(&key) {
        if let Ok(value) = serde_json::from_value(hit) {
            tracing::debug!(%key, "analytics cache hit");
            return Ok(value);
        }
    }

    let value = compute().await?;
    match serde_json::to_value(&value) {
        Ok(json) => state.analytics_cache.insert(key, json),
        Err(e) => tracing::warn!(%key, error = %e, "analytics result not cacheable"),
    }
    Ok(value)
}

/// Scans the newest `analytics_max_events` events; the flag tells whether older ones were
/// left out.
async fn scan(state: &AppState, filter: &EventFilter) -> ApiResult<(Vec<EngagementEvent>, bool)> {
    let max = state.config.analytics_max_events;
    let mut events = state.repo.scan_events(filter, max.saturating_add(1)).await?;
    let truncated = events.len() > max;
    if truncated {
        tracing::warn!(max, "analytics scan truncated");
        let excess = events.len() - max;
        events.drain(..excess);
    }
    Ok((events, truncated))
}

/// get_overview
///
/// Headline counters of the dashboard: users, activity, content by status and the
/// provider directory.
#[utoipa::path(
    get,
    path = "/admin/analytics/overview",
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardStats),
        (status = 403, description = "Missing analytics:read")
    )
)]
pub async fn get_overview(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<DashboardStats>> {
    state
        .access
        .require_permission(&user, Resource::Analytics, Action::Read)
        .await?;

    let stats = cached(&state, "overview".to_string(), || async {
        let now = Utc::now();
        let repo = &state.repo;
        let users = |f: UserFilter| async move { repo.count_users(&f).await };
        let content = |status: ContentStatus| async move {
            repo.count_content(&ContentFilter {
                status: Some(status),
                ..ContentFilter::default()
            })
            .await
        };

        let all_users = users(UserFilter::default()).await?;
        let deleted = users(UserFilter {
            status: Some(UserStatus::Deleted),
            ..UserFilter::default()
        })
        .await?;

        Ok::<_, ApiError>(DashboardStats {
            total_users: all_users - deleted,
            active_users_7d: users(UserFilter {
                active_since: Some(now - Duration::days(7)),
                ..UserFilter::default()
            })
            .await?,
            active_users_30d: users(UserFilter {
                active_since: Some(now - Duration::days(30)),
                ..UserFilter::default()
            })
            .await?,
            new_users_30d: users(UserFilter {
                created_since: Some(now - Duration::days(30)),
                ..UserFilter::default()
            })
            .await?,
            suspended_users: users(UserFilter {
                status: Some(UserStatus::Suspended),
                ..UserFilter::default()
            })
            .await?,
            published_content: content(ContentStatus::Published).await?,
            draft_content: content(ContentStatus::Draft).await?,
            archived_content: content(ContentStatus::Archived).await?,
            total_providers: state
                .directory
                .count_providers(&ProviderFilter::default())
                .await?,
            accepting_providers: state
                .directory
                .count_providers(&ProviderFilter {
                    accepts_new_patients: Some(true),
                    active: Some(true),
                    ..ProviderFilter::default()
                })
                .await?,
        })
    })
    .await?;

    Ok(Json(stats))
}

/// get_trends
///
/// Event counts per type and per day (or ISO week) over the window, zero-filled.
#[utoipa::path(
    get,
    path = "/admin/analytics/trends",
    params(TrendQuery),
    responses(
        (status = 200, description = "Trend series", body = TrendReport),
        (status = 422, description = "Invalid window")
    )
)]
pub async fn get_trends(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Json<TrendReport>> {
    state
        .access
        .require_permission(&user, Resource::Analytics, Action::Read)
        .await?;

    let days = window_days(query.days)?;
    let interval = query.interval.unwrap_or_default();
    let event_type = query.event_type.filter(|t| !t.trim().is_empty());
    let key = format!(
        "trends:{}:{:?}:{}",
        days,
        interval,
        event_type.as_deref().unwrap_or("*")
    );

    let report = cached(&state, key, || async {
        let (start, end, since) = analytics::window(Utc::now(), days);
        let filter = EventFilter {
            event_type,
            since: Some(since),
            ..EventFilter::default()
        };
        let (events, truncated) = scan(&state, &filter).await?;
        let series = analytics::trend(&events, start, end, interval);
        Ok::<_, ApiError>(TrendReport {
            interval,
            start,
            end,
            total_events: series.iter().map(|s| s.total).sum(),
            series,
            truncated,
        })
    })
    .await?;

    Ok(Json(report))
}

/// get_funnel
///
/// Ordered conversion funnel over the window, e.g.
/// `steps=app_open,content_view,content_complete`.
#[utoipa::path(
    get,
    path = "/admin/analytics/funnel",
    params(FunnelQuery),
    responses(
        (status = 200, description = "Funnel", body = FunnelReport),
        (status = 422, description = "Invalid steps or window")
    )
)]
pub async fn get_funnel(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FunnelQuery>,
) -> ApiResult<Json<FunnelReport>> {
    state
        .access
        .require_permission(&user, Resource::Analytics, Action::Read)
        .await?;

    let days = window_days(query.days)?;
    let steps: Vec<String> = query
        .steps
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();
    if steps.iter().any(String::is_empty)
        || !(MIN_FUNNEL_STEPS..=MAX_FUNNEL_STEPS).contains(&steps.len())
    {
        return Err(ApiError::validation(
            "steps",
            "a funnel needs 2 to 8 non-empty event types",
        ));
    }

    let key = format!("funnel:{}:{}", days, steps.join(","));
    let report = cached(&state, key, || async {
        let (_, _, since) = analytics::window(Utc::now(), days);
        let filter = EventFilter {
            since: Some(since),
            ..EventFilter::default()
        };
        let (events, truncated) = scan(&state, &filter).await?;
        Ok::<_, ApiError>(FunnelReport {
            window_days: days,
            steps: analytics::funnel(&events, &steps),
            truncated,
        })
    })
    .await?;

    Ok(Json(report))
}

/// get_top_users
///
/// The most engaged users over the window.
#[utoipa::path(
    get,
    path = "/admin/analytics/engagement/top",
    params(TopUsersQuery),
    responses((status = 200, description = "Leaderboard", body = EngagementLeaderboard))
)]
pub async fn get_top_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TopUsersQuery>,
) -> ApiResult<Json<EngagementLeaderboard>> {
    state
        .access
        .require_permission(&user, Resource::Analytics, Action::Read)
        .await?;

    let days = window_days(query.days)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_USERS)
        .clamp(1, MAX_TOP_USERS);

    let key = format!("top:{}:{}", days, limit);
    let report = cached(&state, key, || async {
        let (_, _, since) = analytics::window(Utc::now(), days);
        let filter = EventFilter {
            since: Some(since),
            ..EventFilter::default()
        };
        let (events, truncated) = scan(&state, &filter).await?;
        Ok::<_, ApiError>(EngagementLeaderboard {
            window_days: days,
            users: analytics::top_users(&events, limit),
            truncated,
        })
    })
    .await?;

    Ok(Json(report))
}

/// get_user_engagement
///
/// Engagement rollup of one user over the window. Needs both analytics and engagement
/// read access since it exposes individual activity.
#[utoipa::path(
    get,
    path = "/admin/analytics/users/{id}",
    params(("id" = String, Path, description = "User id"), WindowQuery),
    responses(
        (status = 200, description = "Per-user rollup", body = UserEngagementReport),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_user_engagement(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<UserEngagementReport>> {
    state
        .access
        .require_permission(&user, Resource::Analytics, Action::Read)
        .await?;
    state
        .access
        .require_permission(&user, Resource::Engagement, Action::Read)
        .await?;

    let days = window_days(query.days)?;
    if state.repo.get_user(&id).await?.is_none() {
        return Err(ApiError::not_found("user"));
    }

    let key = format!("user:{}:{}", id, days);
    let report = cached(&state, key, || async {
        let (_, _, since) = analytics::window(Utc::now(), days);
        let filter = EventFilter {
            user_id: Some(id.clone()),
            since: Some(since),
            ..EventFilter::default()
        };
        let (events, truncated) = scan(&state, &filter).await?;
        Ok::<_, ApiError>(UserEngagementReport {
            window_days: days,
            engagement: analytics::user_rollup(&id, &events),
            truncated,
        })
    })
    .await?;

    Ok(Json(report))
}
