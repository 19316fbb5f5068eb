use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rbac::{Action, Resource};

// --- Document Store Records ---

/// UserStatus
///
/// Lifecycle of an account. `Deleted` is a soft delete: the document stays in the store
/// so analytics and audit history keep resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Deleted => "deleted",
        }
    }
}

/// UserRecord
///
/// A document in the `users` collection. End users of the wellness app carry the `user`
/// role; staff accounts carry one of the admin roles resolved by the RBAC layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub status: UserStatus,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub two_factor_enabled: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub last_active_at: Option<DateTime<Utc>>,
}

/// UserPatch
///
/// Internal merge payload for `users/{id}`. Only `Some` fields are written, mirroring a
/// document-store merge.
#[derive(Debug, Clone, Serialize, Default)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// EngagementEvent
///
/// A document in the nested `users/{uid}/events` collection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct EngagementEvent {
    pub id: String,
    pub user_id: String,
    /// e.g. "app_open", "content_view", "content_complete", "subscription_start".
    pub event_type: String,
    #[serde(default)]
    pub content_id: Option<String>,
    #[ts(type = "string")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub properties: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ContentKind {
    #[default]
    Article,
    Meditation,
    Exercise,
    Program,
    Audio,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Meditation => "meditation",
            ContentKind::Exercise => "exercise",
            ContentKind::Program => "program",
            ContentKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Archived => "archived",
        }
    }
}

/// ContentItem
///
/// A document in the `content` collection (articles, guided meditations, programs...).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub body: String,
    pub kind: ContentKind,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Object key of the uploaded media (see `POST /admin/content/media/presigned`).
    #[serde(default)]
    pub media_key: Option<String>,
    pub status: ContentStatus,
    pub author_id: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
}

/// ContentPatch
///
/// Internal merge payload for `content/{id}`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ContentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// PermissionGrant
///
/// One row of a role's permission matrix: the actions allowed on a resource.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct PermissionGrant {
    pub resource: Resource,
    pub actions: Vec<Action>,
}

/// RoleDefinition
///
/// A document in the `roles` collection. Built-in roles are materialised from code with
/// `system = true` and are never written to the store.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct RoleDefinition {
    pub name: String,
    pub description: String,
    pub permissions: Vec<PermissionGrant>,
    #[serde(default)]
    pub system: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// SecuritySettings
///
/// Singleton document `settings/security`, edited from the admin UI's security page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct SecuritySettings {
    /// Roles whose sessions must have completed two-factor authentication.
    pub two_factor_required_roles: Vec<String>,
    pub session_idle_timeout_minutes: u32,
    pub session_max_age_hours: u32,
    /// Client IPs allowed to reach the admin API. Empty means unrestricted.
    pub ip_allowlist: Vec<String>,
    #[ts(type = "string | null")]
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            two_factor_required_roles: vec!["super_admin".to_string(), "admin".to_string()],
            session_idle_timeout_minutes: 30,
            session_max_age_hours: 12,
            ip_allowlist: vec![],
            updated_at: None,
            updated_by: None,
        }
    }
}

/// AdminSession
///
/// A document in the `sessions` collection, keyed by the `sid` claim of the identity
/// provider's token. Created on first sight, revocable by administrators.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdminSession {
    pub id: String,
    pub user_id: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub last_seen_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub two_factor_verified: bool,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AdminSession {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// AuditEntry
///
/// A document in the `audit_log` collection. One entry per admin mutation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    /// e.g. "user.update", "content.delete", "role.create".
    pub action: String,
    pub resource: String,
    pub target_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: Value,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Relational Store Records ---

/// Provider
///
/// A row of the `providers` table in the relational provider directory.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    pub credentials: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: String,
    /// Two-letter US state code.
    pub state: String,
    pub accepts_new_patients: bool,
    pub telehealth: bool,
    pub rating: Option<f64>,
    pub active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// NewProvider
///
/// Sanitized insert payload for the provider directory.
#[derive(Debug, Clone, Default)]
pub struct NewProvider {
    pub name: String,
    pub specialty: String,
    pub credentials: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: String,
    pub state: String,
    pub accepts_new_patients: bool,
    pub telehealth: bool,
    pub rating: Option<f64>,
}

/// ProviderPatch
///
/// Sanitized partial update; `None` columns keep their value (`COALESCE`).
#[derive(Debug, Clone, Default)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub credentials: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub accepts_new_patients: Option<bool>,
    pub telehealth: Option<bool>,
    pub rating: Option<f64>,
    pub active: Option<bool>,
}

// --- Request Payloads ---

/// CreateStaffUserRequest
///
/// Provisions a staff profile for an account that already exists at the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct CreateStaffUserRequest {
    /// Identity-provider uid. Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct AssignRoleRequest {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct CreateContentRequest {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub body: String,
    pub kind: ContentKind,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub media_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateContentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct CreateProviderRequest {
    pub name: String,
    pub specialty: String,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default = "default_true")]
    pub accepts_new_patients: bool,
    #[serde(default)]
    pub telehealth: bool,
    #[serde(default)]
    pub rating: Option<f64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateProviderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts_new_patients: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telehealth: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub permissions: Vec<PermissionGrant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateRoleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<PermissionGrant>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateSecuritySettingsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_factor_required_roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_idle_timeout_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_max_age_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_allowlist: Option<Vec<String>>,
}

/// MediaUploadRequest
///
/// Input payload for requesting a short-lived upload URL for content media.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct MediaUploadRequest {
    #[schema(example = "morning_breathing.mp3")]
    pub filename: String,
    #[schema(example = "audio/mpeg")]
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct MediaUploadResponse {
    pub upload_url: String,
    /// Store this as `media_key` on the content item.
    pub media_key: String,
}

// --- Response Shapes ---

/// Page
///
/// One page of a keyset-paginated listing. Pass `next_cursor` back as `cursor` to continue.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: vec![],
            next_cursor: None,
        }
    }
}

/// MeResponse
///
/// Output of `GET /me`: the resolved staff profile, its effective grants and the
/// tracked session (when the token carries a `sid`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MeResponse {
    pub user: UserRecord,
    pub permissions: Vec<PermissionGrant>,
    pub session: Option<AdminSession>,
}

/// RolePermissions
///
/// One column of the permission matrix shown on the roles page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RolePermissions {
    pub role: String,
    pub system: bool,
    pub permissions: Vec<PermissionGrant>,
}

/// DashboardStats
///
/// Headline counters for the analytics overview page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users_7d: i64,
    pub active_users_30d: i64,
    pub new_users_30d: i64,
    pub suspended_users: i64,
    pub published_content: i64,
    pub draft_content: i64,
    pub archived_content: i64,
    pub total_providers: i64,
    pub accepting_providers: i64,
}

/// Result of revoking every session of a user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct RevokedSessions {
    pub revoked: u64,
}
