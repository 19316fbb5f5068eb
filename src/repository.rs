use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;

use crate::{
    error::StoreError,
    models::{
        AdminSession, AuditEntry, ContentItem, ContentKind, ContentPatch, ContentStatus,
        EngagementEvent, Page, RoleDefinition, SecuritySettings, UserPatch, UserRecord,
        UserStatus,
    },
    pagination::{PageRequest, finish_page},
    rbac::END_USER,
    sanitize::like_pattern,
};

// --- Collections ---

pub const USERS: &str = "users";
pub const CONTENT: &str = "content";
pub const ROLES: &str = "roles";
pub const SETTINGS: &str = "settings";
pub const SESSIONS: &str = "sessions";
pub const AUDIT_LOG: &str = "audit_log";
pub const SECURITY_SETTINGS_ID: &str = "security";

/// Path of the nested engagement collection of one user.
pub fn events_collection(user_id: &str) -> String {
    format!("users/{}/events", user_id)
}

/// Matches every `users/{uid}/events` collection (a collection-group query).
const EVENTS_GROUP: &str = "users/%/events";

// --- Filters ---

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<String>,
    pub status: Option<UserStatus>,
    /// Case-insensitive match on email or display name.
    pub search: Option<String>,
    /// Excludes end users (`role = "user"`).
    pub staff_only: bool,
    pub active_since: Option<DateTime<Utc>>,
    pub created_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub status: Option<ContentStatus>,
    pub kind: Option<ContentKind>,
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive match on title or summary.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub active_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub resource: Option<String>,
}

/// Repository Trait
///
/// The document store: users and their nested engagement events, content, custom roles,
/// security settings, admin sessions and the audit log. Handlers only talk to this trait,
/// so the Postgres implementation and the in-memory one are interchangeable.
///
/// Listings are keyset-paginated on `(created_at DESC, id DESC)`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<UserRecord>, StoreError>;
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Fails with `StoreError::Conflict` when the id is taken.
    async fn create_user(&self, user: UserRecord) -> Result<UserRecord, StoreError>;
    async fn update_user(&self, id: &str, patch: UserPatch)
    -> Result<Option<UserRecord>, StoreError>;
    async fn count_users(&self, filter: &UserFilter) -> Result<i64, StoreError>;

    // --- Engagement ---
    async fn list_user_events(
        &self,
        user_id: &str,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<Page<EngagementEvent>, StoreError>;
    /// The most recent `limit` events matching the filter, returned in ascending time order.
    async fn scan_events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<EngagementEvent>, StoreError>;
    async fn record_event(&self, event: EngagementEvent) -> Result<EngagementEvent, StoreError>;

    // --- Content ---
    async fn list_content(
        &self,
        filter: &ContentFilter,
        page: &PageRequest,
    ) -> Result<Page<ContentItem>, StoreError>;
    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>, StoreError>;
    async fn create_content(&self, item: ContentItem) -> Result<ContentItem, StoreError>;
    async fn update_content(
        &self,
        id: &str,
        patch: ContentPatch,
    ) -> Result<Option<ContentItem>, StoreError>;
    async fn delete_content(&self, id: &str) -> Result<bool, StoreError>;
    async fn count_content(&self, filter: &ContentFilter) -> Result<i64, StoreError>;

    // --- Custom roles ---
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError>;
    async fn get_role(&self, name: &str) -> Result<Option<RoleDefinition>, StoreError>;
    async fn put_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError>;
    async fn delete_role(&self, name: &str) -> Result<bool, StoreError>;

    // --- Security settings ---
    async fn get_security_settings(&self) -> Result<Option<SecuritySettings>, StoreError>;
    async fn put_security_settings(
        &self,
        settings: SecuritySettings,
    ) -> Result<SecuritySettings, StoreError>;

    // --- Sessions ---
    async fn get_session(&self, id: &str) -> Result<Option<AdminSession>, StoreError>;
    async fn create_session(&self, session: AdminSession) -> Result<AdminSession, StoreError>;
    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn list_sessions(
        &self,
        filter: &SessionFilter,
        page: &PageRequest,
    ) -> Result<Page<AdminSession>, StoreError>;
    /// Returns false when the session does not exist or was already revoked.
    async fn revoke_session(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;
    /// Revokes every active session of a user, returning how many were revoked.
    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // --- Audit log ---
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
    async fn list_audit(
        &self,
        filter: &AuditFilter,
        page: &PageRequest,
    ) -> Result<Page<AuditEntry>, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the document store across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// Document store backed by a single JSONB table:
///
/// ```sql
/// documents(collection TEXT, id TEXT, data JSONB, created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)
/// ```
///
/// Nested collections are stored under their full path (`users/{uid}/events`), so
/// collection-group queries become a `LIKE` on the path.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_doc<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(data,)| serde_json::from_value(data)).transpose()?)
    }

    /// Inserts a new document; `Conflict` when `(collection, id)` already exists.
    async fn insert_doc<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        created_at: DateTime<Utc>,
        doc: &T,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_value(doc)?;
        let res = sqlx::query(
            r#"INSERT INTO documents (collection, id, data, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $4)
               ON CONFLICT (collection, id) DO NOTHING"#,
        )
        .bind(collection)
        .bind(id)
        .bind(data)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("{}/{} already exists", collection, id)));
        }
        Ok(())
    }

    /// Creates or replaces a whole document.
    async fn upsert_doc<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        created_at: DateTime<Utc>,
        doc: &T,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_value(doc)?;
        sqlx::query(
            r#"INSERT INTO documents (collection, id, data, created_at, updated_at)
               VALUES ($1, $2, $3, $4, NOW())
               ON CONFLICT (collection, id)
               DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()"#,
        )
        .bind(collection)
        .bind(id)
        .bind(data)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Shallow JSON merge (`data || patch`), returning the merged document.
    async fn merge_doc<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Option<T>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as(
            r#"UPDATE documents SET data = data || $3, updated_at = NOW()
               WHERE collection = $1 AND id = $2
               RETURNING data"#,
        )
        .bind(collection)
        .bind(id)
        .bind(patch)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(data,)| serde_json::from_value(data)).transpose()?)
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Resolves a cursor id to its sort key within `collection`.
    async fn cursor_key(
        &self,
        collection: &str,
        cursor: &str,
    ) -> Result<DateTime<Utc>, StoreError> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT created_at FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(cursor)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(ts,)| ts).ok_or(StoreError::InvalidCursor)
    }

    /// Runs one page of a listing. `push_filters` appends ` AND ...` clauses after the
    /// collection predicate.
    async fn page_docs<T, F>(
        &self,
        collection: &str,
        page: &PageRequest,
        push_filters: F,
        id_of: impl Fn(&T) -> String,
    ) -> Result<Page<T>, StoreError>
    where
        T: DeserializeOwned,
        F: FnOnce(&mut QueryBuilder<'_, Postgres>),
    {
        let cursor = match &page.cursor {
            Some(c) => Some((self.cursor_key(collection, c).await?, c.clone())),
            None => None,
        };

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT data FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        push_filters(&mut builder);
        if let Some((created_at, id)) = cursor {
            builder.push(" AND (created_at, id) < (");
            builder.push_bind(created_at);
            builder.push(", ");
            builder.push_bind(id);
            builder.push(")");
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(page.fetch_limit());

        let rows: Vec<(Value,)> = builder.build_query_as().fetch_all(&self.pool).await?;
        let docs = rows
            .into_iter()
            .map(|(data,)| serde_json::from_value(data))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(finish_page(docs, page.limit, id_of))
    }

    async fn count_docs<F>(&self, collection: &str, push_filters: F) -> Result<i64, StoreError>
    where
        F: FnOnce(&mut QueryBuilder<'_, Postgres>),
    {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        push_filters(&mut builder);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }
}

fn push_user_filters(b: &mut QueryBuilder<'_, Postgres>, f: &UserFilter) {
    if let Some(role) = &f.role {
        b.push(" AND data->>'role' = ");
        b.push_bind(role.clone());
    }
    if let Some(status) = f.status {
        b.push(" AND data->>'status' = ");
        b.push_bind(status.as_str());
    }
    if f.staff_only {
        b.push(" AND data->>'role' <> ");
        b.push_bind(END_USER);
    }
    if let Some(since) = f.active_since {
        b.push(" AND (data->>'last_active_at')::timestamptz >= ");
        b.push_bind(since);
    }
    if let Some(since) = f.created_since {
        b.push(" AND created_at >= ");
        b.push_bind(since);
    }
    if let Some(search) = &f.search {
        let pattern = like_pattern(search);
        b.push(" AND (data->>'email' ILIKE ");
        b.push_bind(pattern.clone());
        b.push(" OR data->>'display_name' ILIKE ");
        b.push_bind(pattern);
        b.push(")");
    }
}

fn push_content_filters(b: &mut QueryBuilder<'_, Postgres>, f: &ContentFilter) {
    if let Some(status) = f.status {
        b.push(" AND data->>'status' = ");
        b.push_bind(status.as_str());
    }
    if let Some(kind) = f.kind {
        b.push(" AND data->>'kind' = ");
        b.push_bind(kind.as_str());
    }
    if let Some(category) = &f.category {
        b.push(" AND data->>'category' = ");
        b.push_bind(category.clone());
    }
    if let Some(tag) = &f.tag {
        b.push(" AND data->'tags' @> jsonb_build_array(");
        b.push_bind(tag.clone());
        b.push("::text)");
    }
    if let Some(search) = &f.search {
        let pattern = like_pattern(search);
        b.push(" AND (data->>'title' ILIKE ");
        b.push_bind(pattern.clone());
        b.push(" OR COALESCE(data->>'summary', '') ILIKE ");
        b.push_bind(pattern);
        b.push(")");
    }
}

fn push_event_filters(b: &mut QueryBuilder<'_, Postgres>, f: &EventFilter) {
    if let Some(event_type) = &f.event_type {
        b.push(" AND data->>'event_type' = ");
        b.push_bind(event_type.clone());
    }
    if let Some(since) = f.since {
        b.push(" AND created_at >= ");
        b.push_bind(since);
    }
    if let Some(until) = f.until {
        b.push(" AND created_at < ");
        b.push_bind(until);
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<UserRecord>, StoreError> {
        self.page_docs(
            USERS,
            page,
            |b| push_user_filters(b, filter),
            |u: &UserRecord| u.id.clone(),
        )
        .await
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.get_doc(USERS, id).await
    }

    async fn create_user(&self, user: UserRecord) -> Result<UserRecord, StoreError> {
        self.insert_doc(USERS, &user.id, user.created_at, &user).await?;
        Ok(user)
    }

    async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.merge_doc(USERS, id, serde_json::to_value(&patch)?).await
    }

    async fn count_users(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        self.count_docs(USERS, |b| push_user_filters(b, filter)).await
    }

    async fn list_user_events(
        &self,
        user_id: &str,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<Page<EngagementEvent>, StoreError> {
        let collection = events_collection(user_id);
        self.page_docs(
            &collection,
            page,
            |b| push_event_filters(b, filter),
            |e: &EngagementEvent| e.id.clone(),
        )
        .await
    }

    async fn scan_events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<EngagementEvent>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT data FROM documents WHERE ");
        match &filter.user_id {
            Some(user_id) => {
                builder.push("collection = ");
                builder.push_bind(events_collection(user_id));
            }
            None => {
                builder.push("collection LIKE ");
                builder.push_bind(EVENTS_GROUP);
            }
        }
        push_event_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows: Vec<(Value,)> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .rev()
            .map(|(data,)| serde_json::from_value(data))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn record_event(&self, event: EngagementEvent) -> Result<EngagementEvent, StoreError> {
        let collection = events_collection(&event.user_id);
        self.insert_doc(&collection, &event.id, event.occurred_at, &event)
            .await?;
        Ok(event)
    }

    async fn list_content(
        &self,
        filter: &ContentFilter,
        page: &PageRequest,
    ) -> Result<Page<ContentItem>, StoreError> {
        self.page_docs(
            CONTENT,
            page,
            |b| push_content_filters(b, filter),
            |c: &ContentItem| c.id.clone(),
        )
        .await
    }

    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>, StoreError> {
        self.get_doc(CONTENT, id).await
    }

    async fn create_content(&self, item: ContentItem) -> Result<ContentItem, StoreError> {
        self.insert_doc(CONTENT, &item.id, item.created_at, &item)
            .await?;
        Ok(item)
    }

    async fn update_content(
        &self,
        id: &str,
        patch: ContentPatch,
    ) -> Result<Option<ContentItem>, StoreError> {
        self.merge_doc(CONTENT, id, serde_json::to_value(&patch)?)
            .await
    }

    async fn delete_content(&self, id: &str) -> Result<bool, StoreError> {
        self.delete_doc(CONTENT, id).await
    }

    async fn count_content(&self, filter: &ContentFilter) -> Result<i64, StoreError> {
        self.count_docs(CONTENT, |b| push_content_filters(b, filter))
            .await
    }

    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        let rows: Vec<(Value,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = $1 ORDER BY id ASC")
                .bind(ROLES)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(data,)| serde_json::from_value(data))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_role(&self, name: &str) -> Result<Option<RoleDefinition>, StoreError> {
        self.get_doc(ROLES, name).await
    }

    async fn put_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        self.upsert_doc(ROLES, &role.name, role.created_at, &role)
            .await?;
        Ok(role)
    }

    async fn delete_role(&self, name: &str) -> Result<bool, StoreError> {
        self.delete_doc(ROLES, name).await
    }

    async fn get_security_settings(&self) -> Result<Option<SecuritySettings>, StoreError> {
        self.get_doc(SETTINGS, SECURITY_SETTINGS_ID).await
    }

    async fn put_security_settings(
        &self,
        settings: SecuritySettings,
    ) -> Result<SecuritySettings, StoreError> {
        let created_at = settings.updated_at.unwrap_or_else(Utc::now);
        self.upsert_doc(SETTINGS, SECURITY_SETTINGS_ID, created_at, &settings)
            .await?;
        Ok(settings)
    }

    async fn get_session(&self, id: &str) -> Result<Option<AdminSession>, StoreError> {
        self.get_doc(SESSIONS, id).await
    }

    async fn create_session(&self, session: AdminSession) -> Result<AdminSession, StoreError> {
        self.insert_doc(SESSIONS, &session.id, session.created_at, &session)
            .await?;
        Ok(session)
    }

    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let _: Option<AdminSession> = self
            .merge_doc(SESSIONS, id, json!({ "last_seen_at": at }))
            .await?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
        page: &PageRequest,
    ) -> Result<Page<AdminSession>, StoreError> {
        self.page_docs(
            SESSIONS,
            page,
            |b| {
                if let Some(user_id) = &filter.user_id {
                    b.push(" AND data->>'user_id' = ");
                    b.push_bind(user_id.clone());
                }
                if filter.active_only {
                    b.push(" AND data->>'revoked_at' IS NULL");
                }
            },
            |s: &AdminSession| s.id.clone(),
        )
        .await
    }

    async fn revoke_session(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"UPDATE documents SET data = data || $3, updated_at = NOW()
               WHERE collection = $1 AND id = $2 AND data->>'revoked_at' IS NULL"#,
        )
        .bind(SESSIONS)
        .bind(id)
        .bind(json!({ "revoked_at": at }))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(
            r#"UPDATE documents SET data = data || $3, updated_at = NOW()
               WHERE collection = $1 AND data->>'user_id' = $2 AND data->>'revoked_at' IS NULL"#,
        )
        .bind(SESSIONS)
        .bind(user_id)
        .bind(json!({ "revoked_at": at }))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.insert_doc(AUDIT_LOG, &entry.id, entry.created_at, &entry)
            .await
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
        page: &PageRequest,
    ) -> Result<Page<AuditEntry>, StoreError> {
        self.page_docs(
            AUDIT_LOG,
            page,
            |b| {
                if let Some(actor) = &filter.actor_id {
                    b.push(" AND data->>'actor_id' = ");
                    b.push_bind(actor.clone());
                }
                if let Some(resource) = &filter.resource {
                    b.push(" AND data->>'resource' = ");
                    b.push_bind(resource.clone());
                }
            },
            |a: &AuditEntry| a.id.clone(),
        )
        .await
    }
}
