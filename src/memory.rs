use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    directory::{ProviderDirectory, ProviderFilter},
    error::StoreError,
    models::{
        AdminSession, AuditEntry, ContentItem, ContentPatch, EngagementEvent, NewProvider, Page,
        Provider, ProviderPatch, RoleDefinition, SecuritySettings, UserPatch, UserRecord,
    },
    pagination::{PageRequest, paginate_sorted},
    rbac::END_USER,
    repository::{AuditFilter, ContentFilter, EventFilter, Repository, SessionFilter, UserFilter},
    sanitize::contains_ci,
};

#[derive(Default)]
struct Documents {
    users: HashMap<String, UserRecord>,
    /// Nested `users/{uid}/events`, keyed by user id.
    events: HashMap<String, Vec<EngagementEvent>>,
    content: HashMap<String, ContentItem>,
    roles: HashMap<String, RoleDefinition>,
    settings: Option<SecuritySettings>,
    sessions: HashMap<String, AdminSession>,
    audit: Vec<AuditEntry>,
}

/// MemoryRepository
///
/// In-process document store with the same ordering, cursor and merge semantics as
/// `PostgresRepository`. Backs `STORE_BACKEND=memory` in local runs and the test suite.
#[derive(Default)]
pub struct MemoryRepository {
    docs: RwLock<Documents>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, ties broken by id descending.
fn newest_first<T>(mut items: Vec<T>, key: impl Fn(&T) -> (DateTime<Utc>, String)) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

fn user_matches(u: &UserRecord, f: &UserFilter) -> bool {
    f.role.as_ref().is_none_or(|r| &u.role == r)
        && f.status.is_none_or(|s| u.status == s)
        && (!f.staff_only || u.role != END_USER)
        && f
            .active_since
            .is_none_or(|since| u.last_active_at.is_some_and(|at| at >= since))
        && f.created_since.is_none_or(|since| u.created_at >= since)
        && f
            .search
            .as_ref()
            .is_none_or(|q| contains_ci(&u.email, q) || contains_ci(&u.display_name, q))
}

fn content_matches(c: &ContentItem, f: &ContentFilter) -> bool {
    f.status.is_none_or(|s| c.status == s)
        && f.kind.is_none_or(|k| c.kind == k)
        && f.category.as_ref().is_none_or(|cat| &c.category == cat)
        && f.tag.as_ref().is_none_or(|t| c.tags.contains(t))
        && f.search.as_ref().is_none_or(|q| {
            contains_ci(&c.title, q) || c.summary.as_deref().is_some_and(|s| contains_ci(s, q))
        })
}

fn event_matches(e: &EngagementEvent, f: &EventFilter) -> bool {
    f.user_id.as_ref().is_none_or(|u| &e.user_id == u)
        && f.event_type.as_ref().is_none_or(|t| &e.event_type == t)
        && f.since.is_none_or(|s| e.occurred_at >= s)
        && f.until.is_none_or(|u| e.occurred_at < u)
}

fn apply_user_patch(user: &mut UserRecord, patch: UserPatch) {
    if let Some(v) = patch.display_name {
        user.display_name = v;
    }
    if let Some(v) = patch.role {
        user.role = v;
    }
    if let Some(v) = patch.status {
        user.status = v;
    }
    if let Some(v) = patch.subscription_tier {
        user.subscription_tier = Some(v);
    }
    if let Some(v) = patch.last_active_at {
        user.last_active_at = Some(v);
    }
    user.updated_at = patch.updated_at;
}

fn apply_content_patch(item: &mut ContentItem, patch: ContentPatch) {
    if let Some(v) = patch.title {
        item.title = v;
    }
    if let Some(v) = patch.summary {
        item.summary = Some(v);
    }
    if let Some(v) = patch.body {
        item.body = v;
    }
    if let Some(v) = patch.kind {
        item.kind = v;
    }
    if let Some(v) = patch.category {
        item.category = v;
    }
    if let Some(v) = patch.tags {
        item.tags = v;
    }
    if let Some(v) = patch.duration_minutes {
        item.duration_minutes = Some(v);
    }
    if let Some(v) = patch.media_key {
        item.media_key = Some(v);
    }
    if let Some(v) = patch.status {
        item.status = v;
    }
    if let Some(v) = patch.published_at {
        item.published_at = Some(v);
    }
    item.updated_at = patch.updated_at;
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<UserRecord>, StoreError> {
        let docs = self.docs.read().await;
        let all = newest_first(docs.users.values().cloned().collect(), |u| {
            (u.created_at, u.id.clone())
        });
        paginate_sorted(all, page, |u| u.id.clone(), |u| user_matches(u, filter))
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.docs.read().await.users.get(id).cloned())
    }

    async fn create_user(&self, user: UserRecord) -> Result<UserRecord, StoreError> {
        let mut docs = self.docs.write().await;
        if docs.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("users/{} already exists", user.id)));
        }
        docs.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(docs.users.get_mut(id).map(|user| {
            apply_user_patch(user, patch);
            user.clone()
        }))
    }

    async fn count_users(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.users.values().filter(|u| user_matches(u, filter)).count() as i64)
    }

    async fn list_user_events(
        &self,
        user_id: &str,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<Page<EngagementEvent>, StoreError> {
        let docs = self.docs.read().await;
        let events = docs.events.get(user_id).cloned().unwrap_or_default();
        let all = newest_first(events, |e| (e.occurred_at, e.id.clone()));
        paginate_sorted(all, page, |e| e.id.clone(), |e| event_matches(e, filter))
    }

    async fn scan_events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<EngagementEvent>, StoreError> {
        let docs = self.docs.read().await;
        let mut events: Vec<EngagementEvent> = docs
            .events
            .values()
            .flatten()
            .filter(|e| event_matches(e, filter))
            .cloned()
            .collect();
        events.sort_by(|a, b| (a.occurred_at, &a.id).cmp(&(b.occurred_at, &b.id)));
        let excess = events.len().saturating_sub(limit);
        events.drain(..excess);
        Ok(events)
    }

    async fn record_event(&self, event: EngagementEvent) -> Result<EngagementEvent, StoreError> {
        let mut docs = self.docs.write().await;
        let bucket = docs.events.entry(event.user_id.clone()).or_default();
        if bucket.iter().any(|e| e.id == event.id) {
            return Err(StoreError::Conflict(format!(
                "users/{}/events/{} already exists",
                event.user_id, event.id
            )));
        }
        bucket.push(event.clone());
        Ok(event)
    }

    async fn list_content(
        &self,
        filter: &ContentFilter,
        page: &PageRequest,
    ) -> Result<Page<ContentItem>, StoreError> {
        let docs = self.docs.read().await;
        let all = newest_first(docs.content.values().cloned().collect(), |c| {
            (c.created_at, c.id.clone())
        });
        paginate_sorted(all, page, |c| c.id.clone(), |c| content_matches(c, filter))
    }

    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.docs.read().await.content.get(id).cloned())
    }

    async fn create_content(&self, item: ContentItem) -> Result<ContentItem, StoreError> {
        let mut docs = self.docs.write().await;
        if docs.content.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!("content/{} already exists", item.id)));
        }
        docs.content.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn update_content(
        &self,
        id: &str,
        patch: ContentPatch,
    ) -> Result<Option<ContentItem>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(docs.content.get_mut(id).map(|item| {
            apply_content_patch(item, patch);
            item.clone()
        }))
    }

    async fn delete_content(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.docs.write().await.content.remove(id).is_some())
    }

    async fn count_content(&self, filter: &ContentFilter) -> Result<i64, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .content
            .values()
            .filter(|c| content_matches(c, filter))
            .count() as i64)
    }

    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        let docs = self.docs.read().await;
        let mut roles: Vec<RoleDefinition> = docs.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn get_role(&self, name: &str) -> Result<Option<RoleDefinition>, StoreError> {
        Ok(self.docs.read().await.roles.get(name).cloned())
    }

    async fn put_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        let mut docs = self.docs.write().await;
        docs.roles.insert(role.name.clone(), role.clone());
        Ok(role)
    }

    async fn delete_role(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.docs.write().await.roles.remove(name).is_some())
    }

    async fn get_security_settings(&self) -> Result<Option<SecuritySettings>, StoreError> {
        Ok(self.docs.read().await.settings.clone())
    }

    async fn put_security_settings(
        &self,
        settings: SecuritySettings,
    ) -> Result<SecuritySettings, StoreError> {
        self.docs.write().await.settings = Some(settings.clone());
        Ok(settings)
    }

    async fn get_session(&self, id: &str) -> Result<Option<AdminSession>, StoreError> {
        Ok(self.docs.read().await.sessions.get(id).cloned())
    }

    async fn create_session(&self, session: AdminSession) -> Result<AdminSession, StoreError> {
        let mut docs = self.docs.write().await;
        if docs.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!(
                "sessions/{} already exists",
                session.id
            )));
        }
        docs.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(session) = self.docs.write().await.sessions.get_mut(id) {
            session.last_seen_at = at;
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        filter: &SessionFilter,
        page: &PageRequest,
    ) -> Result<Page<AdminSession>, StoreError> {
        let docs = self.docs.read().await;
        let all = newest_first(docs.sessions.values().cloned().collect(), |s| {
            (s.created_at, s.id.clone())
        });
        paginate_sorted(
            all,
            page,
            |s| s.id.clone(),
            |s| {
                filter.user_id.as_ref().is_none_or(|u| &s.user_id == u)
                    && (!filter.active_only || !s.is_revoked())
            },
        )
    }

    async fn revoke_session(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut docs = self.docs.write().await;
        match docs.sessions.get_mut(id) {
            Some(session) if !session.is_revoked() => {
                session.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_sessions(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut docs = self.docs.write().await;
        let mut revoked = 0;
        for session in docs
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && !s.is_revoked())
        {
            session.revoked_at = Some(at);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.docs.write().await.audit.push(entry);
        Ok(())
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
        page: &PageRequest,
    ) -> Result<Page<AuditEntry>, StoreError> {
        let docs = self.docs.read().await;
        let all = newest_first(docs.audit.clone(), |a| (a.created_at, a.id.clone()));
        paginate_sorted(
            all,
            page,
            |a| a.id.clone(),
            |a| {
                filter.actor_id.as_ref().is_none_or(|id| &a.actor_id == id)
                    && filter.resource.as_ref().is_none_or(|r| &a.resource == r)
            },
        )
    }
}

/// MemoryDirectory
///
/// In-process provider directory ordered like the SQL one: `(name ASC, id ASC)`.
#[derive(Default)]
pub struct MemoryDirectory {
    providers: RwLock<HashMap<Uuid, Provider>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn provider_matches(p: &Provider, f: &ProviderFilter) -> bool {
    f.specialty.as_ref().is_none_or(|s| contains_ci(&p.specialty, s))
        && f.state.as_ref().is_none_or(|s| &p.state == s)
        && f.accepts_new_patients.is_none_or(|a| p.accepts_new_patients == a)
        && f.telehealth.is_none_or(|t| p.telehealth == t)
        && f.active.is_none_or(|a| p.active == a)
        && f.search.as_ref().is_none_or(|q| {
            contains_ci(&p.name, q) || contains_ci(&p.specialty, q) || contains_ci(&p.city, q)
        })
}

#[async_trait]
impl ProviderDirectory for MemoryDirectory {
    async fn list_providers(
        &self,
        filter: &ProviderFilter,
        page: &PageRequest,
    ) -> Result<Page<Provider>, StoreError> {
        if let Some(cursor) = &page.cursor {
            Uuid::parse_str(cursor).map_err(|_| StoreError::InvalidCursor)?;
        }
        let providers = self.providers.read().await;
        let mut all: Vec<Provider> = providers.values().cloned().collect();
        all.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        paginate_sorted(
            all,
            page,
            |p| p.id.to_string(),
            |p| provider_matches(p, filter),
        )
    }

    async fn get_provider(&self, id: Uuid) -> Result<Option<Provider>, StoreError> {
        Ok(self.providers.read().await.get(&id).cloned())
    }

    async fn create_provider(&self, p: NewProvider) -> Result<Provider, StoreError> {
        let now = Utc::now();
        let provider = Provider {
            id: Uuid::new_v4(),
            name: p.name,
            specialty: p.specialty,
            credentials: p.credentials,
            email: p.email,
            phone: p.phone,
            city: p.city,
            state: p.state,
            accepts_new_patients: p.accepts_new_patients,
            telehealth: p.telehealth,
            rating: p.rating,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.providers
            .write()
            .await
            .insert(provider.id, provider.clone());
        Ok(provider)
    }

    async fn update_provider(
        &self,
        id: Uuid,
        patch: ProviderPatch,
    ) -> Result<Option<Provider>, StoreError> {
        let mut providers = self.providers.write().await;
        let Some(p) = providers.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.name {
            p.name = v;
        }
        if let Some(v) = patch.specialty {
            p.specialty = v;
        }
        if let Some(v) = patch.credentials {
            p.credentials = Some(v);
        }
        if let Some(v) = patch.email {
            p.email = Some(v);
        }
        if let Some(v) = patch.phone {
            p.phone = Some(v);
        }
        if let Some(v) = patch.city {
            p.city = v;
        }
        if let Some(v) = patch.state {
            p.state = v;
        }
        if let Some(v) = patch.accepts_new_patients {
            p.accepts_new_patients = v;
        }
        if let Some(v) = patch.telehealth {
            p.telehealth = v;
        }
        if let Some(v) = patch.rating {
            p.rating = Some(v);
        }
        if let Some(v) = patch.active {
            p.active = v;
        }
        p.updated_at = Utc::now();
        Ok(Some(p.clone()))
    }

    async fn delete_provider(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.providers.write().await.remove(&id).is_some())
    }

    async fn count_providers(&self, filter: &ProviderFilter) -> Result<i64, StoreError> {
        let providers = self.providers.read().await;
        Ok(providers
            .values()
            .filter(|p| provider_matches(p, filter))
            .count() as i64)
    }
}
