use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    cache::TtlCache,
    error::{ApiError, ApiResult},
    models::{PermissionGrant, RoleDefinition, RolePermissions, SecuritySettings},
    repository::RepositoryState,
};

/// Resource
///
/// The admin surfaces a permission can be granted on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Resource {
    Users,
    Engagement,
    Content,
    Providers,
    Analytics,
    Roles,
    Security,
    Sessions,
    Audit,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Resource::Users,
        Resource::Engagement,
        Resource::Content,
        Resource::Providers,
        Resource::Analytics,
        Resource::Roles,
        Resource::Security,
        Resource::Sessions,
        Resource::Audit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Engagement => "engagement",
            Resource::Content => "content",
            Resource::Providers => "providers",
            Resource::Analytics => "analytics",
            Resource::Roles => "roles",
            Resource::Security => "security",
            Resource::Sessions => "sessions",
            Resource::Audit => "audit",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

pub const SUPER_ADMIN: &str = "super_admin";
pub const ADMIN: &str = "admin";
pub const EDITOR: &str = "editor";
pub const ANALYST: &str = "analyst";
pub const SUPPORT: &str = "support";
pub const VIEWER: &str = "viewer";
/// Role carried by end users of the wellness app. Never has admin permissions.
pub const END_USER: &str = "user";

pub const BUILTIN_ROLES: [&str; 6] = [SUPER_ADMIN, ADMIN, EDITOR, ANALYST, SUPPORT, VIEWER];

pub fn is_builtin(role: &str) -> bool {
    role == END_USER || BUILTIN_ROLES.contains(&role)
}

fn grant(resource: Resource, actions: &[Action]) -> PermissionGrant {
    PermissionGrant {
        resource,
        actions: actions.to_vec(),
    }
}

const READ: &[Action] = &[Action::Read];
const CRUD: &[Action] = &[Action::Read, Action::Create, Action::Update, Action::Delete];

/// builtin_role
///
/// The permission matrix of the system roles. These definitions live in code so that a
/// misconfigured `roles` collection can never lock administrators out.
pub fn builtin_role(name: &str) -> Option<RoleDefinition> {
    let (description, permissions) = match name {
        SUPER_ADMIN => (
            "Full access, including roles and security settings",
            Resource::ALL.iter().map(|r| grant(*r, CRUD)).collect(),
        ),
        ADMIN => (
            "Full access except role and security administration",
            Resource::ALL
                .iter()
                .map(|r| match r {
                    Resource::Roles | Resource::Security => grant(*r, READ),
                    _ => grant(*r, CRUD),
                })
                .collect(),
        ),
        EDITOR => (
            "Manages content and the provider directory",
            vec![
                grant(Resource::Content, CRUD),
                grant(
                    Resource::Providers,
                    &[Action::Read, Action::Create, Action::Update],
                ),
                grant(Resource::Users, READ),
            ],
        ),
        ANALYST => (
            "Read access to analytics and engagement data",
            vec![
                grant(Resource::Analytics, READ),
                grant(Resource::Engagement, READ),
                grant(Resource::Users, READ),
                grant(Resource::Content, READ),
            ],
        ),
        SUPPORT => (
            "Customer support: account status and session management",
            vec![
                grant(Resource::Users, &[Action::Read, Action::Update]),
                grant(Resource::Engagement, READ),
                grant(Resource::Sessions, &[Action::Read, Action::Delete]),
            ],
        ),
        VIEWER => (
            "Read-only dashboard access",
            vec![
                grant(Resource::Users, READ),
                grant(Resource::Content, READ),
                grant(Resource::Providers, READ),
                grant(Resource::Analytics, READ),
            ],
        ),
        END_USER => ("Wellness app end user", vec![]),
        _ => return None,
    };

    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    Some(RoleDefinition {
        name: name.to_string(),
        description: description.to_string(),
        permissions,
        system: true,
        created_at: epoch,
        updated_at: epoch,
    })
}

/// allows
///
/// The matrix lookup itself: is `action` on `resource` granted by any of `grants`?
pub fn allows(grants: &[PermissionGrant], resource: Resource, action: Action) -> bool {
    grants
        .iter()
        .any(|g| g.resource == resource && g.actions.contains(&action))
}

/// normalize_grants
///
/// Merges duplicate resources, sorts and deduplicates actions, and drops empty grants so
/// stored custom roles have one canonical shape.
pub fn normalize_grants(grants: Vec<PermissionGrant>) -> Vec<PermissionGrant> {
    let mut merged: std::collections::BTreeMap<Resource, Vec<Action>> = Default::default();
    for g in grants {
        merged.entry(g.resource).or_default().extend(g.actions);
    }
    merged
        .into_iter()
        .filter_map(|(resource, mut actions)| {
            actions.sort();
            actions.dedup();
            (!actions.is_empty()).then_some(PermissionGrant { resource, actions })
        })
        .collect()
}

/// check_role_assignment
///
/// Guards `PUT /admin/users/{id}/role`: nobody changes their own role, and only a
/// super admin may grant or take away `super_admin`.
pub fn check_role_assignment(
    actor: &AuthUser,
    target_id: &str,
    current_role: &str,
    new_role: &str,
) -> ApiResult<()> {
    if actor.id == target_id {
        return Err(ApiError::Forbidden("cannot change your own role".into()));
    }
    let touches_super_admin = current_role == SUPER_ADMIN || new_role == SUPER_ADMIN;
    if touches_super_admin && actor.role != SUPER_ADMIN {
        return Err(ApiError::Forbidden(
            "only a super admin can assign or revoke super_admin".into(),
        ));
    }
    Ok(())
}

/// Only a super admin may modify, suspend or delete a super admin account.
pub fn check_super_admin_target(actor: &AuthUser, target_role: &str) -> ApiResult<()> {
    if target_role == SUPER_ADMIN && actor.role != SUPER_ADMIN {
        return Err(ApiError::Forbidden(
            "only a super admin can change a super admin account".into(),
        ));
    }
    Ok(())
}

const SETTINGS_KEY: &str = "security";

/// AccessControl
///
/// Resolves roles to permission grants (built-ins first, then the `roles` collection) and
/// serves the security settings document. Both lookups go through TTL caches because they
/// happen on every authenticated request.
#[derive(Clone)]
pub struct AccessControl {
    repo: RepositoryState,
    roles: Arc<TtlCache<String, Option<RoleDefinition>>>,
    settings: Arc<TtlCache<String, SecuritySettings>>,
}

impl AccessControl {
    pub fn new(repo: RepositoryState, ttl: Duration) -> Self {
        Self {
            repo,
            roles: Arc::new(TtlCache::new(ttl)),
            settings: Arc::new(TtlCache::new(ttl)),
        }
    }

    /// Finds a role definition by name. `None` means the role does not exist anywhere.
    pub async fn resolve_role(&self, name: &str) -> ApiResult<Option<RoleDefinition>> {
        if let Some(role) = builtin_role(name) {
            return Ok(Some(role));
        }
        if let Some(cached) = self.roles.get(&name.to_string()) {
            return Ok(cached);
        }
        let role = self.repo.get_role(name).await?;
        self.roles.insert(name.to_string(), role.clone());
        Ok(role)
    }

    pub async fn effective_permissions(&self, role: &str) -> ApiResult<Vec<PermissionGrant>> {
        Ok(self
            .resolve_role(role)
            .await?
            .map(|r| r.permissions)
            .unwrap_or_default())
    }

    /// require_permission
    ///
    /// The gate every admin handler passes first. Returns 403 when the caller's role does
    /// not grant `action` on `resource`, or when the role no longer exists.
    pub async fn require_permission(
        &self,
        user: &AuthUser,
        resource: Resource,
        action: Action,
    ) -> ApiResult<()> {
        let grants = self.effective_permissions(&user.role).await?;
        if allows(&grants, resource, action) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %user.id,
            role = %user.role,
            resource = resource.as_str(),
            action = action.as_str(),
            "permission denied"
        );
        Err(ApiError::Forbidden(format!(
            "missing permission {}:{}",
            resource.as_str(),
            action.as_str()
        )))
    }

    /// The full matrix: built-in roles followed by custom roles from the store.
    pub async fn permission_matrix(&self) -> ApiResult<Vec<RolePermissions>> {
        let mut matrix: Vec<RolePermissions> = BUILTIN_ROLES
            .iter()
            .filter_map(|name| builtin_role(name))
            .map(|r| RolePermissions {
                role: r.name,
                system: true,
                permissions: r.permissions,
            })
            .collect();
        for role in self.repo.list_roles().await? {
            matrix.push(RolePermissions {
                role: role.name,
                system: false,
                permissions: role.permissions,
            });
        }
        Ok(matrix)
    }

    pub fn invalidate_role(&self, name: &str) {
        self.roles.invalidate(&name.to_string());
    }

    /// The current security settings, falling back to defaults when none were saved yet.
    pub async fn security_settings(&self) -> ApiResult<SecuritySettings> {
        let key = SETTINGS_KEY.to_string();
        if let Some(settings) = self.settings.get(&key) {
            return Ok(settings);
        }
        let settings = self
            .repo
            .get_security_settings()
            .await?
            .unwrap_or_default();
        self.settings.insert(key, settings.clone());
        Ok(settings)
    }

    pub fn invalidate_settings(&self) {
        self.settings.invalidate(&SETTINGS_KEY.to_string());
    }
}
