use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{AppState, auth::AuthUser, models::AuditEntry, rbac::Resource};

/// record
///
/// Appends an entry to the `audit_log` collection for an admin mutation. The mutation has
/// already happened when this runs, so a failed append is logged and swallowed.
pub async fn record(
    state: &AppState,
    actor: &AuthUser,
    action: &str,
    resource: Resource,
    target_id: Option<&str>,
    details: Value,
) {
    let entry = AuditEntry {
        id: Uuid::new_v4().simple().to_string(),
        actor_id: actor.id.clone(),
        action: action.to_string(),
        resource: resource.as_str().to_string(),
        target_id: target_id.map(str::to_string),
        details,
        created_at: Utc::now(),
    };

    if let Err(e) = state.repo.append_audit(entry).await {
        tracing::error!(
            actor_id = %actor.id,
            action,
            error = %e,
            "failed to append audit entry"
        );
    }
}
