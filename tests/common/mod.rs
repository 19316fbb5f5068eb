#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use wellness_admin::{
    AppConfig, AppState, MemoryDirectory, MemoryRepository, MockStorageService,
    auth::AuthUser,
    models::{EngagementEvent, UserRecord, UserStatus},
    storage::StorageState,
};

/// State over fresh in-memory stores and the mock object storage.
pub fn test_state() -> AppState {
    test_state_with(AppConfig::default(), Arc::new(MockStorageService::new()))
}

pub fn test_state_with(config: AppConfig, storage: StorageState) -> AppState {
    AppState::new(
        config,
        Arc::new(MemoryRepository::new()),
        Arc::new(MemoryDirectory::new()),
        storage,
    )
}

pub fn user_record(id: &str, role: &str) -> UserRecord {
    let now = Utc::now();
    UserRecord {
        id: id.to_string(),
        email: format!("{}@wellness.test", id),
        display_name: format!("User {}", id),
        role: role.to_string(),
        status: UserStatus::Active,
        subscription_tier: None,
        two_factor_enabled: true,
        created_at: now,
        updated_at: now,
        last_active_at: None,
    }
}

/// Stores a user document and returns the matching request identity.
pub async fn seed_user(state: &AppState, id: &str, role: &str) -> AuthUser {
    state
        .repo
        .create_user(user_record(id, role))
        .await
        .expect("seed user");
    AuthUser {
        id: id.to_string(),
        role: role.to_string(),
        session_id: None,
        two_factor: true,
    }
}

pub fn event(id: &str, user_id: &str, event_type: &str, at: DateTime<Utc>) -> EngagementEvent {
    EngagementEvent {
        id: id.to_string(),
        user_id: user_id.to_string(),
        event_type: event_type.to_string(),
        content_id: None,
        occurred_at: at,
        duration_seconds: None,
        properties: json!({}),
    }
}
