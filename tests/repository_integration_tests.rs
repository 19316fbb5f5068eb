//! Store tests against a live Postgres. Run with `cargo test -- --ignored` once
//! `DATABASE_URL` points at a disposable database.

mod common;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use wellness_admin::{
    directory::{PostgresDirectory, ProviderDirectory, ProviderFilter},
    error::StoreError,
    models::{
        AdminSession, ContentItem, ContentKind, ContentPatch, ContentStatus, NewProvider,
        ProviderPatch, UserPatch, UserStatus,
    },
    pagination::PageRequest,
    rbac,
    repository::{ContentFilter, PostgresRepository, Repository, SessionFilter, UserFilter},
};

use common::user_record;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }

    fn directory(&self) -> PostgresDirectory {
        PostgresDirectory::new(self.pool.clone())
    }
}

/// A run-unique marker so tests never see each other's rows.
fn marker() -> String {
    Uuid::new_v4().simple().to_string()
}

// --- Users ---

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_user_create_get_and_merge() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let id = format!("it-{}", marker());

    repo.create_user(user_record(&id, rbac::END_USER)).await.unwrap();
    let duplicate = repo.create_user(user_record(&id, rbac::END_USER)).await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    let updated = repo
        .update_user(
            &id,
            UserPatch {
                status: Some(UserStatus::Suspended),
                updated_at: Utc::now(),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, UserStatus::Suspended);
    // Fields absent from the patch survive the merge.
    assert_eq!(updated.email, format!("{}@wellness.test", id));

    let fetched = repo.get_user(&id).await.unwrap().unwrap();
    assert_eq!(fetched.status, UserStatus::Suspended);
    assert!(repo.get_user("it-missing").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_user_pagination_and_count() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let tag = marker();
    let base = Utc::now() - Duration::days(1);

    for i in 0..3 {
        let mut user = user_record(&format!("{}-{}", tag, i), rbac::VIEWER);
        user.created_at = base + Duration::minutes(i);
        repo.create_user(user).await.unwrap();
    }

    let filter = UserFilter {
        search: Some(tag.clone()),
        ..UserFilter::default()
    };
    let first = repo.list_users(&filter, &PageRequest::first(2)).await.unwrap();
    let ids: Vec<_> = first.items.iter().map(|u| u.id.clone()).collect();
    assert_eq!(ids, vec![format!("{}-2", tag), format!("{}-1", tag)]);

    let cursor = first.next_cursor.expect("a second page");
    let second = repo
        .list_users(&filter, &PageRequest::after(cursor, 2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, format!("{}-0", tag));
    assert!(second.next_cursor.is_none());

    assert_eq!(repo.count_users(&filter).await.unwrap(), 3);

    let unknown = repo
        .list_users(&filter, &PageRequest::after(format!("{}-none", tag), 2))
        .await;
    assert!(matches!(unknown, Err(StoreError::InvalidCursor)));
}

// --- Content ---

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_content_filters_and_delete() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let tag = marker();
    let now = Utc::now();

    let item = ContentItem {
        id: format!("c-{}", tag),
        title: format!("Morning stretch {}", tag),
        summary: None,
        body: "Reach up, then fold forward.".to_string(),
        kind: ContentKind::Exercise,
        category: "movement".to_string(),
        tags: vec![tag.clone()],
        duration_minutes: Some(5),
        media_key: None,
        status: ContentStatus::Draft,
        author_id: "editor-1".to_string(),
        created_at: now,
        updated_at: now,
        published_at: None,
    };
    repo.create_content(item.clone()).await.unwrap();

    let by_tag = ContentFilter {
        tag: Some(tag.clone()),
        ..ContentFilter::default()
    };
    let page = repo.list_content(&by_tag, &PageRequest::first(10)).await.unwrap();
    assert_eq!(page.items, vec![item.clone()]);

    let published = repo
        .update_content(
            &item.id,
            ContentPatch {
                status: Some(ContentStatus::Published),
                published_at: Some(now),
                updated_at: now,
                ..ContentPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(published.status, ContentStatus::Published);
    assert_eq!(published.body, item.body);

    let drafts = ContentFilter {
        tag: Some(tag.clone()),
        status: Some(ContentStatus::Draft),
        ..ContentFilter::default()
    };
    assert_eq!(repo.count_content(&drafts).await.unwrap(), 0);

    assert!(repo.delete_content(&item.id).await.unwrap());
    assert!(!repo.delete_content(&item.id).await.unwrap());
}

// --- Sessions ---

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_session_revocation() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user_id = format!("staff-{}", marker());
    let now = Utc::now();

    for n in 0..2 {
        repo.create_session(AdminSession {
            id: format!("{}-s{}", user_id, n),
            user_id: user_id.clone(),
            created_at: now,
            last_seen_at: now,
            two_factor_verified: true,
            ..AdminSession::default()
        })
        .await
        .unwrap();
    }

    let first = format!("{}-s0", user_id);
    assert!(repo.revoke_session(&first, now).await.unwrap());
    assert!(!repo.revoke_session(&first, now).await.unwrap());
    assert_eq!(repo.revoke_user_sessions(&user_id, now).await.unwrap(), 1);

    let active = SessionFilter {
        user_id: Some(user_id.clone()),
        active_only: true,
    };
    let page = repo.list_sessions(&active, &PageRequest::first(10)).await.unwrap();
    assert!(page.items.is_empty());

    let later = now + Duration::minutes(3);
    repo.touch_session(&first, later).await.unwrap();
    let touched = repo.get_session(&first).await.unwrap().unwrap();
    assert_eq!(touched.last_seen_at, later);
    assert!(touched.is_revoked());
}

// --- Provider directory ---

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_provider_crud_and_paging() {
    let ctx = DbTestContext::setup().await;
    let directory = ctx.directory();
    let tag = marker();

    let mut ids = Vec::new();
    for name in ["Dr. Chen", "Dr. Adams", "Dr. Brooks"] {
        let provider = directory
            .create_provider(NewProvider {
                name: format!("{} {}", name, tag),
                specialty: "Therapist".to_string(),
                city: "Austin".to_string(),
                state: "TX".to_string(),
                accepts_new_patients: true,
                ..NewProvider::default()
            })
            .await
            .unwrap();
        ids.push(provider.id);
    }

    let filter = ProviderFilter {
        search: Some(tag.clone()),
        ..ProviderFilter::default()
    };
    let first = directory
        .list_providers(&filter, &PageRequest::first(2))
        .await
        .unwrap();
    let names: Vec<_> = first.items.iter().map(|p| p.name.clone()).collect();
    assert_eq!(
        names,
        vec![format!("Dr. Adams {}", tag), format!("Dr. Brooks {}", tag)]
    );

    let second = directory
        .list_providers(&filter, &PageRequest::after(first.next_cursor.unwrap(), 2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());

    let bad = directory
        .list_providers(&filter, &PageRequest::after("not-a-uuid", 2))
        .await;
    assert!(matches!(bad, Err(StoreError::InvalidCursor)));

    let updated = directory
        .update_provider(
            ids[0],
            ProviderPatch {
                accepts_new_patients: Some(false),
                ..ProviderPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!updated.accepts_new_patients);
    assert_eq!(updated.city, "Austin");

    let accepting = ProviderFilter {
        accepts_new_patients: Some(true),
        ..filter.clone()
    };
    assert_eq!(directory.count_providers(&accepting).await.unwrap(), 2);

    for id in ids {
        assert!(directory.delete_provider(id).await.unwrap());
    }
    assert!(directory.get_provider(Uuid::new_v4()).await.unwrap().is_none());
}
