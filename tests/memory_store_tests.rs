mod common;

use chrono::{Duration, Utc};
use wellness_admin::{
    directory::{ProviderDirectory, ProviderFilter},
    error::StoreError,
    memory::{MemoryDirectory, MemoryRepository},
    models::{
        AdminSession, ContentItem, ContentPatch, ContentStatus, NewProvider, ProviderPatch,
        UserPatch, UserStatus,
    },
    pagination::{PageParams, PageRequest},
    repository::{ContentFilter, EventFilter, Repository, SessionFilter, UserFilter},
};

use common::{event, user_record};

async fn seeded_users(repo: &MemoryRepository, n: i64) {
    let base = Utc::now() - Duration::days(30);
    for i in 0..n {
        let role = if i % 2 == 0 { "user" } else { "editor" };
        let mut user = user_record(&format!("u{:02}", i), role);
        user.created_at = base + Duration::hours(i);
        repo.create_user(user).await.unwrap();
    }
}

fn content(id: &str, status: ContentStatus, tags: &[&str], minutes_ago: i64) -> ContentItem {
    let at = Utc::now() - Duration::minutes(minutes_ago);
    ContentItem {
        id: id.to_string(),
        title: format!("Title {}", id),
        summary: None,
        body: "body".to_string(),
        kind: Default::default(),
        category: "sleep".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        duration_minutes: None,
        media_key: None,
        status,
        author_id: "editor-1".to_string(),
        created_at: at,
        updated_at: at,
        published_at: None,
    }
}

fn provider(name: &str, state: &str, accepting: bool) -> NewProvider {
    NewProvider {
        name: name.to_string(),
        specialty: "Licensed Therapist".to_string(),
        credentials: None,
        email: None,
        phone: None,
        city: "Austin".to_string(),
        state: state.to_string(),
        accepts_new_patients: accepting,
        telehealth: false,
        rating: None,
    }
}

#[test]
fn test_page_params_are_clamped() {
    let page = PageRequest::from(PageParams {
        cursor: Some("  ".to_string()),
        limit: Some(500),
    });
    assert_eq!(page, PageRequest::first(100));

    let page = PageRequest::from(PageParams::default());
    assert_eq!(page.limit, 25);
    assert_eq!(page.fetch_limit(), 26);

    assert_eq!(PageRequest::first(0).limit, 1);
}

#[tokio::test]
async fn test_user_pages_follow_cursor_newest_first() {
    let repo = MemoryRepository::new();
    seeded_users(&repo, 5).await;

    let first = repo
        .list_users(&UserFilter::default(), &PageRequest::first(2))
        .await
        .unwrap();
    let ids: Vec<&str> = first.items.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["u04", "u03"]);
    assert_eq!(first.next_cursor.as_deref(), Some("u03"));

    let second = repo
        .list_users(&UserFilter::default(), &PageRequest::after("u03", 2))
        .await
        .unwrap();
    let ids: Vec<&str> = second.items.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["u02", "u01"]);

    let last = repo
        .list_users(&UserFilter::default(), &PageRequest::after("u01", 2))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.next_cursor, None);
}

#[tokio::test]
async fn test_unknown_cursor_is_rejected() {
    let repo = MemoryRepository::new();
    seeded_users(&repo, 2).await;

    let result = repo
        .list_users(&UserFilter::default(), &PageRequest::after("missing", 10))
        .await;
    assert!(matches!(result, Err(StoreError::InvalidCursor)));
}

#[tokio::test]
async fn test_filtered_pages_use_cursor_outside_filter() {
    let repo = MemoryRepository::new();
    seeded_users(&repo, 6).await;

    // Staff only: u05, u03, u01. The cursor may point at a filtered-out user.
    let filter = UserFilter {
        staff_only: true,
        ..UserFilter::default()
    };
    let page = repo
        .list_users(&filter, &PageRequest::after("u04", 10))
        .await
        .unwrap();
    let ids: Vec<&str> = page.items.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["u03", "u01"]);
    assert_eq!(repo.count_users(&filter).await.unwrap(), 3);
}

#[tokio::test]
async fn test_user_search_and_patch() {
    let repo = MemoryRepository::new();
    seeded_users(&repo, 3).await;

    let found = repo
        .list_users(
            &UserFilter {
                search: Some("U01@WELLNESS".to_string()),
                ..UserFilter::default()
            },
            &PageRequest::first(10),
        )
        .await
        .unwrap();
    assert_eq!(found.items.len(), 1);

    let patched = repo
        .update_user(
            "u01",
            UserPatch {
                status: Some(UserStatus::Suspended),
                updated_at: Utc::now(),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patched.status, UserStatus::Suspended);
    // Merge semantics: untouched fields survive.
    assert_eq!(patched.email, "u01@wellness.test");

    assert!(repo
        .update_user("nobody", UserPatch::default())
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        repo.create_user(user_record("u01", "user")).await,
        Err(StoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_content_filters_and_publish_merge() {
    let repo = MemoryRepository::new();
    repo.create_content(content("c1", ContentStatus::Draft, &["sleep"], 30))
        .await
        .unwrap();
    repo.create_content(content("c2", ContentStatus::Published, &["focus"], 20))
        .await
        .unwrap();
    repo.create_content(content("c3", ContentStatus::Published, &["sleep", "focus"], 10))
        .await
        .unwrap();

    let sleep = repo
        .list_content(
            &ContentFilter {
                tag: Some("sleep".to_string()),
                ..ContentFilter::default()
            },
            &PageRequest::first(10),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = sleep.items.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c3", "c1"]);

    let published = ContentFilter {
        status: Some(ContentStatus::Published),
        ..ContentFilter::default()
    };
    assert_eq!(repo.count_content(&published).await.unwrap(), 2);

    let now = Utc::now();
    let updated = repo
        .update_content(
            "c1",
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
    assert_eq!(updated.published_at, Some(now));
    assert_eq!(updated.tags, vec!["sleep".to_string()]);

    assert!(repo.delete_content("c1").await.unwrap());
    assert!(!repo.delete_content("c1").await.unwrap());
}

#[tokio::test]
async fn test_event_scan_is_ascending_and_bounded() {
    let repo = MemoryRepository::new();
    let now = Utc::now();
    for (i, user) in ["u1", "u2", "u1", "u3"].iter().enumerate() {
        repo.record_event(event(
            &format!("e{}", i),
            user,
            "app_open",
            now - Duration::hours(10 - i as i64),
        ))
        .await
        .unwrap();
    }

    let all = repo.scan_events(&EventFilter::default(), 10).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e0", "e1", "e2", "e3"]);

    // A bounded scan keeps the most recent events.
    let bounded = repo.scan_events(&EventFilter::default(), 2).await.unwrap();
    let ids: Vec<&str> = bounded.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e2", "e3"]);

    let u1 = repo
        .list_user_events("u1", &EventFilter::default(), &PageRequest::first(10))
        .await
        .unwrap();
    let ids: Vec<&str> = u1.items.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e2", "e0"]);

    let recent = repo
        .scan_events(
            &EventFilter {
                since: Some(now - Duration::hours(8)),
                ..EventFilter::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn test_session_revocation() {
    let repo = MemoryRepository::new();
    let now = Utc::now();
    for (id, user) in [("s1", "a"), ("s2", "a"), ("s3", "b")] {
        repo.create_session(AdminSession {
            id: id.to_string(),
            user_id: user.to_string(),
            created_at: now,
            last_seen_at: now,
            two_factor_verified: true,
            ..AdminSession::default()
        })
        .await
        .unwrap();
    }

    assert!(repo.revoke_session("s1", now).await.unwrap());
    assert!(!repo.revoke_session("s1", now).await.unwrap());
    assert!(!repo.revoke_session("missing", now).await.unwrap());
    assert_eq!(repo.revoke_user_sessions("a", now).await.unwrap(), 1);

    let active = repo
        .list_sessions(
            &SessionFilter {
                user_id: None,
                active_only: true,
            },
            &PageRequest::first(10),
        )
        .await
        .unwrap();
    assert_eq!(active.items.len(), 1);
    assert_eq!(active.items[0].id, "s3");

    let later = now + Duration::minutes(5);
    repo.touch_session("s3", later).await.unwrap();
    assert_eq!(
        repo.get_session("s3").await.unwrap().unwrap().last_seen_at,
        later
    );
}

#[tokio::test]
async fn test_provider_directory_orders_by_name() {
    let directory = MemoryDirectory::new();
    for (name, state, accepting) in [
        ("Dr. Chen", "TX", true),
        ("Dr. Adams", "CA", false),
        ("Dr. Brooks", "TX", true),
    ] {
        directory
            .create_provider(provider(name, state, accepting))
            .await
            .unwrap();
    }

    let first = directory
        .list_providers(&ProviderFilter::default(), &PageRequest::first(2))
        .await
        .unwrap();
    let names: Vec<&str> = first.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Dr. Adams", "Dr. Brooks"]);

    let cursor = first.next_cursor.expect("more providers");
    let second = directory
        .list_providers(&ProviderFilter::default(), &PageRequest::after(cursor, 2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].name, "Dr. Chen");

    let texas_accepting = ProviderFilter {
        state: Some("TX".to_string()),
        accepts_new_patients: Some(true),
        ..ProviderFilter::default()
    };
    assert_eq!(directory.count_providers(&texas_accepting).await.unwrap(), 2);

    let bad = directory
        .list_providers(&ProviderFilter::default(), &PageRequest::after("not-a-uuid", 2))
        .await;
    assert!(matches!(bad, Err(StoreError::InvalidCursor)));
}

#[tokio::test]
async fn test_provider_partial_update() {
    let directory = MemoryDirectory::new();
    let created = directory
        .create_provider(provider("Dr. Diaz", "NY", true))
        .await
        .unwrap();
    assert!(created.active);

    let updated = directory
        .update_provider(
            created.id,
            ProviderPatch {
                accepts_new_patients: Some(false),
                rating: Some(4.5),
                ..ProviderPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!updated.accepts_new_patients);
    assert_eq!(updated.rating, Some(4.5));
    assert_eq!(updated.city, "Austin");

    assert!(directory.delete_provider(created.id).await.unwrap());
    assert!(directory.get_provider(created.id).await.unwrap().is_none());
}
