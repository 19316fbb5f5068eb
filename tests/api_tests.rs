mod common;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wellness_admin::{AppState, create_router, rbac};

use common::{seed_user, test_state};

pub struct TestApp {
    pub address: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// A request authenticated through the local `x-user-id` bypass.
    fn as_user(&self, method: reqwest::Method, path: &str, user_id: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("x-user-id", user_id)
    }
}

async fn spawn_app() -> TestApp {
    // AppConfig::default() is Env::Local over in-memory stores.
    let state = test_state();
    let router = create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        state,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("req fail");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;
    let doc: Value = app
        .client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(doc["paths"]["/admin/users"].is_object());
    assert!(doc["paths"]["/admin/analytics/funnel"].is_object());
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");

    seed_user(&app.state, "analyst-1", rbac::ANALYST).await;
    let me: Value = app
        .as_user(reqwest::Method::GET, "/me", "analyst-1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["user"]["id"], "analyst-1");
    assert!(me["permissions"].as_array().is_some_and(|p| !p.is_empty()));
}

#[tokio::test]
async fn test_end_users_are_kept_out_of_admin_api() {
    let app = spawn_app().await;
    seed_user(&app.state, "member-1", rbac::END_USER).await;

    let response = app
        .as_user(reqwest::Method::GET, "/admin/content", "member-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // `/me` is open to any active account.
    let response = app
        .as_user(reqwest::Method::GET, "/me", "member-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_content_lifecycle_over_http() {
    let app = spawn_app().await;
    seed_user(&app.state, "editor-1", rbac::EDITOR).await;

    let response = app
        .as_user(reqwest::Method::POST, "/admin/content", "editor-1")
        .json(&json!({
            "title": "Box breathing",
            "body": "Inhale for four, hold for four.",
            "kind": "exercise",
            "category": "Stress",
            "tags": ["Breathing"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "draft");
    assert_eq!(created["tags"], json!(["breathing"]));

    let response = app
        .as_user(reqwest::Method::PATCH, &format!("/admin/content/{}", id), "editor-1")
        .json(&json!({ "status": "published" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let published: Value = response.json().await.unwrap();
    assert!(published["published_at"].is_string());

    let response = app
        .as_user(reqwest::Method::PATCH, &format!("/admin/content/{}", id), "editor-1")
        .json(&json!({ "author_id": "someone-else" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    let listed: Value = app
        .as_user(reqwest::Method::GET, "/admin/content?status=published", "editor-1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["items"].as_array().map(Vec::len), Some(1));

    let response = app
        .as_user(reqwest::Method::DELETE, &format!("/admin/content/{}", id), "editor-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .as_user(reqwest::Method::GET, &format!("/admin/content/{}", id), "editor-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_errors_name_the_field() {
    let app = spawn_app().await;
    seed_user(&app.state, "editor-1", rbac::EDITOR).await;

    let response = app
        .as_user(reqwest::Method::POST, "/admin/providers", "editor-1")
        .json(&json!({
            "name": "Dr. Patel",
            "specialty": "Psychiatrist",
            "city": "Boston",
            "state": "Massachusetts"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field"], "state");
}

#[tokio::test]
async fn test_user_pagination_over_http() {
    let app = spawn_app().await;
    seed_user(&app.state, "admin-1", rbac::ADMIN).await;
    for i in 0..4 {
        let mut user = common::user_record(&format!("member-{}", i), rbac::END_USER);
        user.created_at = user.created_at - chrono::Duration::minutes(10 - i);
        app.state.repo.create_user(user).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let path = match &cursor {
            Some(c) => format!("/admin/users?role=user&limit=3&cursor={}", c),
            None => "/admin/users?role=user&limit=3".to_string(),
        };
        let page: Value = app
            .as_user(reqwest::Method::GET, &path, "admin-1")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        for item in page["items"].as_array().unwrap() {
            seen.push(item["id"].as_str().unwrap().to_string());
        }
        match page["next_cursor"].as_str() {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }
    assert_eq!(seen, vec!["member-3", "member-2", "member-1", "member-0"]);

    let response = app
        .as_user(reqwest::Method::GET, "/admin/users?cursor=nope", "admin-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_role_in_use_cannot_be_deleted() {
    let app = spawn_app().await;
    seed_user(&app.state, "root-1", rbac::SUPER_ADMIN).await;

    let response = app
        .as_user(reqwest::Method::POST, "/admin/roles", "root-1")
        .json(&json!({
            "name": "coach",
            "description": "Wellness coaches",
            "permissions": [{ "resource": "engagement", "actions": ["read"] }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .as_user(reqwest::Method::POST, "/admin/users", "root-1")
        .json(&json!({
            "id": "coach-1",
            "email": "coach@wellness.test",
            "display_name": "Coach",
            "role": "coach"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .as_user(reqwest::Method::DELETE, "/admin/roles/coach", "root-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The new staff member can reach what the custom role grants, and nothing else.
    let response = app
        .as_user(reqwest::Method::GET, "/admin/users/coach-1/events", "coach-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .as_user(reqwest::Method::GET, "/admin/content", "coach-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .as_user(reqwest::Method::DELETE, "/admin/roles/admin", "root-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ip_allowlist_is_enforced() {
    let app = spawn_app().await;
    seed_user(&app.state, "root-1", rbac::SUPER_ADMIN).await;
    seed_user(&app.state, "viewer-1", rbac::VIEWER).await;

    let response = app
        .as_user(reqwest::Method::PUT, "/admin/security/settings", "root-1")
        .header("x-forwarded-for", "203.0.113.10")
        .json(&json!({ "ip_allowlist": ["203.0.113.10"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_user(reqwest::Method::GET, "/admin/providers", "viewer-1")
        .header("x-forwarded-for", "198.51.100.20")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "ip_not_allowed");

    let response = app
        .as_user(reqwest::Method::GET, "/admin/providers", "viewer-1")
        .header("x-forwarded-for", "203.0.113.10")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_analytics_over_http() {
    let app = spawn_app().await;
    seed_user(&app.state, "analyst-1", rbac::ANALYST).await;

    let response = app
        .as_user(
            reqwest::Method::GET,
            "/admin/analytics/trends?days=14&interval=week",
            "analyst-1",
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["interval"], "week");
    assert_eq!(report["total_events"], 0);

    let response = app
        .as_user(
            reqwest::Method::GET,
            "/admin/analytics/funnel?steps=app_open,,content_view",
            "analyst-1",
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
