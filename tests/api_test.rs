mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use helpers::{new_poem, png_bytes};
use poetry_family::app_state::{AppState, UploadLimits};
use poetry_family::config::EnrichmentConfig;
use poetry_family::db::{MemoryStore, PoetryStore, UserStore};
use poetry_family::models::user::{NewUser, User, UserRole, UserStatus};
use poetry_family::routes::api_router;
use poetry_family::services::auth::{ensure_admin, TokenService};
use poetry_family::services::enrichment::EnrichmentPipeline;
use poetry_family::services::storage::LocalImageStore;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "api-test-secret";
const BOUNDARY: &str = "poetry-test-boundary";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    tokens: TokenService,
    _uploads: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let images = Arc::new(LocalImageStore::new(uploads.path()));
        let (enrichment, worker) =
            EnrichmentPipeline::new(&EnrichmentConfig::default(), store.clone(), images.clone())
                .unwrap();
        tokio::spawn(worker.run(std::future::pending::<()>()));

        let state = AppState::new(
            store.clone(),
            store.clone(),
            images,
            enrichment,
            TokenService::new(SECRET, Duration::from_secs(3600)),
            UploadLimits {
                max_file_size: 64 * 1024,
                max_files: 2,
                body_limit: 1024 * 1024,
            },
        );

        Self {
            router: api_router(state),
            store,
            tokens: TokenService::new(SECRET, Duration::from_secs(3600)),
            _uploads: uploads,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// An account inserted straight into the store, with a token for it.
    async fn member(&self, username: &str, role: UserRole, status: UserStatus) -> (User, String) {
        let user = self
            .store
            .insert_user(NewUser {
                username: username.into(),
                password_hash: String::new(),
                nickname: username.into(),
                role,
                status,
            })
            .await
            .unwrap();
        let token = self.tokens.issue(&user).unwrap();
        (user, token)
    }
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(
    method: Method,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    files: &[(&str, Vec<u8>)],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (index, (name, data)) in files.iter().enumerate() {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"upload-{index}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap()
}

const POEM_FIELDS: &[(&str, &str)] = &[
    ("title", "春晓"),
    ("author", "孟浩然"),
    ("dynasty", "唐"),
    ("content", "春眠不觉晓，处处闻啼鸟。"),
    ("tags", "春天, 自然,春天"),
];

#[tokio::test]
async fn registration_waits_for_admin_approval() {
    let app = TestApp::new();
    ensure_admin(app.store.as_ref(), "admin", "admin-pass")
        .await
        .unwrap();

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({"username": "xiaoming", "password": "secret123", "nickname": "小明"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["role"], "guest");
    assert!(body["data"].get("passwordHash").is_none());
    let user_id = body["data"]["id"].as_str().unwrap().to_string();

    let login = json!({"username": "xiaoming", "password": "secret123"});
    let (status, _) = app
        .send(json_request(Method::POST, "/api/auth/login", None, login.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({"username": "admin", "password": "admin-pass"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let admin_token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(get("/api/auth/users?status=pending", Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["users"][0]["username"], "xiaoming");

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/api/auth/users/{user_id}/approve"),
            Some(&admin_token),
            json!({"status": "active", "role": "family"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "family");

    let (status, body) = app
        .send(json_request(Method::POST, "/api/auth/login", None, login))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app.send(get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nickname"], "小明");
}

#[tokio::test]
async fn registration_rejects_bad_input_and_duplicates() {
    let app = TestApp::new();
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({"username": "x", "password": "123", "nickname": "小"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let valid = json!({"username": "laolao", "password": "secret123", "nickname": "姥姥"});
    let (status, _) = app
        .send(json_request(Method::POST, "/api/auth/register", None, valid.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .send(json_request(Method::POST, "/api/auth/register", None, valid))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() {
    let app = TestApp::new();
    ensure_admin(app.store.as_ref(), "admin", "admin-pass")
        .await
        .unwrap();

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({"username": "admin", "password": "nope"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(json_request(Method::POST, "/api/auth/login", None, json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(get("/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send(get("/api/auth/me", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_accounts_cannot_use_their_token() {
    let app = TestApp::new();
    let (_, token) = app
        .member("waiting", UserRole::Guest, UserStatus::Pending)
        .await;
    let (status, _) = app.send(get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_admins_manage_users() {
    let app = TestApp::new();
    let (_, family) = app
        .member("baba", UserRole::Family, UserStatus::Active)
        .await;
    let (admin, admin_token) = app
        .member("mama", UserRole::Admin, UserStatus::Active)
        .await;

    let (status, _) = app.send(get("/api/auth/users", Some(&family))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/auth/users/{}", admin.id))
                .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn poem_lifecycle_over_http() {
    let app = TestApp::new();
    let (_, owner) = app
        .member("yeye", UserRole::Family, UserStatus::Active)
        .await;
    let (_, cousin) = app
        .member("biaoge", UserRole::Family, UserStatus::Active)
        .await;
    let (_, admin) = app
        .member("admin", UserRole::Admin, UserStatus::Active)
        .await;

    let (status, body) = app
        .send(multipart_request(
            Method::POST,
            "/api/poetry",
            &owner,
            POEM_FIELDS,
            &[("images", png_bytes())],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let poem = &body["data"];
    assert_eq!(poem["imageGenStatus"], "skipped");
    assert_eq!(poem["verifyStatus"], "pending");
    assert_eq!(poem["tags"], json!(["春天", "自然"]));
    assert_eq!(poem["originalContent"], "春眠不觉晓，处处闻啼鸟。");
    let image = poem["images"][0].as_str().unwrap();
    assert!(image.starts_with("/uploads/") && image.ends_with(".png"));
    assert_eq!(poem["originalImages"], poem["images"]);
    let id = poem["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(get("/api/poetry?dynasty=%E5%94%90", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (_, body) = app.send(get(&format!("/api/poetry/{id}"), None)).await;
    assert_eq!(body["data"]["viewCount"], 1);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            &format!("/api/poetry/{id}/like"),
            Some(&cousin),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["likeCount"], 1);

    let (status, body) = app.send(get(&format!("/api/ai/status/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["imageGenStatus"], "skipped");

    let (status, _) = app
        .send(multipart_request(
            Method::PUT,
            &format!("/api/poetry/{id}"),
            &cousin,
            &[("title", "春晓（改）")],
            &[],
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(multipart_request(
            Method::PUT,
            &format!("/api/poetry/{id}"),
            &owner,
            &[("content", "夜来风雨声，花落知多少。")],
            &[],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["originalContent"], "夜来风雨声，花落知多少。");
    assert_eq!(body["data"]["title"], "春晓");

    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/poetry/{id}"))
                .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(get(&format!("/api/poetry/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn poem_submission_is_validated() {
    let app = TestApp::new();
    let (_, token) = app
        .member("nainai", UserRole::Family, UserStatus::Active)
        .await;

    let (status, _) = app
        .send(multipart_request(
            Method::POST,
            "/api/poetry",
            &token,
            &[("title", "无题")],
            &[],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(multipart_request(
            Method::POST,
            "/api/poetry",
            &token,
            POEM_FIELDS,
            &[("images", b"definitely not an image".to_vec())],
        ))
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let too_many = vec![
        ("images", png_bytes()),
        ("images", png_bytes()),
        ("images", png_bytes()),
    ];
    let (status, _) = app
        .send(multipart_request(
            Method::POST,
            "/api/poetry",
            &token,
            POEM_FIELDS,
            &too_many,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/poetry")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.send(get("/api/poetry", None)).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn listing_paginates_and_reports_stats() {
    let app = TestApp::new();
    for i in 0..5 {
        let mut poem = new_poem(vec![]);
        poem.title = format!("第{i}首");
        if i % 2 == 0 {
            poem.dynasty = "宋".into();
            poem.author = "苏轼".into();
        }
        app.store.insert_poetry(poem).await.unwrap();
    }

    let (_, body) = app
        .send(get("/api/poetry?page=2&limit=2&sortBy=title&sortOrder=asc", None))
        .await;
    assert_eq!(body["data"]["pagination"], json!({"total": 5, "page": 2, "limit": 2, "pages": 3}));
    assert_eq!(body["data"]["poetries"][0]["title"], "第2首");

    let (_, body) = app.send(get("/api/poetry?limit=1000", None)).await;
    assert_eq!(body["data"]["pagination"]["limit"], 100);

    let (_, body) = app.send(get("/api/poetry/dynasties", None)).await;
    assert_eq!(body["data"], json!(["唐", "宋"]));

    let (_, body) = app.send(get("/api/poetry/authors", None)).await;
    assert_eq!(body["data"][0], json!({"name": "苏轼", "count": 3}));

    let (_, body) = app.send(get("/api/poetry/stats", None)).await;
    assert_eq!(body["data"]["totalPoetries"], 5);
    assert_eq!(body["data"]["totalDynasties"], 2);
    assert_eq!(body["data"]["totalAuthors"], 2);
}

#[tokio::test]
async fn ai_endpoints_need_an_existing_poem() {
    let app = TestApp::new();
    let (_, token) = app
        .member("didi", UserRole::Family, UserStatus::Active)
        .await;
    let missing = uuid::Uuid::new_v4();

    let (status, _) = app
        .send(json_request(
            Method::POST,
            &format!("/api/ai/verify/{missing}"),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(get(&format!("/api/ai/status/{missing}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let poem = app.store.insert_poetry(new_poem(vec![])).await.unwrap();
    let (status, body) = app
        .send(json_request(
            Method::POST,
            &format!("/api/ai/generate-image/{}", poem.id),
            Some(&token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new();
    let (status, body) = app.send(get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"]["status"], "ok");
}
