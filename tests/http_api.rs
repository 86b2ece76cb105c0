//! End-to-end HTTP scenarios (spec §8 "End-to-end scenarios (literal)").

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use entitydb_api::{build_router, AppState, ApiConfig};
use entitydb_core::{EntityId, Tag, Timestamp};
use entitydb_engine::{EngineConfig, Repository};
use entitydb_metrics::{MetricsCollector, MetricsQueue};
use entitydb_rbac::SessionStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn app() -> (axum::Router, Arc<Repository>) {
    let dir = TempDir::new().unwrap().into_path();
    let storage = EngineConfig {
        data_path: dir,
        ..EngineConfig::default()
    };
    let repo = Arc::new(Repository::open(storage).unwrap());
    let sessions = Arc::new(SessionStore::new(3600));
    let metrics = Arc::new(MetricsCollector::new(repo.clone(), 100, 7 * 24 * 60 * 60));
    let (metrics_queue, _rx) = MetricsQueue::new(100);

    let state = AppState {
        repo: repo.clone(),
        sessions,
        metrics,
        metrics_queue,
        config: ApiConfig::default(),
    };
    (build_router(state), repo)
}

fn seed_user(repo: &Repository, username: &str, password: &str, roles: &[&str]) -> EntityId {
    let now = Timestamp::now();
    let hash = entitydb_rbac::hash_password(password).unwrap();
    let mut tags = vec![
        Tag::new(now, "type:user").unwrap(),
        Tag::new(now, "dataset:system").unwrap(),
        Tag::new(now, &format!("username:{username}")).unwrap(),
        Tag::new(now, &format!("password_hash:{hash}")).unwrap(),
    ];
    for role in roles {
        tags.push(Tag::new(now, role).unwrap());
    }
    let id = EntityId::from(format!("user:{username}").as_str());
    repo.create_with_id(id.clone(), tags, Vec::new()).unwrap();
    id
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn health_reports_integrity_metrics() {
    let (app, repo) = app();
    repo.create(vec![Tag::new(Timestamp::now(), "type:task").unwrap()], vec![]).unwrap();

    let response = request(&app, "GET", "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["entity_count"], 1);
    assert_eq!(body["index_healthy"], true);
    assert_eq!(body["orphan_count"], 0);
    assert_eq!(body["health_score"], 100);
}

#[tokio::test]
async fn scenario_1_login() {
    let (app, repo) = app();
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);

    let response = request(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"username": "admin", "password": "admin"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["token"].as_str().unwrap().len() >= 32);
    assert!(body["user"]["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn scenario_2_create_and_query() {
    let (app, repo) = app();
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);
    let login = body_json(
        request(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "admin", "password": "admin"})),
        )
        .await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let created = body_json(
        request(
            &app,
            "POST",
            "/api/v1/entities",
            Some(&token),
            Some(json!({"tags": ["type:task", "dataset:system", "priority:high"]})),
        )
        .await,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let found = body_json(
        request(
            &app,
            "GET",
            "/api/v1/entities?tags=type:task,priority:high&match=all",
            Some(&token),
            None,
        )
        .await,
    )
    .await;
    let entities = found.as_array().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0]["id"], id);
}

#[tokio::test]
async fn scenario_3_temporal_as_of_and_history() {
    let (app, repo) = app();
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);
    let login = body_json(
        request(&app, "POST", "/api/v1/auth/login", None, Some(json!({"username": "admin", "password": "admin"}))).await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let entity = repo
        .create(vec![Tag::new(Timestamp::from_nanos(1), "priority:low").unwrap()], vec![])
        .unwrap();
    repo.update(&entity.id, vec![Tag::new(Timestamp::from_nanos(2), "priority:critical").unwrap()])
        .unwrap();

    let t1 = Timestamp::from_nanos(2).to_rfc3339();
    let as_of_low = body_json(
        request(
            &app,
            "GET",
            &format!("/api/v1/entities/as-of?id={}&as_of={}", entity.id, Timestamp::from_nanos(1).to_rfc3339()),
            Some(&token),
            None,
        )
        .await,
    )
    .await;
    assert!(as_of_low["tags"][0].as_str().unwrap().ends_with("priority:low"));

    let as_of_critical = body_json(
        request(&app, "GET", &format!("/api/v1/entities/as-of?id={}&as_of={t1}", entity.id), Some(&token), None).await,
    )
    .await;
    assert!(as_of_critical["tags"][0].as_str().unwrap().ends_with("priority:critical"));

    let history = body_json(
        request(&app, "GET", &format!("/api/v1/entities/history?id={}&limit=10", entity.id), Some(&token), None).await,
    )
    .await;
    let events = history.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0]["bare_tag"].as_str().unwrap().ends_with("priority:low"));
    assert!(events[1]["bare_tag"].as_str().unwrap().ends_with("priority:critical"));
}

#[tokio::test]
async fn scenario_4_chunked_round_trip() {
    let (app, repo) = app();
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);
    let login = body_json(
        request(&app, "POST", "/api/v1/auth/login", None, Some(json!({"username": "admin", "password": "admin"}))).await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let payload = vec![7u8; 5 * 1024 * 1024];
    use base64::Engine;
    let content_base64 = base64::engine::general_purpose::STANDARD.encode(&payload);
    let created = body_json(
        request(
            &app,
            "POST",
            "/api/v1/entities",
            Some(&token),
            Some(json!({"tags": ["type:blob"], "content_base64": content_base64})),
        )
        .await,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert!(created["tags"].as_array().unwrap().iter().any(|t| t.as_str().unwrap().contains("content:chunks:5")));

    let streamed = request(&app, "GET", &format!("/api/v1/entities/stream?id={id}"), Some(&token), None).await;
    assert_eq!(streamed.status(), StatusCode::OK);
    let bytes = streamed.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 5 * 1024 * 1024);
    assert_eq!(&bytes[..], &payload[..]);
}

#[tokio::test]
async fn scenario_5_permission_denial() {
    let (app, repo) = app();
    seed_user(&repo, "bob", "hunter2", &["rbac:perm:entity:view"]);
    let login = body_json(
        request(&app, "POST", "/api/v1/auth/login", None, Some(json!({"username": "bob", "password": "hunter2"}))).await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let response = request(
        &app,
        "POST",
        "/api/v1/entities",
        Some(&token),
        Some(json!({"tags": ["type:task"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "Insufficient permissions: rbac:perm:entity:create required"
    );
}

#[tokio::test]
async fn create_rejects_hub_and_dataspace_aliases() {
    let (app, repo) = app();
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);
    let login = body_json(
        request(&app, "POST", "/api/v1/auth/login", None, Some(json!({"username": "admin", "password": "admin"}))).await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let response = request(
        &app,
        "POST",
        "/api/v1/entities",
        Some(&token),
        Some(json!({"tags": ["type:task", "hub:prod"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request(
        &app,
        "POST",
        "/api/v1/entities",
        Some(&token),
        Some(json!({"tags": ["type:task", "dataspace:prod"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_handlers_drive_the_metrics_queue() {
    let dir = TempDir::new().unwrap().into_path();
    let storage = EngineConfig {
        data_path: dir,
        ..EngineConfig::default()
    };
    let repo = Arc::new(Repository::open(storage).unwrap());
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);
    let sessions = Arc::new(SessionStore::new(3600));
    let metrics = Arc::new(MetricsCollector::new(repo.clone(), 100, 7 * 24 * 60 * 60));
    let (metrics_queue, mut rx) = MetricsQueue::new(100);
    let state = AppState {
        repo: repo.clone(),
        sessions,
        metrics,
        metrics_queue,
        config: ApiConfig::default(),
    };
    let app = build_router(state);

    let login = body_json(
        request(&app, "POST", "/api/v1/auth/login", None, Some(json!({"username": "admin", "password": "admin"}))).await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();
    request(
        &app,
        "POST",
        "/api/v1/entities",
        Some(&token),
        Some(json!({"tags": ["type:task"]})),
    )
    .await;

    let mut names = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("producer path must enqueue an event per request")
            .unwrap();
        names.push(event.name);
    }
    assert!(names.contains(&"http_auth_login_total".to_string()));
    assert!(names.contains(&"http_entity_create_total".to_string()));
}

#[tokio::test]
async fn scenario_6_metric_history_and_prometheus() {
    let (app, repo) = app();
    seed_user(&repo, "admin", "admin", &["rbac:role:admin"]);
    let login = body_json(
        request(&app, "POST", "/api/v1/auth/login", None, Some(json!({"username": "admin", "password": "admin"}))).await,
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let metrics = Arc::new(MetricsCollector::new(repo.clone(), 100, 7 * 24 * 60 * 60));
    metrics.record_gauge("cpu", 10.0, "percent", "cpu load", true).unwrap();
    metrics.record_gauge("cpu", 20.0, "percent", "cpu load", true).unwrap();
    metrics.record_gauge("cpu", 20.0, "percent", "cpu load", true).unwrap();
    metrics.record_gauge("cpu", 30.0, "percent", "cpu load", true).unwrap();

    let entity = repo.get_by_id(&EntityId::from("metric:cpu"), false).unwrap();
    assert_eq!(entity.tags.iter().filter(|t| t.bare().starts_with("value:")).count(), 3);

    let scrape = request(&app, "GET", "/metrics", None, None).await;
    let bytes = scrape.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("entitydb_gauge_cpu 30"));

    let _ = token;
}
