//! Admin api over HTTP with request scoped sessions

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use loom_admin::{AdminConfig, AdminManager, AdminPage};
use loom_core::{ApplicationInfo, AuditManager};
use loom_http::{admin_router, apply_middleware_stack, audit_router, AuditState, MiddlewareStack, AUDIT_PATH};
use loom_orm::fixtures::{Membership, Tag};
use loom_orm::{DatabaseManager, MemoryDatabase};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(db: &MemoryDatabase) -> Router {
    let admin = Arc::new(AdminManager::new(AdminConfig::default()));
    admin
        .register(
            Arc::new(
                AdminPage::<Tag>::builder("tags", "Tag")
                    .configure(|config| config.remove_all_permission = true)
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();
    admin
        .register(
            Arc::new(
                AdminPage::<Membership>::builder("memberships", "Membership")
                    .build()
                    .unwrap(),
            ),
            false,
        )
        .unwrap();
    admin.populate_caches();

    apply_middleware_stack(
        admin_router(admin),
        MiddlewareStack {
            database: Some(Arc::new(DatabaseManager::in_memory(db.clone()))),
            ..Default::default()
        },
    )
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response: Response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn crud_round_trip_commits_per_request() {
    let db = MemoryDatabase::new();
    let app = app(&db);

    let (status, created) = send(&app, "POST", "/admin/api/tags/", Some(json!({"name": "rust"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], json!(1));
    assert_eq!(db.rows("tags").len(), 1);

    send(&app, "POST", "/admin/api/tags/", Some(json!({"name": "axum"}))).await;

    let (status, tag) = send(&app, "GET", "/admin/api/tags/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tag, json!({"id": 1, "name": "rust"}));

    let (status, found) = send(&app, "GET", "/admin/api/tags/?name=axum", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["results"], json!([{"id": 2, "name": "axum"}]));

    let (status, _) = send(&app, "PUT", "/admin/api/tags/2", Some(json!({"name": "tokio"}))).await;
    assert_eq!(status, StatusCode::OK);
    let rows = db.rows("tags");
    let updated = rows.iter().find(|row| row["id"] == json!(2)).unwrap();
    assert_eq!(updated["name"], json!("tokio"));

    let (status, removed) = send(&app, "DELETE", "/admin/api/tags/all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed, json!({"count": 2}));
    assert!(db.rows("tags").is_empty());
}

#[tokio::test]
async fn failed_requests_roll_back() {
    let db = MemoryDatabase::new();
    let app = app(&db);

    let (status, body) = send(&app, "POST", "/admin/api/tags/", Some(json!({"name": "x".repeat(31)}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    assert!(db.rows("tags").is_empty());

    let (status, body) = send(&app, "GET", "/admin/api/tags/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("ENTITY_NOT_FOUND"));
}

#[tokio::test]
async fn composite_key_pages_refuse_single_entity_routes() {
    let db = MemoryDatabase::new();
    let app = app(&db);

    let (status, body) = send(&app, "GET", "/admin/api/memberships/1", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("ADMIN_OPERATION_NOT_ALLOWED"));

    let (status, body) = send(&app, "GET", "/admin/api/memberships/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn metadata_routes() {
    let db = MemoryDatabase::new();
    let app = app(&db);

    let (status, metadata) = send(&app, "GET", "/admin/api/metadata", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metadata.as_array().unwrap().len(), 1);
    assert!(metadata[0]["GENERAL"].is_array());

    let (status, configs) = send(&app, "GET", "/admin/api/configs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(configs, json!({"panel_name": "LOOM ADMIN", "url": "/admin/api/"}));

    let (status, find) = send(&app, "GET", "/admin/api/tags/metadata/find", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(find["register_name"], json!("tags"));

    let (status, _) = send(&app, "GET", "/admin/api/tags/metadata/delete", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/admin/api/unknown/metadata/find", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("ADMIN_PAGE_NOT_FOUND"));
}

#[tokio::test]
async fn disabled_admin_mounts_nothing() {
    let admin = Arc::new(AdminManager::new(AdminConfig {
        enabled: false,
        ..AdminConfig::default()
    }));
    let app = admin_router(admin);
    let (status, _) = send(&app, "GET", "/admin/api/configs", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audit_route_reports_application() {
    let state = AuditState {
        manager: Arc::new(AuditManager::new()),
        info: Arc::new(ApplicationInfo {
            name: "shop".to_string(),
            environment: "testing".to_string(),
            version: Some("1.0.0".to_string()),
            packages: vec!["loom.admin".to_string()],
        }),
    };
    let app = audit_router(AUDIT_PATH, state);

    let (status, report) = send(&app, "GET", "/audit?runtime=false", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["application"]["name"], json!("shop"));
    assert_eq!(report["packages"]["names"], json!(["loom.admin"]));
    assert!(report.get("platform").is_none());
}
