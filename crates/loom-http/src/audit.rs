//! Audit route

use crate::request::CoreRequest;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use loom_core::{ApplicationInfo, AuditManager, AuditOptions};
use serde_json::Value;
use std::sync::Arc;

/// Default path of the audit route
pub const AUDIT_PATH: &str = "/audit";

#[derive(Clone)]
pub struct AuditState {
    pub manager: Arc<AuditManager>,
    pub info: Arc<ApplicationInfo>,
}

/// Router answering `GET path` with the audit report. Query flags
/// (`application`, `packages`, `framework`, `runtime`, `hooks`) switch
/// report sections off.
pub fn audit_router(path: &str, state: AuditState) -> Router {
    Router::new().route(path, get(audit)).with_state(state)
}

fn options(request: &CoreRequest) -> AuditOptions {
    let query = request.query_values();
    let flag = |name: &str| query.get(name).and_then(Value::as_bool).unwrap_or(true);
    AuditOptions {
        application: flag("application"),
        packages: flag("packages"),
        framework: flag("framework"),
        runtime: flag("runtime"),
        hooks: flag("hooks"),
    }
}

async fn audit(State(state): State<AuditState>, request: CoreRequest) -> (StatusCode, Json<Value>) {
    let (report, status) = state.manager.inspect(&state.info, &options(&request)).await;
    if status >= 400 {
        tracing::warn!(status, "audit reported failures");
    }
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(report))
}
