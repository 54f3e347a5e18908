//! Admin api routes
//!
//! Routes live under the configured admin base url:
//!
//! | method   | path                              | operation        |
//! |----------|-----------------------------------|------------------|
//! | `GET`    | `{base}metadata`                  | main metadata    |
//! | `GET`    | `{base}configs`                   | panel settings   |
//! | `GET`    | `{base}{page}/`                   | find             |
//! | `POST`   | `{base}{page}/`                   | create           |
//! | `GET`    | `{base}{page}/{pk}`               | get              |
//! | `PUT`    | `{base}{page}/{pk}`               | update           |
//! | `DELETE` | `{base}{page}/{pk}`               | remove           |
//! | `DELETE` | `{base}{page}/bulk`               | remove bulk      |
//! | `DELETE` | `{base}{page}/all`                | remove all       |
//! | `GET`    | `{base}{page}/metadata/{kind}`    | page metadata    |
//!
//! Every route needs the request session bound by the transaction
//! middleware.

use crate::error::{HttpError, HttpResult};
use crate::request::CoreRequest;
use crate::response::CoreResponse;
use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use loom_admin::{AdminManager, FindParams};
use loom_core::converters;
use loom_orm::Record;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Router exposing the admin api. Empty when admin is disabled.
pub fn admin_router(admin: Arc<AdminManager>) -> Router {
    if !admin.is_admin_enabled() {
        tracing::info!("Admin api is disabled");
        return Router::new();
    }

    let base = admin.base_url();
    tracing::debug!(base = %base, pages = admin.page_count(), "mounting admin api");
    Router::new()
        .route(&format!("{}metadata", base), get(main_metadata))
        .route(&format!("{}configs", base), get(configs))
        .route(&format!("{}:register_name/", base), get(find).post(create))
        .route(&format!("{}:register_name/bulk", base), delete(remove_bulk))
        .route(&format!("{}:register_name/all", base), delete(remove_all))
        .route(
            &format!("{}:register_name/metadata/:kind", base),
            get(page_metadata),
        )
        .route(
            &format!("{}:register_name/:pk", base),
            get(get_entity).put(update).delete(remove),
        )
        .with_state(admin)
}

#[derive(Debug, Deserialize)]
struct BulkRemove {
    pk: Vec<Value>,
}

fn primary_key(raw: &str) -> Value {
    converters::deserialize(raw)
}

async fn main_metadata(State(admin): State<Arc<AdminManager>>) -> HttpResult<CoreResponse> {
    Ok(CoreResponse::new(Value::Array(admin.main_metadata()?)))
}

async fn configs(State(admin): State<Arc<AdminManager>>) -> CoreResponse {
    CoreResponse::new(json!({
        "panel_name": admin.panel_name(),
        "url": admin.base_url(),
    }))
}

async fn find(
    State(admin): State<Arc<AdminManager>>,
    Path(register_name): Path<String>,
    request: CoreRequest,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let params = FindParams::from_map(request.query_values())?;
    let result = admin.find(&register_name, session.as_ref(), params).await?;
    Ok(CoreResponse::json(&result))
}

async fn create(
    State(admin): State<Arc<AdminManager>>,
    Path(register_name): Path<String>,
    request: CoreRequest,
    Json(data): Json<Record>,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let pk = admin.create(&register_name, session.as_ref(), data).await?;
    Ok(CoreResponse::created(pk))
}

async fn get_entity(
    State(admin): State<Arc<AdminManager>>,
    Path((register_name, pk)): Path<(String, String)>,
    request: CoreRequest,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let entity = admin
        .get(&register_name, session.as_ref(), primary_key(&pk))
        .await?;
    Ok(CoreResponse::new(Value::Object(entity)))
}

async fn update(
    State(admin): State<Arc<AdminManager>>,
    Path((register_name, pk)): Path<(String, String)>,
    request: CoreRequest,
    Json(data): Json<Record>,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let updated = admin
        .update(&register_name, session.as_ref(), primary_key(&pk), data)
        .await?;
    Ok(CoreResponse::new(updated))
}

async fn remove(
    State(admin): State<Arc<AdminManager>>,
    Path((register_name, pk)): Path<(String, String)>,
    request: CoreRequest,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let removed = admin
        .remove(&register_name, session.as_ref(), primary_key(&pk))
        .await?;
    Ok(CoreResponse::new(removed))
}

async fn remove_bulk(
    State(admin): State<Arc<AdminManager>>,
    Path(register_name): Path<String>,
    request: CoreRequest,
    Json(body): Json<BulkRemove>,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let count = admin
        .remove_bulk(&register_name, session.as_ref(), body.pk)
        .await?;
    Ok(CoreResponse::new(json!({ "count": count })))
}

async fn remove_all(
    State(admin): State<Arc<AdminManager>>,
    Path(register_name): Path<String>,
    request: CoreRequest,
) -> HttpResult<CoreResponse> {
    let session = request.context().session()?;
    let count = admin.remove_all(&register_name, session.as_ref()).await?;
    Ok(CoreResponse::new(json!({ "count": count })))
}

async fn page_metadata(
    State(admin): State<Arc<AdminManager>>,
    Path((register_name, kind)): Path<(String, String)>,
) -> HttpResult<CoreResponse> {
    let metadata = match kind.as_str() {
        "find" => admin.find_metadata(&register_name)?,
        "create" => admin.create_metadata(&register_name)?,
        "update" => admin.update_metadata(&register_name)?,
        other => return Err(HttpError::not_found(format!("admin metadata [{}]", other))),
    };
    Ok(CoreResponse::new(metadata))
}
