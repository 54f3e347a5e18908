//! Request middleware
//!
//! Layers are applied outermost first by [`apply_middleware_stack`]:
//! request wrapping, tracing, error details, authentication and the
//! request transaction.

use crate::error::{error_response, ErrorDetail, HttpError};
use crate::request::{CoreRequest, REQUEST_ID_HEADER};
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use loom_auth::{AuthError, AuthenticatorManager, CredentialSource};
use loom_core::{ApiError, ApiErrorResponse};
use loom_orm::{DatabaseManager, SessionFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Which layers wrap the application routes
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    /// Open one session per request and finalize it by response status
    pub database: Option<Arc<DatabaseManager>>,
    /// Authenticate requests that carry credentials
    pub authentication: Option<AuthenticationState>,
    /// Send server error details to clients
    pub debug: bool,
    pub timeout: Option<Duration>,
}

/// Authenticator registry and the authenticator used for requests
#[derive(Clone)]
pub struct AuthenticationState {
    pub authenticators: Arc<AuthenticatorManager>,
    /// `None` uses the registry default
    pub authenticator: Option<String>,
}

impl AuthenticationState {
    pub fn new(authenticators: Arc<AuthenticatorManager>) -> Self {
        Self {
            authenticators,
            authenticator: None,
        }
    }

    pub fn with_authenticator(mut self, name: impl Into<String>) -> Self {
        self.authenticator = Some(name.into());
        self
    }
}

/// Why authentication of the current request failed
#[derive(Debug, Clone)]
pub struct AuthenticationFailure(pub AuthError);

pub fn apply_middleware_stack<S>(router: Router<S>, stack: MiddlewareStack) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = router;
    if let Some(database) = stack.database {
        router = router.layer(middleware::from_fn_with_state(database, transaction));
    }
    if let Some(authentication) = stack.authentication {
        router = router.layer(middleware::from_fn_with_state(authentication, authenticate));
    }
    if stack.debug {
        router = router.layer(middleware::from_fn(expose_error_details));
    }
    if let Some(timeout) = stack.timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }
    router
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_context))
}

fn core_request(request: &mut Request) -> CoreRequest {
    if let Some(core) = request.extensions().get::<CoreRequest>() {
        return core.clone();
    }
    let (parts, body) = std::mem::take(request).into_parts();
    let core = CoreRequest::from_parts(&parts);
    *request = Request::from_parts(parts, body);
    request.extensions_mut().insert(core.clone());
    core
}

/// Wrap the request in a [`CoreRequest`] and tag the response with its id.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let core = core_request(&mut request);
    let span = tracing::info_span!(
        "request",
        request_id = %core.request_id,
        method = %core.method,
        path = %core.path,
    );

    async move {
        let started = Instant::now();
        let mut response = next.run(request).await;
        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            client_ip = core.client_ip.as_deref().unwrap_or("-"),
            "request completed"
        );
        if let Ok(value) = HeaderValue::from_str(&core.request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Bind a request bounded session to the request and finalize it once the
/// response status is known: error statuses roll back, others commit.
pub async fn transaction(
    State(database): State<Arc<DatabaseManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let core = core_request(&mut request);
    let session = match database.current_session_factory(true) {
        Ok(factory) => match factory.create_session().await {
            Ok(session) => session,
            Err(e) => return error_response(&HttpError::from(e)),
        },
        Err(e) => return error_response(&HttpError::from(e)),
    };
    core.context().bind_session(session.clone());

    let response = next.run(request).await;
    core.context().unbind_session();

    match database
        .finalize_transaction(session.as_ref(), response.status().as_u16())
        .await
    {
        Ok(()) => response,
        Err(e) => error_response(&HttpError::from(e)),
    }
}

/// Authenticate requests that carry an access token. Failures leave the
/// request anonymous and are reported by [`require_login`].
pub async fn authenticate(
    State(state): State<AuthenticationState>,
    mut request: Request,
    next: Next,
) -> Response {
    let core = core_request(&mut request);
    if CredentialSource::header(&core, loom_auth::ACCESS_TOKEN_HEADER).is_some() {
        let outcome = state
            .authenticators
            .authenticate(state.authenticator.as_deref(), &core, core.context().as_ref())
            .await;
        if let Err(e) = outcome {
            tracing::debug!(code = e.error_code(), "authentication failed: {}", e);
            request.extensions_mut().insert(AuthenticationFailure(e));
        }
    }
    next.run(request).await
}

/// Refuse anonymous requests with 401.
pub async fn require_login(mut request: Request, next: Next) -> Response {
    let core = core_request(&mut request);
    if core.context().is_authenticated() {
        return next.run(request).await;
    }
    match request.extensions().get::<AuthenticationFailure>() {
        Some(AuthenticationFailure(e)) => HttpError::from(e.clone()).into_response(),
        None => HttpError::from(AuthError::AccessTokenRequired).into_response(),
    }
}

/// Replace masked server error bodies with the original error.
pub async fn expose_error_details(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(detail) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };
    let body = ApiErrorResponse::from(ApiError::new(detail.code, detail.message));
    let (parts, _) = response.into_parts();
    let mut response = (parts.status, Json(body)).into_response();
    response.extensions_mut().extend(parts.extensions);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use http_body_util::BodyExt;
    use loom_auth::{Authenticator, AuthResult, IdentitySink};
    use loom_orm::{MemoryDatabase, Query, Session};
    use serde_json::{json, Map, Value};
    use tower::ServiceExt;

    async fn body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn record(value: Value) -> loom_orm::Record {
        value.as_object().cloned().unwrap()
    }

    async fn insert_tag(request: CoreRequest) -> Result<StatusCode, HttpError> {
        let session = request.context().session()?;
        session
            .add("tags", &["id"], record(json!({"id": null, "name": "rust"})))
            .await?;
        Ok(StatusCode::CREATED)
    }

    async fn insert_then_fail(request: CoreRequest) -> Result<StatusCode, HttpError> {
        insert_tag(request).await?;
        Err(HttpError::bad_request("rejected"))
    }

    #[tokio::test]
    async fn test_request_id_header_is_added() {
        let app = apply_middleware_stack(
            Router::new().route("/", get(|request: CoreRequest| async move { request.request_id.to_string() })),
            MiddlewareStack::default(),
        );
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let header = response.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap().to_string();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(header, String::from_utf8(bytes.to_vec()).unwrap());
    }

    #[tokio::test]
    async fn test_transaction_commits_or_rolls_back_by_status() {
        let db = MemoryDatabase::new();
        let stack = MiddlewareStack {
            database: Some(Arc::new(DatabaseManager::in_memory(db.clone()))),
            ..Default::default()
        };
        let app = apply_middleware_stack(
            Router::new()
                .route("/ok", post(insert_tag))
                .route("/fail", post(insert_then_fail)),
            stack,
        );

        let response = app
            .clone()
            .oneshot(Request::post("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(db.rows("tags").len(), 1);

        let response = app
            .oneshot(Request::post("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(db.session().count(&Query::table("tags")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_session_is_a_server_error() {
        let app = apply_middleware_stack(Router::new().route("/", post(insert_tag)), MiddlewareStack::default());
        let response = app
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await["error"]["code"], json!("INTERNAL_SERVER_ERROR"));
    }

    #[tokio::test]
    async fn test_debug_exposes_error_details() {
        let app = apply_middleware_stack(
            Router::new().route("/", post(insert_tag)),
            MiddlewareStack {
                debug: true,
                ..Default::default()
            },
        );
        let response = app
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(response).await,
            json!({"error": {
                "code": "SESSION_UNAVAILABLE",
                "message": "No database session is bound to the current request",
            }})
        );
    }

    struct StaticToken;

    #[async_trait::async_trait]
    impl Authenticator for StaticToken {
        fn name(&self) -> &str {
            "static"
        }

        async fn authenticate(&self, source: &dyn CredentialSource, sink: &dyn IdentitySink) -> AuthResult<()> {
            match loom_auth::extract_token(source.header(loom_auth::ACCESS_TOKEN_HEADER)).as_deref() {
                Some("letmein") => {
                    sink.set_current_user(json!(7), Map::new());
                    Ok(())
                }
                _ => Err(AuthError::InvalidAccessToken),
            }
        }
    }

    fn authenticated_app() -> Router {
        let authenticators = Arc::new(AuthenticatorManager::new("static"));
        authenticators.register(Arc::new(StaticToken), false).unwrap();
        let protected = Router::new()
            .route(
                "/me",
                get(|request: CoreRequest| async move {
                    let context: &RequestContext = request.context();
                    Json(json!({ "user": context.current_user() }))
                }),
            )
            .layer(middleware::from_fn(require_login));
        apply_middleware_stack(
            protected,
            MiddlewareStack {
                authentication: Some(AuthenticationState::new(authenticators)),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_login_required_routes() {
        let app = authenticated_app();

        let response = app
            .clone()
            .oneshot(
                Request::get("/me")
                    .header("Authorization", "Bearer letmein")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, json!({"user": 7}));

        let response = app
            .clone()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await["error"]["code"], json!("ACCESS_TOKEN_REQUIRED"));

        let response = app
            .oneshot(
                Request::get("/me")
                    .header("Authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await["error"]["code"], json!("INVALID_ACCESS_TOKEN"));
    }
}
