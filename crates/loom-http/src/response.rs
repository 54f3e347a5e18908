//! JSON response wrapper

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// A JSON response. The status defaults to 200.
#[derive(Debug, Clone)]
pub struct CoreResponse {
    status: StatusCode,
    body: Value,
    headers: HeaderMap,
}

impl CoreResponse {
    pub fn new(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            headers: HeaderMap::new(),
        }
    }

    /// Serialize any value into the response body.
    pub fn json<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self::new(body),
            Err(e) => {
                tracing::error!("Failed to serialize response body: {}", e);
                Self::new(Value::Null).with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn created(body: Value) -> Self {
        Self::new(body).with_status(StatusCode::CREATED)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header. Invalid names or values are logged and skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid response header {}", name),
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Default for CoreResponse {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl From<Value> for CoreResponse {
    fn from(body: Value) -> Self {
        Self::new(body)
    }
}

impl IntoResponse for CoreResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_to_ok_json() {
        let response = CoreResponse::new(json!({"ok": true})).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_status_and_headers() {
        let response = CoreResponse::created(json!(1))
            .with_header("x-total-count", "10")
            .with_header("bad header", "x");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().len(), 1);

        let response = response.into_response();
        assert_eq!(response.headers().get("x-total-count").unwrap(), "10");
    }
}
