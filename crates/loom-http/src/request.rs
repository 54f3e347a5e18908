//! Request wrapper
//!
//! [`CoreRequest`] is built once per request by the request middleware and
//! stored in the request extensions. Handlers extract it directly.

use crate::context::RequestContext;
use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use chrono::{DateTime, Utc};
use loom_auth::CredentialSource;
use loom_core::converters;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct CoreRequest {
    pub request_id: Uuid,
    pub request_date: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    cookies: HashMap<String, String>,
    context: Arc<RequestContext>,
}

impl CoreRequest {
    /// Wrap the parts of an incoming request with a fresh id and context.
    pub fn from_parts(parts: &Parts) -> Self {
        let headers = parts.headers.clone();
        let cookies = parse_cookies(&headers);
        let connect_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());

        Self {
            request_id: Uuid::new_v4(),
            request_date: Utc::now(),
            client_ip: forwarded_ip(&headers).or(connect_addr),
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers,
            cookies,
            context: Arc::new(RequestContext::new()),
        }
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Query string values converted to typed JSON values. Repeated keys
    /// collect into a list.
    pub fn query_values(&self) -> Map<String, Value> {
        let mut grouped: Vec<(String, Vec<Value>)> = Vec::new();
        let Some(query) = self.query.as_deref() else {
            return Map::new();
        };

        for (key, raw) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = converters::deserialize(&raw);
            match grouped.iter_mut().find(|(name, _)| name.as_str() == key.as_ref()) {
                Some((_, items)) => items.push(value),
                None => grouped.push((key.into_owned(), vec![value])),
            }
        }

        grouped
            .into_iter()
            .map(|(key, mut items)| {
                let value = if items.len() == 1 {
                    items.remove(0)
                } else {
                    Value::Array(items)
                };
                (key, value)
            })
            .collect()
    }
}

impl CredentialSource for CoreRequest {
    fn header(&self, name: &str) -> Option<String> {
        CoreRequest::header(self, name).map(str::to_string)
    }

    fn cookie(&self, name: &str) -> Option<String> {
        CoreRequest::cookie(self, name).map(str::to_string)
    }
}

impl fmt::Display for CoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request id: [{}], request date: [{}], route: [{}]",
            self.request_id, self.request_date, self.path
        )
    }
}

impl fmt::Debug for CoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreRequest")
            .field("request_id", &self.request_id)
            .field("request_date", &self.request_date)
            .field("client_ip", &self.client_ip)
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CoreRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(request) = parts.extensions.get::<CoreRequest>() {
            return Ok(request.clone());
        }
        let request = CoreRequest::from_parts(parts);
        parts.extensions.insert(request.clone());
        Ok(request)
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(ip) = forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }
    header("x-real-ip").map(|ip| ip.trim().to_string())
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde_json::json;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_wraps_headers_cookies_and_client_ip() {
        let parts = parts(
            Request::get("/api/users?active=true")
                .header("x-forwarded-for", "10.0.0.7, 172.16.0.1")
                .header("cookie", "Refresh-Auth=abc; theme=\"dark\"")
                .header("Authorization", "Bearer xyz")
                .body(())
                .unwrap(),
        );
        let request = CoreRequest::from_parts(&parts);

        assert_eq!(request.path, "/api/users");
        assert_eq!(request.client_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(request.cookie("Refresh-Auth"), Some("abc"));
        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(
            CredentialSource::header(&request, "authorization").as_deref(),
            Some("Bearer xyz")
        );
        assert!(request.to_string().contains("route: [/api/users]"));
    }

    #[test]
    fn test_each_request_gets_its_own_id() {
        let parts = parts(Request::get("/").body(()).unwrap());
        let first = CoreRequest::from_parts(&parts);
        let second = CoreRequest::from_parts(&parts);
        assert_ne!(first.request_id, second.request_id);
        assert!(first.client_ip.is_none());
    }

    #[test]
    fn test_query_values_are_typed() {
        let parts = parts(
            Request::get("/?id=3&price=2.5&name=ada&deleted=null&tags=a&tags=b&active=false")
                .body(())
                .unwrap(),
        );
        let values = CoreRequest::from_parts(&parts).query_values();
        assert_eq!(values["id"], json!(3));
        assert_eq!(values["price"], json!(2.5));
        assert_eq!(values["name"], json!("ada"));
        assert_eq!(values["deleted"], Value::Null);
        assert_eq!(values["active"], json!(false));
        assert_eq!(values["tags"], json!(["a", "b"]));
    }
}
