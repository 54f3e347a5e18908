//! Per-request state
//!
//! A [`RequestContext`] lives for one request. Authenticators write the
//! current user into it, the transaction middleware binds the request
//! session to it, and handlers may store arbitrary values.

use crate::error::{HttpError, HttpResult};
use loom_auth::IdentitySink;
use loom_orm::Session;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
pub struct RequestContext {
    user: RwLock<Option<Value>>,
    user_info: RwLock<Map<String, Value>>,
    component_custom_key: RwLock<Option<String>>,
    values: RwLock<HashMap<String, Value>>,
    session: RwLock<Option<Arc<dyn Session>>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of the authenticated user, if any
    pub fn current_user(&self) -> Option<Value> {
        self.user.read().clone()
    }

    pub fn current_user_info(&self) -> Map<String, Value> {
        self.user_info.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some()
    }

    /// Whether the access token was issued by a login, not by a refresh
    pub fn is_fresh(&self) -> bool {
        self.user_info
            .read()
            .get("is_fresh")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn component_custom_key(&self) -> Option<String> {
        self.component_custom_key.read().clone()
    }

    /// Store a value under a non-blank key
    pub fn add(&self, key: &str, value: impl Into<Value>) -> HttpResult<()> {
        if key.trim().is_empty() {
            return Err(HttpError::InvalidContextKey { key: key.to_string() });
        }
        self.values.write().insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    pub fn bind_session(&self, session: Arc<dyn Session>) {
        *self.session.write() = Some(session);
    }

    pub fn unbind_session(&self) -> Option<Arc<dyn Session>> {
        self.session.write().take()
    }

    /// Session opened for this request by the transaction middleware
    pub fn session(&self) -> HttpResult<Arc<dyn Session>> {
        self.session.read().clone().ok_or(HttpError::SessionUnavailable)
    }
}

impl IdentitySink for RequestContext {
    fn set_current_user(&self, identity: Value, info: Map<String, Value>) {
        *self.user.write() = Some(identity);
        *self.user_info.write() = info;
    }

    fn set_component_custom_key(&self, key: String) {
        *self.component_custom_key.write() = Some(key);
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("user", &*self.user.read())
            .field("component_custom_key", &*self.component_custom_key.read())
            .field("values", &*self.values.read())
            .field("has_session", &self.session.read().is_some())
            .finish()
    }
}
