use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiResult, Failure, NormalizedError};

/// One outbound call, relative to the configured API base URL.
///
/// Pipeline stages never edit a request in place; they clone it and hand the copy on,
/// so the caller's value is what gets replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Correlates log lines for the call and its replay.
    pub id: Uuid,
    pub method: Method,
    /// Path below the API base, starting with '/', e.g. `/products/3`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    /// Whether a 401 on this call may be repaired through a credential refresh.
    pub refreshable: bool,
}

impl ApiRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self { id: Uuid::new_v4(), method, path: path.into(), headers: HeaderMap::new(), body: None, timeout: None, refreshable: true }
    }

    pub fn get<P: Into<String>>(path: P) -> Self { Self::new(Method::GET, path) }
    pub fn delete<P: Into<String>>(path: P) -> Self { Self::new(Method::DELETE, path) }
    pub fn post<P: Into<String>>(path: P, body: Value) -> Self { Self::new(Method::POST, path).with_body(body) }
    pub fn put<P: Into<String>>(path: P, body: Value) -> Self { Self::new(Method::PUT, path).with_body(body) }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json<T: Serialize>(self, body: &T) -> ApiResult<Self> {
        let v = serde_json::to_value(body).map_err(|e| NormalizedError::local(format!("cannot encode request body: {}", e)))?;
        Ok(self.with_body(v))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// A 401 on this call is a plain failure (wrong password on login, for instance).
    pub fn without_refresh(mut self) -> Self {
        self.refreshable = false;
        self
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }

    /// Whether this request goes to `endpoint` (query string and trailing '/' ignored).
    pub fn targets(&self, endpoint: &str) -> bool {
        let path = self.path.split('?').next().unwrap_or("");
        let path = path.trim_end_matches('/');
        let endpoint = endpoint.trim_end_matches('/');
        !endpoint.is_empty() && (path == endpoint || path.ends_with(endpoint))
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON body; a non-JSON body is kept as a JSON string, an empty body is `None`.
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self { Self { status, headers: HeaderMap::new(), body } }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    pub fn into_failure(self) -> Failure { Failure::Status { status: self.status, body: self.body } }

    pub fn json<T: DeserializeOwned>(self) -> ApiResult<T> {
        let body = self.body.unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| NormalizedError::local(format!("unexpected response body: {}", e)))
    }
}
