#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};

use pantry_client::pipeline::{ApiRequest, ApiResponse, Transport};
use pantry_client::session::{ManualClock, MemoryStorage, Storage};
use pantry_client::{Credential, Identity, SessionStore, TransportError};

pub const NOW: i64 = 1_700_000_000;

pub fn jwt(sub: &str, exp: i64) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}","exp":{},"iat":{}}}"#, sub, exp, NOW));
    format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload)
}

pub fn cred(sub: &str, exp: i64) -> Credential { Credential::parse(jwt(sub, exp)).unwrap() }

pub fn alice() -> Identity { Identity::new("alice", vec!["USER".into()]) }

pub fn memory_session() -> Arc<SessionStore> { session_over(Arc::new(MemoryStorage::default())) }

pub fn session_over(storage: Arc<dyn Storage>) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(storage, Arc::new(ManualClock::new(NOW))))
}

#[derive(Clone)]
pub enum RefreshBehaviour {
    /// Issue this token and start accepting it.
    Issue(String),
    /// Issue this token but keep rejecting it on resources.
    IssueUnaccepted(String),
    Reject,
    Hang,
}

/// In-process stand-in for the pantry API. Resources require `Bearer <accepted>`; the
/// refresh and login endpoints are scripted.
pub struct FakeApi {
    accepted: Mutex<String>,
    refresh: Mutex<RefreshBehaviour>,
    refresh_delay: Duration,
    request_delay: Duration,
    canned: Mutex<HashMap<String, (u16, Option<Value>)>>,
    offline: Mutex<bool>,
    pub refresh_calls: AtomicUsize,
    pub log: Mutex<Vec<(String, Option<String>)>>,
    calls: Mutex<Vec<(String, String, Option<Value>)>>,
}

impl FakeApi {
    pub fn new(accepted: &str, refresh: RefreshBehaviour) -> Arc<Self> {
        Arc::new(Self {
            accepted: Mutex::new(accepted.to_string()),
            refresh: Mutex::new(refresh),
            refresh_delay: Duration::from_millis(50),
            request_delay: Duration::from_millis(5),
            canned: Mutex::new(HashMap::new()),
            offline: Mutex::new(false),
            refresh_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answer `path` with a fixed status and body, once authorized.
    pub fn respond(&self, path: &str, status: u16, body: Option<Value>) {
        self.canned.lock().insert(path.to_string(), (status, body));
    }

    pub fn go_offline(&self) { *self.offline.lock() = true; }

    pub fn refreshes(&self) -> usize { self.refresh_calls.load(Ordering::SeqCst) }

    /// Authorization headers seen for `path`, in arrival order.
    pub fn auth_seen(&self, path: &str) -> Vec<Option<String>> {
        self.log.lock().iter().filter(|(p, _)| p == path).map(|(_, a)| a.clone()).collect()
    }

    /// `(method, body)` of every call to `path`, in arrival order.
    pub fn calls_to(&self, path: &str) -> Vec<(String, Option<Value>)> {
        self.calls.lock().iter().filter(|(_, p, _)| p == path).map(|(m, _, b)| (m.clone(), b.clone())).collect()
    }

    fn issue(token: &str) -> ApiResponse {
        ApiResponse::new(200, Some(json!({"token": token, "username": "alice", "roles": ["USER"]})))
    }

    async fn refresh(&self) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;
        let behaviour = self.refresh.lock().clone();
        match behaviour {
            RefreshBehaviour::Issue(token) => {
                *self.accepted.lock() = token.clone();
                Self::issue(&token)
            }
            RefreshBehaviour::IssueUnaccepted(token) => Self::issue(&token),
            RefreshBehaviour::Reject => ApiResponse::new(401, Some(json!({"message": "refresh token revoked"}))),
            RefreshBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ApiResponse::new(504, None)
            }
        }
    }

    fn login(&self, body: Option<&Value>) -> ApiResponse {
        let password = body.and_then(|b| b.get("password")).and_then(|p| p.as_str());
        if password == Some("secret") {
            Self::issue(&self.accepted.lock())
        } else {
            ApiResponse::new(401, Some(json!({"message": "Bad credentials"})))
        }
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if *self.offline.lock() {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let auth = request.authorization().map(str::to_string);
        self.log.lock().push((request.path.clone(), auth.clone()));
        self.calls.lock().push((request.method.to_string(), request.path.clone(), request.body.clone()));
        tokio::time::sleep(self.request_delay).await;

        match request.path.as_str() {
            "/auth/refresh" => return Ok(self.refresh().await),
            "/auth/login" => return Ok(self.login(request.body.as_ref())),
            "/auth/register" => return Ok(ApiResponse::new(201, None)),
            _ => {}
        }
        let expected = format!("Bearer {}", self.accepted.lock());
        if auth.as_deref() != Some(expected.as_str()) {
            return Ok(ApiResponse::new(401, Some(json!({"message": "token expired"}))));
        }
        if let Some((status, body)) = self.canned.lock().get(&request.path).cloned() {
            return Ok(ApiResponse::new(status, body));
        }
        Ok(ApiResponse::new(200, Some(json!([]))))
    }
}
