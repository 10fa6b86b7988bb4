use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ApiResult, NormalizedError};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest};
use crate::pipeline::{ApiRequest, RequestPipeline};
use crate::session::{Credential, Identity};

pub struct AuthService {
    pipeline: Arc<RequestPipeline>,
}

impl AuthService {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self { Self { pipeline } }

    /// On success the session is replaced; on any failure whatever session existed is cleared.
    pub async fn login(&self, credentials: &LoginRequest) -> ApiResult<Identity> {
        let result = self.try_login(credentials).await;
        match &result {
            Ok(id) => info!(target: "session", "logged in as {} (roles: {:?})", id.username, id.roles),
            Err(e) => {
                warn!(target: "session", "login for {} failed: {}", credentials.username, e);
                self.pipeline.session().clear_session();
            }
        }
        result
    }

    async fn try_login(&self, credentials: &LoginRequest) -> ApiResult<Identity> {
        let request = ApiRequest::post("/auth/login", serde_json::Value::Null).with_json(credentials)?.without_refresh();
        let resp: AuthResponse = self.pipeline.send_json(request).await?;
        let (credential, identity) = resp.into_session()?;
        self.pipeline
            .session()
            .set_session(&credential, &identity)
            .map_err(|e| NormalizedError::local(format!("cannot persist session: {}", e)))?;
        Ok(identity)
    }

    pub async fn register(&self, data: &RegisterRequest) -> ApiResult<()> {
        let request = ApiRequest::post("/auth/register", serde_json::Value::Null).with_json(data)?.without_refresh();
        self.pipeline.send_empty(request).await
    }

    pub fn logout(&self) {
        if let Some(id) = self.pipeline.session().current_identity() {
            info!(target: "session", "logging out {}", id.username);
        }
        self.pipeline.session().clear_session();
    }

    /// Exchange the current credential for a fresh one, sharing any refresh already in flight.
    /// A rejected refresh leaves no session behind; the coordinator clears it before waking us.
    pub async fn refresh_token(&self) -> ApiResult<Credential> { self.pipeline.refresh_session().await }

    /// Live credential, if any. An expired one clears the session.
    pub fn token(&self) -> Option<Credential> { self.pipeline.session().get_token() }

    pub fn current_user(&self) -> Option<Identity> { self.pipeline.session().current_identity() }

    pub fn is_authenticated(&self) -> bool { self.pipeline.session().is_authenticated() }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> { self.pipeline.session().subscribe() }
}
