//! Authenticated request pipeline.
//!
//! Every call goes through the same stages:
//!
//! 1. [`AuthInjectionStage`] attaches the stored credential (if it is still live).
//! 2. The injected [`Transport`] performs the exchange.
//! 3. A 401 from anything but the refresh endpoint (or a request marked
//!    [`ApiRequest::without_refresh`]) goes to the [`RefreshCoordinator`],
//!    which runs (or joins) one refresh and hands back a credential; the original request
//!    is then replayed once with it.
//! 4. Any other failure, including a failed replay, goes through [`ErrorNormalizationStage`].
//!
//! One pipeline (and therefore one coordinator) exists per client.

pub mod auth;
pub mod normalize;
pub mod refresh;
pub mod request;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ClientConfig, DEFAULT_REFRESH_PATH};
use crate::error::{ApiResult, Failure};
use crate::models::AuthResponse;
use crate::session::{Credential, FileStorage, MemoryStorage, SessionStore, Storage, SystemClock};

pub use auth::AuthInjectionStage;
pub use normalize::ErrorNormalizationStage;
pub use refresh::{RefreshCall, RefreshCoordinator, RefreshOutcome, RefreshState};
pub use request::{ApiRequest, ApiResponse};
pub use transport::{ReqwestTransport, Transport};

const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline builder is missing {0}")]
    Missing(&'static str),

    #[error("refresh coordinator was built over a different session store")]
    SessionMismatch,
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    auth: AuthInjectionStage,
    refresh: Arc<RefreshCoordinator>,
    normalizer: ErrorNormalizationStage,
    refresh_path: String,
}

impl RequestPipeline {
    pub fn builder() -> PipelineBuilder { PipelineBuilder::default() }

    /// Production wiring: reqwest transport, system clock, file-backed session when
    /// `session_file` is configured and in-memory otherwise.
    pub fn from_config(cfg: &ClientConfig) -> anyhow::Result<Arc<Self>> {
        let transport = ReqwestTransport::new(cfg).context("building http transport")?;
        let storage: Arc<dyn Storage> = match &cfg.session_file {
            Some(path) => Arc::new(FileStorage::open(path)),
            None => Arc::new(MemoryStorage::default()),
        };
        let session = Arc::new(SessionStore::new(storage, Arc::new(SystemClock)));
        info!(target: "pipeline", "pipeline ready for {}", transport.base());
        let pipeline = Self::builder()
            .transport(Arc::new(transport))
            .session(session)
            .refresh_timeout(cfg.refresh_timeout())
            .refresh_path(cfg.refresh_path.clone())
            .build()?;
        Ok(pipeline)
    }

    pub fn session(&self) -> &Arc<SessionStore> { &self.session }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> { &self.refresh }

    pub fn refresh_path(&self) -> &str { &self.refresh_path }

    pub async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let credential = self.session.get_token();
        let outbound = self.auth.apply(&request, credential.as_ref());
        match self.transport.execute(outbound).await {
            Ok(resp) if resp.is_success() => Ok(resp),
            Ok(resp) if resp.status == 401 && request.refreshable && !request.targets(&self.refresh_path) => {
                debug!(target: "pipeline", "{} {} id={} rejected with 401; recovering", request.method, request.path, request.id);
                self.recover(&request, credential).await
            }
            Ok(resp) => Err(self.normalizer.normalize(resp.into_failure())),
            Err(e) => Err(self.normalizer.normalize(Failure::Transport(e))),
        }
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        self.send(request).await?.json()
    }

    /// For endpoints whose success body is irrelevant.
    pub async fn send_empty(&self, request: ApiRequest) -> ApiResult<()> {
        self.send(request).await.map(|_| ())
    }

    /// Refresh now, or join the refresh already in flight.
    pub async fn refresh_session(&self) -> ApiResult<Credential> {
        match self.refresh.recover(None, || self.refresh_call()).await {
            RefreshOutcome::Refreshed(cred) => Ok(cred),
            RefreshOutcome::Failed(err) => Err(err),
        }
    }

    async fn recover(&self, request: &ApiRequest, rejected: Option<Credential>) -> ApiResult<ApiResponse> {
        let rejected = rejected.as_ref().map(|c| c.token());
        match self.refresh.recover(rejected, || self.refresh_call()).await {
            RefreshOutcome::Refreshed(cred) => self.replay(request, &cred).await,
            RefreshOutcome::Failed(err) => Err(err),
        }
    }

    // A replay is final: its failures, 401 included, are normalized and never re-enter the coordinator.
    async fn replay(&self, request: &ApiRequest, credential: &Credential) -> ApiResult<ApiResponse> {
        debug!(target: "pipeline", "replaying {} {} id={}", request.method, request.path, request.id);
        let outbound = self.auth.apply(request, Some(credential));
        match self.transport.execute(outbound).await {
            Ok(resp) if resp.is_success() => Ok(resp),
            Ok(resp) => Err(self.normalizer.normalize(resp.into_failure())),
            Err(e) => Err(self.normalizer.normalize(Failure::Transport(e))),
        }
    }

    fn refresh_call(&self) -> RefreshCall {
        let transport = Arc::clone(&self.transport);
        let session = Arc::clone(&self.session);
        let auth = self.auth;
        let normalizer = self.normalizer;
        let path = self.refresh_path.clone();
        Box::pin(async move {
            let request = ApiRequest::post(path, json!({}));
            let outbound = auth.apply(&request, session.get_token().as_ref());
            let resp = transport
                .execute(outbound)
                .await
                .map_err(|e| normalizer.normalize(Failure::Transport(e)))?;
            if !resp.is_success() {
                return Err(normalizer.normalize(resp.into_failure()));
            }
            resp.json::<AuthResponse>()?.into_session()
        })
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    transport: Option<Arc<dyn Transport>>,
    session: Option<Arc<SessionStore>>,
    coordinator: Option<Arc<RefreshCoordinator>>,
    refresh_timeout: Option<Duration>,
    refresh_path: Option<String>,
}

impl PipelineBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    /// Supply the coordinator instead of having one built; it must wrap the same session store.
    pub fn coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Ignored when a coordinator is supplied.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn refresh_path<S: Into<String>>(mut self, path: S) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Arc<RequestPipeline>, PipelineError> {
        let transport = self.transport.ok_or(PipelineError::Missing("transport"))?;
        let session = match (self.session, &self.coordinator) {
            (Some(s), _) => s,
            (None, Some(c)) => Arc::clone(c.session()),
            (None, None) => return Err(PipelineError::Missing("session")),
        };
        let refresh = match self.coordinator {
            Some(c) if !Arc::ptr_eq(c.session(), &session) => return Err(PipelineError::SessionMismatch),
            Some(c) => c,
            None => Arc::new(RefreshCoordinator::new(
                Arc::clone(&session),
                self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT),
            )),
        };
        Ok(Arc::new(RequestPipeline {
            transport,
            session,
            auth: AuthInjectionStage,
            refresh,
            normalizer: ErrorNormalizationStage,
            refresh_path: self.refresh_path.unwrap_or_else(|| DEFAULT_REFRESH_PATH.to_string()),
        }))
    }
}
