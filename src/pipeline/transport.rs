use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::TransportError;

use super::request::{ApiRequest, ApiResponse};

/// Executes one HTTP exchange. Any status code is a successful exchange; only failures to
/// complete the exchange are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

pub struct ReqwestTransport {
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self, TransportError> {
        let base = Url::parse(&cfg.api_url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", cfg.api_url, e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { base, client, timeout: cfg.request_timeout() })
    }

    pub fn base(&self) -> &Url { &self.base }

    // Url::join would drop the base path for absolute paths, so append instead
    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path)).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let timeout = request.timeout.unwrap_or(self.timeout);
        debug!(target: "transport", "{} {} {} id={}", request.method, url, if request.authorization().is_some() { "(auth)" } else { "" }, request.id);

        let mut builder = self.client.request(request.method.clone(), url).headers(request.headers).timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let resp = builder.send().await.map_err(|e| match TransportError::from(e) {
            TransportError::Timeout(_) => TransportError::Timeout(timeout),
            other => other,
        })?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(TransportError::from)?;
        let body = if bytes.is_empty() {
            None
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(v) => Some(v),
                Err(_) => Some(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            }
        };
        debug!(target: "transport", "id={} -> {}", request.id, status);
        Ok(ApiResponse { status, headers, body })
    }
}
