use reqwest::header::{HeaderValue, AUTHORIZATION};
use tracing::warn;

use crate::session::Credential;

use super::request::ApiRequest;

/// Attaches `Authorization: Bearer <token>` to a copy of the outbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthInjectionStage;

impl AuthInjectionStage {
    /// Without a credential the copy goes out unauthenticated and the server's 401 is
    /// handled like any other.
    pub fn apply(&self, request: &ApiRequest, credential: Option<&Credential>) -> ApiRequest {
        let mut out = request.clone();
        let Some(cred) = credential else { return out; };
        match HeaderValue::from_str(&cred.bearer()) {
            Ok(mut value) => {
                value.set_sensitive(true);
                out.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                warn!(target: "pipeline", "credential is not a valid header value; sending id={} without it", request.id);
            }
        }
        out
    }
}
