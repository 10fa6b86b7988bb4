//! Client configuration: API location, session file and timeouts.
//! Loaded from an optional JSON file, then overridden from `PANTRY_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8080/api`.
    #[serde(default = "ClientConfig::default_api_url")]
    pub api_url: String,
    /// Where the file-backed session storage lives. `None` keeps the session in memory.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    #[serde(default = "ClientConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on a single refresh call; hitting it counts as a failed refresh.
    #[serde(default = "ClientConfig::default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    #[serde(default = "ClientConfig::default_refresh_path")]
    pub refresh_path: String,
}

impl ClientConfig {
    fn default_api_url() -> String { "http://localhost:8080/api".to_string() }
    fn default_request_timeout_ms() -> u64 { 30_000 }
    fn default_refresh_timeout_ms() -> u64 { 10_000 }
    fn default_refresh_path() -> String { DEFAULT_REFRESH_PATH.to_string() }

    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }
    pub fn refresh_timeout(&self) -> Duration { Duration::from_millis(self.refresh_timeout_ms) }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg: ClientConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// File (when given) then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        debug!(target: "config", "client config: {:?}", cfg);
        Ok(cfg)
    }

    /// Apply `PANTRY_*` overrides from the given lookup (the process environment in `load`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PANTRY_API_URL") { self.api_url = v; }
        if let Some(v) = lookup("PANTRY_SESSION_FILE") {
            self.session_file = if v.trim().is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = lookup("PANTRY_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = v.trim().parse().context("PANTRY_REQUEST_TIMEOUT_MS must be an integer")?;
        }
        if let Some(v) = lookup("PANTRY_REFRESH_TIMEOUT_MS") {
            self.refresh_timeout_ms = v.trim().parse().context("PANTRY_REFRESH_TIMEOUT_MS must be an integer")?;
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            session_file: None,
            request_timeout_ms: Self::default_request_timeout_ms(),
            refresh_timeout_ms: Self::default_refresh_timeout_ms(),
            refresh_path: Self::default_refresh_path(),
        }
    }
}
