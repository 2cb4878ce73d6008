use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::backend::{self, BackendError};
use crate::session::SessionOptions;

pub const DEFAULT_CONFIG_URL: &str = "http://127.0.0.1:5000/api/config";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config endpoint unavailable: {0}")]
    Remote(#[from] BackendError),
    #[error("backend URL is not configured")]
    MissingBackendUrl,
    #[error("no access token; log in first or set ROLLCALL_ACCESS_TOKEN")]
    MissingToken,
}

/// Client settings, loaded from an optional TOML file then overridden by
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local endpoint serving `{backend_url, access_token}`.
    pub config_url: String,
    /// Backend base URL; skips the config endpoint when set with a token.
    pub backend_url: Option<String>,
    pub access_token: Option<String>,
    /// V4L2 device path (default: first capture device).
    pub camera_device: Option<String>,
    pub capture_interval_ms: u64,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_url: DEFAULT_CONFIG_URL.to_string(),
            backend_url: None,
            access_token: None,
            camera_device: None,
            capture_interval_ms: 300,
            jpeg_quality: 70,
            request_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// `$XDG_CONFIG_HOME/rollcall/config.toml`, falling back to `~/.config`.
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
            .ok()?;
        Some(base.join("rollcall").join("config.toml"))
    }

    /// Load settings. An explicit `path` must exist; the default path is
    /// optional. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable numbers keep the current value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ROLLCALL_CONFIG_URL") {
            self.config_url = v;
        }
        if let Some(v) = non_empty("ROLLCALL_BACKEND_URL") {
            self.backend_url = Some(v);
        }
        if let Some(v) = non_empty("ROLLCALL_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = non_empty("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = Some(v);
        }
        self.capture_interval_ms = parse_or(
            non_empty("ROLLCALL_CAPTURE_INTERVAL_MS"),
            self.capture_interval_ms,
        );
        self.jpeg_quality = parse_or(non_empty("ROLLCALL_JPEG_QUALITY"), self.jpeg_quality);
        self.request_timeout_secs = parse_or(
            non_empty("ROLLCALL_REQUEST_TIMEOUT_SECS"),
            self.request_timeout_secs,
        );
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Capture cadence and encode quality for a session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            // A zero period would make the interval timer panic.
            capture_interval: Duration::from_millis(self.capture_interval_ms.max(1)),
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
        }
    }

    /// Endpoint from local settings alone, when both halves are present.
    pub fn local_endpoint(&self) -> Option<Endpoint> {
        match (&self.backend_url, &self.access_token) {
            (Some(url), Some(token)) => Some(Endpoint::new(url, token)),
            _ => None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, current: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(current)
}

/// Resolved backend base URL and bearer token. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub backend_url: String,
    pub access_token: String,
}

impl Endpoint {
    pub fn new(backend_url: &str, access_token: &str) -> Self {
        Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Join an absolute API path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.backend_url, path)
    }
}

/// Resolve the endpoint once at startup.
///
/// Local settings win; anything missing is taken from the config endpoint.
pub async fn resolve_endpoint(
    settings: &Settings,
    client: &reqwest::Client,
) -> Result<Endpoint, ConfigError> {
    if let Some(endpoint) = settings.local_endpoint() {
        tracing::debug!("using locally configured endpoint");
        return Ok(endpoint);
    }

    tracing::info!(url = %settings.config_url, "fetching client config");
    let remote = backend::fetch_remote_config(client, &settings.config_url).await?;

    let backend_url = settings
        .backend_url
        .clone()
        .or(remote.backend_url)
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::MissingBackendUrl)?;
    let access_token = settings
        .access_token
        .clone()
        .or(remote.access_token)
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::MissingToken)?;

    Ok(Endpoint::new(&backend_url, &access_token))
}

/// Resolve only the backend URL, which is all the unauthenticated login call needs.
pub async fn resolve_backend_url(
    settings: &Settings,
    client: &reqwest::Client,
) -> Result<String, ConfigError> {
    if let Some(url) = &settings.backend_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let remote = backend::fetch_remote_config(client, &settings.config_url).await?;
    remote
        .backend_url
        .filter(|u| !u.is_empty())
        .map(|u| u.trim_end_matches('/').to_string())
        .ok_or(ConfigError::MissingBackendUrl)
}
