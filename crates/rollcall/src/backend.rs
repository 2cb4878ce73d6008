//! HTTP client for the attendance-recognition backend.
//!
//! Routes consumed:
//!   GET  {config_url}                        → client config (no auth)
//!   POST /admin/login                        → access token (form body)
//!   POST /attendance/take_attendance         → recognize one JPEG frame
//!   GET  /attendance/absent                  → absentees for today
//!   POST /attendance/enroll_camera           → enroll a person by name

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use rollcall_core::types::{
    AbsentResponse, EnrollRequest, EnrollResponse, LoginResponse, TakeAttendanceResponse,
};
use rollcall_core::{AttendanceRecord, RemoteConfig};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Endpoint;

pub const TAKE_ATTENDANCE: &str = "/attendance/take_attendance";
pub const ABSENT: &str = "/attendance/absent";
pub const ENROLL_CAMERA: &str = "/attendance/enroll_camera";
pub const ADMIN_LOGIN: &str = "/admin/login";
const CONFIG: &str = "/api/config";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{endpoint} returned HTTP {status}")]
    Http { endpoint: &'static str, status: u16 },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {endpoint}: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },
}

/// The two calls a capture session makes against the backend.
pub trait AttendanceBackend: Send + Sync + 'static {
    /// Submit one JPEG frame; returns the recognized record, if any.
    fn take_attendance(
        &self,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<Option<AttendanceRecord>, BackendError>> + Send;

    /// Fetch records for everyone not seen during the session.
    fn absentees(
        &self,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, BackendError>> + Send;
}

/// Build the shared HTTP client with a per-request timeout.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// Bearer-authenticated backend client.
pub struct HttpBackend {
    client: Client,
    endpoint: Endpoint,
}

impl HttpBackend {
    pub fn new(client: Client, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Ask the backend to enroll a person from its own camera feed.
    pub async fn enroll(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<EnrollResponse, BackendError> {
        let body = EnrollRequest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        let resp = self
            .client
            .post(self.endpoint.url(ENROLL_CAMERA))
            .bearer_auth(&self.endpoint.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|source| transport(ENROLL_CAMERA, source))?;
        decode(ENROLL_CAMERA, check_status(ENROLL_CAMERA, resp)?).await
    }
}

impl AttendanceBackend for HttpBackend {
    async fn take_attendance(
        &self,
        jpeg: Vec<u8>,
    ) -> Result<Option<AttendanceRecord>, BackendError> {
        let size = jpeg.len();
        let resp = self
            .client
            .post(self.endpoint.url(TAKE_ATTENDANCE))
            .bearer_auth(&self.endpoint.access_token)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .map_err(|source| transport(TAKE_ATTENDANCE, source))?;
        let resp = check_status(TAKE_ATTENDANCE, resp)?;
        tracing::trace!(bytes = size, "frame accepted");

        let body: TakeAttendanceResponse = decode(TAKE_ATTENDANCE, resp).await?;
        body.into_record().map_err(|e| BackendError::Decode {
            endpoint: TAKE_ATTENDANCE,
            reason: e.to_string(),
        })
    }

    async fn absentees(&self) -> Result<Vec<AttendanceRecord>, BackendError> {
        let resp = self
            .client
            .get(self.endpoint.url(ABSENT))
            .bearer_auth(&self.endpoint.access_token)
            .send()
            .await
            .map_err(|source| transport(ABSENT, source))?;
        let body: AbsentResponse = decode(ABSENT, check_status(ABSENT, resp)?).await?;
        Ok(body.into_records())
    }
}

/// Fetch `{backend_url, access_token}` from the local config endpoint.
pub async fn fetch_remote_config(
    client: &Client,
    config_url: &str,
) -> Result<RemoteConfig, BackendError> {
    let resp = client
        .get(config_url)
        .send()
        .await
        .map_err(|source| transport(CONFIG, source))?;
    decode(CONFIG, check_status(CONFIG, resp)?).await
}

/// Exchange admin credentials for an access token.
///
/// Anything other than 200 is treated as a failed login.
pub async fn login(
    client: &Client,
    backend_url: &str,
    username: &str,
    password: &str,
) -> Result<LoginResponse, BackendError> {
    let resp = client
        .post(format!("{}{}", backend_url.trim_end_matches('/'), ADMIN_LOGIN))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .map_err(|source| transport(ADMIN_LOGIN, source))?;
    if resp.status() != StatusCode::OK {
        return Err(BackendError::Http {
            endpoint: ADMIN_LOGIN,
            status: resp.status().as_u16(),
        });
    }
    decode(ADMIN_LOGIN, resp).await
}

fn transport(endpoint: &'static str, source: reqwest::Error) -> BackendError {
    BackendError::Transport { endpoint, source }
}

fn check_status(endpoint: &'static str, resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(BackendError::Http {
            endpoint,
            status: status.as_u16(),
        })
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    resp: Response,
) -> Result<T, BackendError> {
    resp.json().await.map_err(|e| BackendError::Decode {
        endpoint,
        reason: e.to_string(),
    })
}
