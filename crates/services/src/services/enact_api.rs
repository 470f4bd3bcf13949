//! REST client for the ENACT backend.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use db::models::{
    children::Child,
    location_match::{LocationMatch, LocationMatchResponse, RemoteId},
    tip::{Tip, TipsRequest},
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use utils::geo::Position;

#[derive(Debug, Clone, Error)]
pub enum EnactApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("unauthorized")]
    Unauthorized,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("json error: {0}")]
    Serde(String),
    #[error("invalid url: {0}")]
    Url(String),
    #[error("response has no access token")]
    MissingToken,
}

impl EnactApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => "Request timed out. Please try again.".to_string(),
            Self::Transport(_) => {
                "Network connection failed. Please check your internet.".to_string()
            }
            Self::Unauthorized => "Authentication failed. Please log in again.".to_string(),
            Self::Http { status: 403, .. } => {
                "Access denied. Please check your permissions.".to_string()
            }
            Self::Http { status: 404, .. } => "Requested information not found.".to_string(),
            Self::Http { status, .. } if (500..=599).contains(status) => {
                "Server error. Please try again later.".to_string()
            }
            _ => "Request failed. Please try again.".to_string(),
        }
    }
}

/// The backend operations the tracking loop depends on.
#[async_trait]
pub trait TipsBackend: Send + Sync {
    /// `POST /api/auth/verify`; `Ok` when the token is still valid.
    async fn verify_token(&self, token: &str) -> Result<(), EnactApiError>;

    /// `POST /endpoint`; `Some` when the position is within a registered location's radius.
    async fn submit_location(
        &self,
        token: &str,
        position: &Position,
    ) -> Result<Option<LocationMatch>, EnactApiError>;

    /// `POST /api/tips/get-tips` for a location type.
    async fn fetch_tips(
        &self,
        token: &str,
        location_type: &str,
        ai: bool,
    ) -> Result<Vec<Tip>, EnactApiError>;

    /// `POST /api/auth/logout`.
    async fn logout(&self, token: &str) -> Result<(), EnactApiError>;

    /// `POST /endpoint/session/start`; the backend's id for the usage session,
    /// when it returns one.
    async fn start_usage_session(
        &self,
        token: &str,
        device_info: &str,
    ) -> Result<Option<String>, EnactApiError>;

    /// `POST /endpoint/session/end`.
    async fn end_usage_session(&self, token: &str, session_id: &str) -> Result<(), EnactApiError>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct DeviceTokenRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Serialize)]
struct UsageSessionStart<'a> {
    device_info: &'a str,
}

#[derive(Debug, Serialize)]
struct UsageSessionEnd<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UsageSessionResponse {
    #[serde(default)]
    session_id: Option<RemoteId>,
}

#[derive(Debug, Serialize)]
struct UpdateChildrenRequest<'a> {
    children: &'a [Child],
}

/// Body returned by `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

/// ENACT backend client
#[derive(Debug, Clone)]
pub struct EnactApiClient {
    http: Client,
    base_url: Url,
}

impl EnactApiClient {
    const CHILDREN_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(mut base_url: Url, request_timeout: Option<Duration>) -> Result<Self, EnactApiError> {
        // Relative joins keep any path prefix on the base.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder =
            Client::builder().user_agent(concat!("enact/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| EnactApiError::Transport(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, EnactApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| EnactApiError::Url(e.to_string()))
    }

    fn post(&self, path: &str, token: Option<&str>) -> Result<RequestBuilder, EnactApiError> {
        let mut request = self
            .http
            .post(self.url(path)?)
            .header("accept", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn send(request: RequestBuilder) -> Result<Response, EnactApiError> {
        let res = request.send().await.map_err(map_reqwest_error)?;
        match res.status() {
            s if s.is_success() => Ok(res),
            StatusCode::UNAUTHORIZED => Err(EnactApiError::Unauthorized),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(EnactApiError::Http { status, body })
            }
        }
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(res: Response) -> Result<T, EnactApiError> {
        let text = res.text().await.map_err(map_reqwest_error)?;
        serde_json::from_str(&text).map_err(|e| EnactApiError::Serde(e.to_string()))
    }

    /// Exchange credentials for an access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserInfo, EnactApiError> {
        let res = Self::send(
            self.post("api/auth/login", None)?
                .json(&LoginRequest { email, password }),
        )
        .await?;
        let info: UserInfo = Self::read_json(res).await?;
        if info.access_token.as_deref().is_none_or(str::is_empty) {
            return Err(EnactApiError::MissingToken);
        }
        Ok(info)
    }

    /// Register a push-messaging device token for the signed-in user.
    pub async fn register_device_token(
        &self,
        token: &str,
        device_token: &str,
    ) -> Result<serde_json::Value, EnactApiError> {
        let res = Self::send(
            self.post("api/auth/token", Some(token))?
                .json(&DeviceTokenRequest {
                    token: device_token,
                }),
        )
        .await?;
        let text = res.text().await.map_err(map_reqwest_error)?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| EnactApiError::Serde(e.to_string()))
    }

    /// Fetch the user's children, retrying transient failures with exponential backoff.
    pub async fn fetch_children(&self, token: &str) -> Result<Vec<Child>, EnactApiError> {
        (|| async { self.fetch_children_once(token).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(2))
                    .with_max_times(2),
            )
            .when(|e: &EnactApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Children fetch failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn fetch_children_once(&self, token: &str) -> Result<Vec<Child>, EnactApiError> {
        let request = self
            .http
            .get(self.url("endpoint/children")?)
            .bearer_auth(token)
            .timeout(Self::CHILDREN_TIMEOUT);
        let body: serde_json::Value = Self::read_json(Self::send(request).await?).await?;

        match body.get("children") {
            Some(serde_json::Value::Array(items)) => {
                serde_json::from_value(serde_json::Value::Array(items.clone()))
                    .map_err(|e| EnactApiError::Serde(e.to_string()))
            }
            _ => {
                warn!("Children response has no children array");
                Ok(Vec::new())
            }
        }
    }

    pub async fn update_children(
        &self,
        token: &str,
        children: &[Child],
    ) -> Result<(), EnactApiError> {
        Self::send(
            self.post("endpoint/updateChildren", Some(token))?
                .json(&UpdateChildrenRequest { children }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TipsBackend for EnactApiClient {
    async fn verify_token(&self, token: &str) -> Result<(), EnactApiError> {
        Self::send(
            self.post("api/auth/verify", Some(token))?
                .json(&VerifyRequest { token }),
        )
        .await?;
        Ok(())
    }

    async fn submit_location(
        &self,
        token: &str,
        position: &Position,
    ) -> Result<Option<LocationMatch>, EnactApiError> {
        let res = Self::send(self.post("endpoint", Some(token))?.json(position)).await?;
        let text = res.text().await.map_err(map_reqwest_error)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let response: LocationMatchResponse =
            serde_json::from_str(&text).map_err(|e| EnactApiError::Serde(e.to_string()))?;
        debug!(status = ?response.status, "Location submitted");
        Ok(response.into_match())
    }

    async fn fetch_tips(
        &self,
        token: &str,
        location_type: &str,
        ai: bool,
    ) -> Result<Vec<Tip>, EnactApiError> {
        let res = Self::send(
            self.post("api/tips/get-tips", Some(token))?
                .json(&TipsRequest { location_type, ai }),
        )
        .await?;
        Self::read_json(res).await
    }

    async fn logout(&self, token: &str) -> Result<(), EnactApiError> {
        Self::send(
            self.post("api/auth/logout", Some(token))?
                .json(&serde_json::json!({})),
        )
        .await?;
        Ok(())
    }

    async fn start_usage_session(
        &self,
        token: &str,
        device_info: &str,
    ) -> Result<Option<String>, EnactApiError> {
        let res = Self::send(
            self.post("endpoint/session/start", Some(token))?
                .json(&UsageSessionStart { device_info }),
        )
        .await?;
        let response: UsageSessionResponse = Self::read_json(res).await?;
        Ok(response.session_id.map(|id| id.to_string()))
    }

    async fn end_usage_session(&self, token: &str, session_id: &str) -> Result<(), EnactApiError> {
        Self::send(
            self.post("endpoint/session/end", Some(token))?
                .json(&UsageSessionEnd { session_id }),
        )
        .await?;
        Ok(())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> EnactApiError {
    if e.is_timeout() {
        EnactApiError::Timeout
    } else {
        EnactApiError::Transport(e.to_string())
    }
}
