//! HTTP/JSON adapter for the remote pairing service.
//!
//! ```text
//! POST {base}/pairing/begin   {"targetDeviceId"?}  -> {"success", "code"?, "message"?}
//! GET  {base}/pairing/status                       -> {"status", "code"?, "message"?}
//! ```

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use dl_core::config::RemoteConfig;
use dl_core::ids::{DeviceId, PairingCode};
use dl_core::pairing::DeviceStatus;
use dl_core::ports::{BeginPairingResponse, PairingClientError, PairingClientPort, StatusReport};

pub struct HttpPairingClient {
    client: reqwest::Client,
    begin_url: Url,
    status_url: Url,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BeginRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    target_device_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BeginResponseBody {
    success: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum RemoteStatus {
    Initializing,
    AwaitingScan,
    Connected,
    Disconnected,
}

impl From<RemoteStatus> for DeviceStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Initializing => DeviceStatus::Initializing,
            RemoteStatus::AwaitingScan => DeviceStatus::AwaitingScan,
            RemoteStatus::Connected => DeviceStatus::Connected,
            RemoteStatus::Disconnected => DeviceStatus::Disconnected,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponseBody {
    status: RemoteStatus,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpPairingClient {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        if config.base_url.trim().is_empty() {
            anyhow::bail!("remote.base_url is not configured");
        }
        let base = Url::parse(&normalize_base_url(&config.base_url))
            .with_context(|| format!("Invalid remote.base_url: {}", config.base_url))?;
        let begin_url = base
            .join("pairing/begin")
            .context("Failed to build pairing/begin URL")?;
        let status_url = base
            .join("pairing/status")
            .context("Failed to build pairing/status URL")?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            begin_url,
            status_url,
            token: config.token.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PairingClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PairingClientError::Rejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        response.json::<T>().await.map_err(map_reqwest_error)
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

fn map_reqwest_error(error: reqwest::Error) -> PairingClientError {
    if error.is_timeout() {
        PairingClientError::Timeout
    } else if error.is_decode() {
        PairingClientError::Decode(error.to_string())
    } else {
        PairingClientError::Transport(error.to_string())
    }
}

#[async_trait]
impl PairingClientPort for HttpPairingClient {
    async fn begin_pairing(
        &self,
        target: Option<DeviceId>,
    ) -> Result<BeginPairingResponse, PairingClientError> {
        let body = BeginRequest {
            target_device_id: target.as_ref().map(DeviceId::as_str),
        };
        tracing::debug!(url = %self.begin_url, renewal = target.is_some(), "POST pairing/begin");

        let response = self
            .authorized(self.client.post(self.begin_url.clone()))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: BeginResponseBody = Self::decode(response).await?;

        if !body.success {
            return Err(PairingClientError::Rejected(body.message.unwrap_or_else(
                || "pairing service refused to issue a code".to_string(),
            )));
        }
        match body.code.filter(|code| !code.is_empty()) {
            Some(code) => Ok(BeginPairingResponse {
                code: PairingCode::from(code),
                message: body.message,
            }),
            None => Err(PairingClientError::Decode(
                "successful begin response carried no code".to_string(),
            )),
        }
    }

    async fn poll_status(&self) -> Result<StatusReport, PairingClientError> {
        let response = self
            .authorized(self.client.get(self.status_url.clone()))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: StatusResponseBody = Self::decode(response).await?;

        Ok(StatusReport {
            status: body.status.into(),
            code: body
                .code
                .filter(|code| !code.is_empty())
                .map(PairingCode::from),
            message: body.message,
        })
    }
}
