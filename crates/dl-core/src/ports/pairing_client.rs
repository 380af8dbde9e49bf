//! Remote pairing service port.
//!
//! The pairing transport itself (code generation, scanning, session
//! cryptography) lives in the remote service. This port only covers the
//! two calls the session controller makes against it.

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::{DeviceId, PairingCode};
use crate::pairing::DeviceStatus;

#[derive(Debug, Error)]
pub enum PairingClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected the request: {0}")]
    Rejected(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timed out")]
    Timeout,
}

/// Result of a successful `begin_pairing` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginPairingResponse {
    pub code: PairingCode,
    pub message: Option<String>,
}

/// Result of a successful `poll_status` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: DeviceStatus,
    /// A refreshed code, if the remote rotated it.
    pub code: Option<PairingCode>,
    pub message: Option<String>,
}

#[async_trait]
pub trait PairingClientPort: Send + Sync {
    /// Ask the remote to issue a pairing code.
    ///
    /// `target` is set only when renewing an existing device.
    async fn begin_pairing(
        &self,
        target: Option<DeviceId>,
    ) -> Result<BeginPairingResponse, PairingClientError>;

    /// Fetch the current pairing status.
    async fn poll_status(&self) -> Result<StatusReport, PairingClientError>;
}

#[cfg(test)]
mockall::mock! {
    pub PairingClient {}

    #[async_trait]
    impl PairingClientPort for PairingClient {
        async fn begin_pairing(
            &self,
            target: Option<DeviceId>,
        ) -> Result<BeginPairingResponse, PairingClientError>;
        async fn poll_status(&self) -> Result<StatusReport, PairingClientError>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_status_surfaces_client_error() {
        let mut client = MockPairingClient::new();
        client
            .expect_poll_status()
            .times(1)
            .returning(|| Err(PairingClientError::Timeout));

        let port: &dyn PairingClientPort = &client;
        let err = port.poll_status().await.unwrap_err();

        assert!(matches!(err, PairingClientError::Timeout));
    }

    #[tokio::test]
    async fn begin_pairing_passes_renewal_target() {
        let mut client = MockPairingClient::new();
        client
            .expect_begin_pairing()
            .withf(|target| target.as_ref().map(DeviceId::as_str) == Some("dev-1"))
            .times(1)
            .returning(|_| {
                Ok(BeginPairingResponse {
                    code: PairingCode::from("code-1"),
                    message: None,
                })
            });

        let response = client
            .begin_pairing(Some(DeviceId::from("dev-1")))
            .await
            .unwrap();

        assert_eq!(response.code.as_str(), "code-1");
    }
}
