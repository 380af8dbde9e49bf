use async_trait::async_trait;
use tokio::sync::watch;

use dl_core::ids::SessionId;
use dl_core::pairing::{CloseReason, PairingError, SessionOptions, SessionSnapshot};

/// What a presentation layer drives a pairing dialog through.
#[async_trait]
pub trait PairingSessionFacade: Send + Sync {
    async fn open(&self, options: SessionOptions) -> Result<SessionId, PairingError>;
    async fn acknowledge_policy(&self) -> Result<(), PairingError>;
    async fn request_code(&self) -> Result<(), PairingError>;
    async fn close(&self, reason: CloseReason) -> Result<(), PairingError>;
    fn snapshot(&self) -> SessionSnapshot;
    fn watch(&self) -> watch::Receiver<SessionSnapshot>;
}
