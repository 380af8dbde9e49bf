use tokio::sync::mpsc;

use crate::pairing::PairingLifecycleEvent;

/// Subscription to pairing lifecycle events.
///
/// Each call returns an independent receiver; slow subscribers miss events
/// rather than stalling the session.
#[async_trait::async_trait]
pub trait PairingEventPort: Send + Sync {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PairingLifecycleEvent>>;
}
