//! Assemble the controller from config. No decisions are made here.

use std::sync::Arc;

use anyhow::Context;
use dl_app::SessionController;
use dl_core::config::AppConfig;
use dl_core::ports::PairingClientPort;
use dl_infra::HttpPairingClient;

pub fn build_controller(config: &AppConfig) -> anyhow::Result<SessionController> {
    let client: Arc<dyn PairingClientPort> = Arc::new(
        HttpPairingClient::new(&config.remote).context("Failed to create pairing client")?,
    );
    Ok(SessionController::new(config.pairing.clone(), client))
}
