//! HTTP adapters.

mod pairing_client;

pub use pairing_client::HttpPairingClient;
