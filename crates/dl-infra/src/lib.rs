//! # dl-infra
//!
//! Infrastructure adapters: the TOML config loader and the HTTP client for
//! the remote pairing service.

pub mod config;
pub mod http;

pub use config::load_config;
pub use http::HttpPairingClient;
