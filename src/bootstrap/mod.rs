//! Process bootstrap: tracing, config resolution and dependency wiring.

pub mod config;
pub mod tracing;
pub mod wiring;

pub use config::load_app_config;
pub use wiring::build_controller;
