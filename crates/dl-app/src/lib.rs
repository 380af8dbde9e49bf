//! DevLink Application Orchestration Layer
//!
//! This crate contains the pairing use cases and their runtime
//! orchestration: the session controller, its poll loop and the recovery
//! watchdog.

pub mod usecases;

pub use usecases::{PairingSessionFacade, SessionController};
