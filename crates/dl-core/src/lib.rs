//! # dl-core
//!
//! Core domain models for DevLink device pairing.
//!
//! This crate contains the pairing session model, its state machine and the
//! ports the application layer talks through. No timers, no I/O.

pub mod config;
pub mod ids;
pub mod pairing;
pub mod ports;

// Re-export commonly used types at the crate root
pub use config::{AppConfig, PairingConfig, RemoteConfig};
pub use ids::{DeviceId, PairingCode, SessionId};
pub use pairing::{
    CloseReason, DeviceStatus, PairingError, PairingLifecycleEvent, PairingSession,
    SessionOptions, SessionSnapshot, SessionStateMachine, Stage,
};
pub use ports::{PairingClientError, PairingClientPort, PairingEventPort};
