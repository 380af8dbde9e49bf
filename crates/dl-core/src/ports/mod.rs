//! Port interfaces for the application layer
//!
//! Ports define the contract between the pairing use cases and their
//! infrastructure implementations (Hexagonal Architecture). The session
//! controller only ever sees these traits.

mod pairing_client;
mod pairing_event;

pub use pairing_client::*;
pub use pairing_event::PairingEventPort;
