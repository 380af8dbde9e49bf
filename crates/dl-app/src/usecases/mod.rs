//! Pairing use cases
//!
//! A pairing dialog is one use case: the user opens it, the controller
//! drives the remote service until a terminal status or a cancel.

pub mod pairing;

pub use pairing::{PairingSessionFacade, SessionController};
