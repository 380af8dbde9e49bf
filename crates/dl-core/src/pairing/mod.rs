//! Pairing session domain: session entity, retry budget and the reducer
//! that drives both.

pub mod budget;
pub mod error;
pub mod event;
pub mod session;
pub mod state_machine;

pub use budget::RetryBudget;
pub use error::PairingError;
pub use event::PairingLifecycleEvent;
pub use session::{DeviceStatus, PairingSession, SessionOptions, SessionSnapshot, Stage};
pub use state_machine::{CloseReason, SessionAction, SessionEvent, SessionStateMachine};
