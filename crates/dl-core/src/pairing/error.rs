use thiserror::Error;

/// Rejections of controller operations.
///
/// Remote failures never surface here; they become lifecycle events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("cannot close the session while the remote device is initializing")]
    CloseWhileInitializing,

    #[error("no pairing session is open")]
    NotOpen,

    #[error("a pairing session is already open")]
    AlreadyOpen,
}
