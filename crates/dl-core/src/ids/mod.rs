//! ID type wrappers for type safety.

mod id_macro;

pub mod device_id;
pub mod pairing_code;
pub mod session_id;

pub use device_id::DeviceId;
pub use pairing_code::PairingCode;
pub use session_id::SessionId;
