pub mod controller;
mod facade;
mod poll_loop;
mod recovery_monitor;

pub use controller::SessionController;
pub use facade::PairingSessionFacade;
