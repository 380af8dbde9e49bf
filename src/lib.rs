//! # devlink
//!
//! Command-line front end for the DevLink pairing session controller.

pub mod bootstrap;
pub mod cli;
pub mod pair;
pub mod presenter;

pub use pair::{run_pair, PairOutcome};
