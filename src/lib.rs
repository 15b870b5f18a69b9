//! Symetrix GW - control and telemetry client for Symetrix DSP units
//!
//! Speaks the line-based Composer control protocol over TCP: sends preset,
//! value and maintenance commands, tracks every push-enabled control value and
//! publishes state changes to the host.

pub mod cli;
pub mod config;
pub mod error;
pub mod feedback;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

pub use error::{Result, SessionError};
pub use session::{Action, Endpoint, SessionHandle};
pub use state::{ConnectionState, ControlId, SessionSnapshot, StateEvent};
