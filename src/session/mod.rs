//! Session module - one live connection to a Symetrix DSP
//!
//! The session owns the transport, the wire parser, the value query
//! scheduler and the control store. It:
//! - bootstraps state on connect (latest preset, push-enabled controls)
//! - paces one value query per enumerated control
//! - applies pushed values and preset acknowledgements to the store
//! - validates and sends host actions, reconnecting when the link is down

mod action;
mod actor;
mod commands;
mod handle;
mod scheduler;


pub use action::Action;
pub use actor::ENUMERATION_IDLE;
pub use handle::SessionHandle;
pub use scheduler::QUERY_INTERVAL;

use std::fmt;

/// Default Symetrix control port
pub const DEFAULT_PORT: u16 = 48631;

/// Default DSP address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Address of the DSP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// An empty host falls back to [`DEFAULT_HOST`]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = if host.trim().is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.trim().to_string()
        };
        Self { host, port }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
