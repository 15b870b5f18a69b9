//! State management module - DSP control state tracking
//!
//! This module provides the store that tracks every observed control value,
//! the last recalled preset and the connection state of a DSP session.

mod store;
mod types;

pub use store::{ControlStore, SubscriberFn};
pub use types::{
    decibel, decibel_text, percent, ConnectionState, ControlId, ControlState, SessionSnapshot,
    StateEvent, Variable, DB_FLOOR, DB_SPAN, LAST_PRESET_VARIABLE, RAW_FULL_SCALE,
};
