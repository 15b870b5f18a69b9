//! DSP state type definitions
//!
//! Defines control identifiers, per-control state with its derived display
//! values, connection state, snapshots and the events published to hosts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Full scale of a control value (unsigned 16-bit)
pub const RAW_FULL_SCALE: f64 = 65535.0;

/// Fader floor in dB; anything at or below reads "Off"
pub const DB_FLOOR: f64 = -72.0;

/// Fader span in dB (-72 dB .. +12 dB)
pub const DB_SPAN: f64 = 84.0;

/// Identifier of an addressable control (fader, button, ...) on the DSP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(u16);

impl ControlId {
    /// Highest control number a host action may address
    pub const MAX_UI: u16 = 1000;
    /// Highest control number the device protocol reports
    pub const MAX_PROTOCOL: u16 = 10000;

    /// Build an id within the protocol range (1..=10000)
    pub fn new(n: u32) -> Option<Self> {
        if (1..=Self::MAX_PROTOCOL as u32).contains(&n) {
            Some(Self(n as u16))
        } else {
            None
        }
    }

    /// Raw control number
    pub fn get(self) -> u16 {
        self.0
    }

    /// Host variable name for this control
    pub fn variable_name(self) -> String {
        format!("control_number_{}", self.0)
    }

    /// Host variable label for this control
    pub fn variable_label(self) -> String {
        format!("Control Number #{}", self.0)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round to one decimal place
fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Percentage of full scale, one decimal
pub fn percent(raw: u16) -> f64 {
    round1(100.0 * raw as f64 / RAW_FULL_SCALE)
}

/// Unrounded fader level in dB
pub fn decibel(raw: u16) -> f64 {
    DB_FLOOR + DB_SPAN * raw as f64 / RAW_FULL_SCALE
}

/// Display text for a fader level: "+x.x dB", "Off" or "-x.x dB"
pub fn decibel_text(raw: u16) -> String {
    let db = decibel(raw);
    if db >= 0.0 {
        format!("+{:.1} dB", db)
    } else if db <= DB_FLOOR {
        "Off".to_string()
    } else {
        format!("{:.1} dB", db)
    }
}

/// Last known state of one control
///
/// `raw` is the only stored value; the rest is derived from it on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub control: ControlId,
    pub raw: u16,
    pub percent: f64,
    /// `None` when the level reads "Off"
    pub decibel: Option<f64>,
    pub decibel_text: String,
}

impl ControlState {
    pub fn from_raw(control: ControlId, raw: u16) -> Self {
        let db = decibel(raw);
        Self {
            control,
            raw,
            percent: percent(raw),
            decibel: (db > DB_FLOOR).then(|| round1(db)),
            decibel_text: decibel_text(raw),
        }
    }

    /// A control counts as "on" when its value is above zero
    pub fn is_on(&self) -> bool {
        self.raw > 0
    }
}

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Host-visible variable (name, label and current value)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub label: String,
    pub value: Option<u32>,
}

/// Name of the last recalled preset variable
pub const LAST_PRESET_VARIABLE: &str = "last_preset";

/// Owned copy of the full session state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub last_preset: Option<u32>,
    pub controls: BTreeMap<ControlId, ControlState>,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn control(&self, control: ControlId) -> Option<&ControlState> {
        self.controls.get(&control)
    }

    /// All variables currently defined, `last_preset` first
    pub fn variables(&self) -> Vec<Variable> {
        let mut vars = vec![Variable {
            name: LAST_PRESET_VARIABLE.to_string(),
            label: "Last recalled preset".to_string(),
            value: self.last_preset,
        }];
        vars.extend(self.controls.values().map(|state| Variable {
            name: state.control.variable_name(),
            label: state.control.variable_label(),
            value: Some(state.raw as u32),
        }));
        vars
    }
}

/// Notifications published by the session to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// Connection state changed; `message` carries the transport reason if any
    ConnectionChanged {
        state: ConnectionState,
        message: Option<String>,
    },
    /// A control was observed for the first time in this session
    ControlRegistered { control: ControlId, variable: Variable },
    /// A control value was stored (also sent right after registration)
    ControlChanged(ControlState),
    /// The last recalled preset changed
    LastPresetChanged(u32),
    /// Controls, variables and preset were cleared by a session reset
    Reset,
}
