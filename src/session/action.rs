//! Host-facing actions
//!
//! Actions are what a panel button asks for. Most map one-to-one to a wire
//! command; `ToggleOnOff` is resolved against the cached control value and
//! `Reconnect` never reaches the wire.

use std::fmt;

use crate::error::Result;
use crate::protocol::command::{check_range, check_ui_control};
use crate::protocol::{Command, Direction};
use crate::state::ControlId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    FlashUnit { count: u8 },
    Reboot,
    GetLatestPreset,
    LoadGlobalPreset { preset: u16 },
    LoadPreset { preset: u16 },
    SetValue { control: ControlId, value: u16 },
    ChangeValue { control: ControlId, direction: Direction, delta: u16 },
    /// Set to `on_value` when off (or unknown), otherwise to 0
    ToggleOnOff { control: ControlId, on_value: u16 },
    /// Tear the session down and connect again
    Reconnect,
}

impl Action {
    /// Check parameters against the documented bounds
    pub fn validate(&self) -> Result<()> {
        match *self {
            Action::ToggleOnOff { control, on_value } => {
                check_ui_control(control)?;
                check_range("on value", on_value as u32, 1, u16::MAX as u32)
            },
            Action::Reconnect => Ok(()),
            _ => self.resolve(None).map_or(Ok(()), |command| command.validate()),
        }
    }

    /// Wire command for this action given the cached raw value of its control
    ///
    /// Returns `None` for actions handled by the session itself.
    pub fn resolve(&self, cached: Option<u16>) -> Option<Command> {
        let command = match *self {
            Action::FlashUnit { count } => Command::FlashUnit { count },
            Action::Reboot => Command::Reboot,
            Action::GetLatestPreset => Command::GetLatestPreset,
            Action::LoadGlobalPreset { preset } => Command::LoadGlobalPreset { preset },
            Action::LoadPreset { preset } => Command::LoadPreset { preset },
            Action::SetValue { control, value } => Command::SetValue { control, value },
            Action::ChangeValue { control, direction, delta } => {
                Command::ChangeValue { control, direction, delta }
            },
            Action::ToggleOnOff { control, on_value } => {
                let value = match cached {
                    None | Some(0) => on_value,
                    Some(_) => 0,
                };
                Command::SetValue { control, value }
            },
            Action::Reconnect => return None,
        };
        Some(command)
    }

    /// Control addressed by this action, if any
    pub fn control(&self) -> Option<ControlId> {
        match *self {
            Action::SetValue { control, .. }
            | Action::ChangeValue { control, .. }
            | Action::ToggleOnOff { control, .. } => Some(control),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::FlashUnit { count } => write!(f, "flash_dsp({})", count),
            Action::Reboot => write!(f, "reboot_dsp"),
            Action::GetLatestPreset => write!(f, "get_latest_preset"),
            Action::LoadGlobalPreset { preset } => write!(f, "load_global_preset({})", preset),
            Action::LoadPreset { preset } => write!(f, "load_preset({})", preset),
            Action::SetValue { control, value } => write!(f, "set_value({}, {})", control, value),
            Action::ChangeValue { control, direction, delta } => {
                write!(f, "change_value({}, {:?}, {})", control, direction, delta)
            },
            Action::ToggleOnOff { control, on_value } => {
                write!(f, "toggle_on_off({}, {})", control, on_value)
            },
            Action::Reconnect => write!(f, "reconnect"),
        }
    }
}
