//! Outgoing command encoding
//!
//! Every command maps to exactly one CR-LF terminated line. Parameters are
//! range-checked before encoding; nothing out of bounds reaches the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SessionError};
use crate::state::ControlId;

/// Line terminator used in both directions
pub const LINE_ENDING: &str = "\r\n";

pub const FLASH_MIN: u8 = 1;
pub const FLASH_MAX: u8 = 20;
pub const PRESET_MIN: u16 = 1;
pub const PRESET_MAX: u16 = 1000;

/// Direction of a relative value change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    /// Wire digit: 1 = increase, 0 = decrease
    pub fn wire(self) -> u8 {
        match self {
            Direction::Increase => 1,
            Direction::Decrease => 0,
        }
    }
}

/// Command sent to the DSP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    FlashUnit { count: u8 },
    Reboot,
    GetLatestPreset,
    LoadGlobalPreset { preset: u16 },
    LoadPreset { preset: u16 },
    SetValue { control: ControlId, value: u16 },
    ChangeValue { control: ControlId, direction: Direction, delta: u16 },
    GetAllPushEnabled,
    GetControlValue { control: ControlId },
}

pub(crate) fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SessionError::OutOfRange { field, value, min, max })
    }
}

/// Controls addressed by host commands must sit in the panel range
pub(crate) fn check_ui_control(control: ControlId) -> Result<()> {
    check_range("control number", control.get() as u32, 1, ControlId::MAX_UI as u32)
}

impl Command {
    /// Check parameters against the documented bounds
    pub fn validate(&self) -> Result<()> {
        match *self {
            Command::FlashUnit { count } => {
                check_range("flash count", count as u32, FLASH_MIN as u32, FLASH_MAX as u32)
            },
            Command::LoadGlobalPreset { preset } | Command::LoadPreset { preset } => {
                check_range("preset number", preset as u32, PRESET_MIN as u32, PRESET_MAX as u32)
            },
            Command::SetValue { control, .. } | Command::ChangeValue { control, .. } => {
                check_ui_control(control)
            },
            // Ids from the device's own enumeration may exceed the panel range
            Command::GetControlValue { .. }
            | Command::Reboot
            | Command::GetLatestPreset
            | Command::GetAllPushEnabled => Ok(()),
        }
    }

    /// Validate and produce the wire line including the terminator
    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        Ok(format!("{}{}", self, LINE_ENDING))
    }
}

/// Wire form without the line terminator
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::FlashUnit { count } => write!(f, "FU {}", count),
            Command::Reboot => write!(f, "R!"),
            Command::GetLatestPreset => write!(f, "$e GPR"),
            Command::LoadGlobalPreset { preset } => write!(f, "$e LPG {}", preset),
            Command::LoadPreset { preset } => write!(f, "$e LP {}", preset),
            Command::SetValue { control, value } => write!(f, "CS {} {}", control, value),
            Command::ChangeValue { control, direction, delta } => {
                write!(f, "CC {} {} {}", control, direction.wire(), delta)
            },
            Command::GetAllPushEnabled => write!(f, "$e GPU"),
            Command::GetControlValue { control } => write!(f, "$e GS {}", control),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ControlId {
        ControlId::new(n).unwrap()
    }

    #[test]
    fn test_encoding_table() {
        let cases = [
            (Command::FlashUnit { count: 4 }, "FU 4\r\n"),
            (Command::Reboot, "R!\r\n"),
            (Command::GetLatestPreset, "$e GPR\r\n"),
            (Command::LoadGlobalPreset { preset: 12 }, "$e LPG 12\r\n"),
            (Command::LoadPreset { preset: 3 }, "$e LP 3\r\n"),
            (Command::SetValue { control: id(5), value: 1234 }, "CS 5 1234\r\n"),
            (
                Command::ChangeValue { control: id(7), direction: Direction::Increase, delta: 100 },
                "CC 7 1 100\r\n",
            ),
            (
                Command::ChangeValue { control: id(7), direction: Direction::Decrease, delta: 1 },
                "CC 7 0 1\r\n",
            ),
            (Command::GetAllPushEnabled, "$e GPU\r\n"),
            (Command::GetControlValue { control: id(4321) }, "$e GS 4321\r\n"),
        ];

        for (command, wire) in cases {
            assert_eq!(command.encode().unwrap(), wire, "{:?}", command);
        }
    }

    #[test]
    fn test_flash_count_bounds() {
        assert!(Command::FlashUnit { count: 1 }.encode().is_ok());
        assert!(Command::FlashUnit { count: 20 }.encode().is_ok());
        assert_eq!(
            Command::FlashUnit { count: 21 }.encode(),
            Err(SessionError::OutOfRange { field: "flash count", value: 21, min: 1, max: 20 })
        );
        assert!(Command::FlashUnit { count: 0 }.encode().is_err());
    }

    #[test]
    fn test_preset_bounds() {
        assert!(Command::LoadPreset { preset: 0 }.encode().is_err());
        assert!(Command::LoadGlobalPreset { preset: 1001 }.encode().is_err());
        assert!(Command::LoadPreset { preset: 1000 }.encode().is_ok());
    }

    #[test]
    fn test_host_control_range() {
        assert!(Command::SetValue { control: id(1001), value: 0 }.encode().is_err());
        assert!(Command::SetValue { control: id(1000), value: 65535 }.encode().is_ok());
        // Queries follow the device range
        assert!(Command::GetControlValue { control: id(10000) }.encode().is_ok());
    }
}
