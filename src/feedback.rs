//! Panel feedback definitions
//!
//! A feedback turns the current session state into something a button can
//! show: a boolean style toggle or a text label. Definitions come from the
//! configuration file and are re-evaluated against each new snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{ControlId, SessionSnapshot};

/// Unit used when rendering a control value as text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueUnit {
    #[serde(rename = "dB")]
    Decibel,
    #[serde(rename = "%")]
    Percent,
    /// Raw 16-bit value
    #[serde(rename = "bin")]
    Raw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feedback {
    /// Active while the session is connected
    Connected,
    /// Active while the control is non-zero
    OnOffValue { control: ControlId },
    /// Control value rendered under an optional label
    ControlValue {
        control: ControlId,
        unit: ValueUnit,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        button_text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutput {
    Active(bool),
    Text(String),
}

impl fmt::Display for FeedbackOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackOutput::Active(true) => write!(f, "on"),
            FeedbackOutput::Active(false) => write!(f, "off"),
            FeedbackOutput::Text(text) => write!(f, "{}", text.replace('\n', " | ")),
        }
    }
}

impl Feedback {
    /// Control read by this feedback, if any
    pub fn control(&self) -> Option<ControlId> {
        match self {
            Feedback::Connected => None,
            Feedback::OnOffValue { control } | Feedback::ControlValue { control, .. } => {
                Some(*control)
            },
        }
    }

    pub fn evaluate(&self, snapshot: &SessionSnapshot) -> FeedbackOutput {
        match self {
            Feedback::Connected => FeedbackOutput::Active(snapshot.is_connected()),
            Feedback::OnOffValue { control } => FeedbackOutput::Active(
                snapshot.control(*control).is_some_and(|state| state.is_on()),
            ),
            Feedback::ControlValue {
                control,
                unit,
                button_text,
            } => {
                let Some(state) = snapshot.control(*control) else {
                    return FeedbackOutput::Text(button_text.clone());
                };
                let value = match unit {
                    ValueUnit::Decibel => state.decibel_text.clone(),
                    ValueUnit::Percent => format!("{:.1}%", state.percent),
                    ValueUnit::Raw => state.raw.to_string(),
                };
                if button_text.is_empty() {
                    FeedbackOutput::Text(value)
                } else {
                    FeedbackOutput::Text(format!("{}\n{}", button_text, value))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ConnectionState, ControlStore};

    fn id(n: u32) -> ControlId {
        ControlId::new(n).unwrap()
    }

    fn snapshot_with(values: &[(u32, u16)]) -> SessionSnapshot {
        let mut store = ControlStore::new();
        store.set_connection(ConnectionState::Connected, None);
        for (control, raw) in values {
            store.set_control(id(*control), *raw);
        }
        store.snapshot()
    }

    fn value_feedback(unit: ValueUnit, text: &str) -> Feedback {
        Feedback::ControlValue {
            control: id(4),
            unit,
            button_text: text.to_string(),
        }
    }

    #[test]
    fn test_connected() {
        assert_eq!(
            Feedback::Connected.evaluate(&snapshot_with(&[])),
            FeedbackOutput::Active(true)
        );
        assert_eq!(
            Feedback::Connected.evaluate(&SessionSnapshot::default()),
            FeedbackOutput::Active(false)
        );
    }

    #[test]
    fn test_on_off() {
        let snapshot = snapshot_with(&[(1, 0), (2, 1)]);
        let on_off = |n| Feedback::OnOffValue { control: id(n) }.evaluate(&snapshot);
        assert_eq!(on_off(1), FeedbackOutput::Active(false));
        assert_eq!(on_off(2), FeedbackOutput::Active(true));
        // Unknown controls read as off
        assert_eq!(on_off(3), FeedbackOutput::Active(false));
    }

    #[test]
    fn test_value_text() {
        let snapshot = snapshot_with(&[(4, 65535)]);
        assert_eq!(
            value_feedback(ValueUnit::Decibel, "Main").evaluate(&snapshot),
            FeedbackOutput::Text("Main\n+12.0 dB".to_string())
        );
        assert_eq!(
            value_feedback(ValueUnit::Percent, "Main").evaluate(&snapshot),
            FeedbackOutput::Text("Main\n100.0%".to_string())
        );
        assert_eq!(
            value_feedback(ValueUnit::Raw, "").evaluate(&snapshot),
            FeedbackOutput::Text("65535".to_string())
        );

        let off = snapshot_with(&[(4, 0)]);
        assert_eq!(
            value_feedback(ValueUnit::Decibel, "").evaluate(&off),
            FeedbackOutput::Text("Off".to_string())
        );
    }

    #[test]
    fn test_unknown_value_shows_label_only() {
        assert_eq!(
            value_feedback(ValueUnit::Percent, "Mic 1").evaluate(&snapshot_with(&[])),
            FeedbackOutput::Text("Mic 1".to_string())
        );
    }

    #[test]
    fn test_yaml_definitions() {
        let yaml = r#"
- type: connected
- type: on_off_value
  control: 12
- type: control_value
  control: 3
  unit: dB
  button_text: Main
- type: control_value
  control: 3
  unit: "%"
"#;
        let feedbacks: Vec<Feedback> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            feedbacks,
            vec![
                Feedback::Connected,
                Feedback::OnOffValue { control: id(12) },
                Feedback::ControlValue {
                    control: id(3),
                    unit: ValueUnit::Decibel,
                    button_text: "Main".to_string(),
                },
                Feedback::ControlValue {
                    control: id(3),
                    unit: ValueUnit::Percent,
                    button_text: String::new(),
                },
            ]
        );
    }
}
