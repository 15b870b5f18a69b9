//! ControlStore - In-memory DSP state with subscription support
//!
//! Holds the last known value of every observed control, the last recalled
//! preset and the connection state, and notifies subscribers on changes.
//! The store is owned by the session actor; hosts only see snapshots.

use super::types::{
    ConnectionState, ControlId, ControlState, SessionSnapshot, StateEvent, Variable,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Subscriber callback function type
pub type SubscriberFn = Arc<dyn Fn(&StateEvent) + Send + Sync>;

/// Stores DSP state and notifies subscribers on updates
#[derive(Default)]
pub struct ControlStore {
    controls: BTreeMap<ControlId, ControlState>,
    last_preset: Option<u32>,
    connection: ConnectionState,
    subscribers: Vec<SubscriberFn>,
}

impl ControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state change listener, returns its index
    pub fn subscribe(&mut self, listener: SubscriberFn) -> usize {
        self.subscribers.push(listener);
        self.subscribers.len() - 1
    }

    fn notify(&self, event: StateEvent) {
        for subscriber in &self.subscribers {
            subscriber(&event);
        }
    }

    /// Store a reported control value
    ///
    /// The first observation of a control announces its variable, later ones
    /// only publish when the value actually changed.
    pub fn set_control(&mut self, control: ControlId, raw: u16) {
        let state = ControlState::from_raw(control, raw);

        match self.controls.insert(control, state.clone()) {
            None => {
                debug!(control = control.get(), raw, "Control registered");
                self.notify(StateEvent::ControlRegistered {
                    control,
                    variable: Variable {
                        name: control.variable_name(),
                        label: control.variable_label(),
                        value: Some(raw as u32),
                    },
                });
                self.notify(StateEvent::ControlChanged(state));
            },
            Some(previous) if previous.raw != raw => {
                trace!(control = control.get(), from = previous.raw, to = raw, "Control updated");
                self.notify(StateEvent::ControlChanged(state));
            },
            Some(_) => {},
        }
    }

    pub fn control(&self, control: ControlId) -> Option<&ControlState> {
        self.controls.get(&control)
    }

    /// Raw value of a control, if it has been observed
    pub fn raw(&self, control: ControlId) -> Option<u16> {
        self.controls.get(&control).map(|state| state.raw)
    }

    pub fn set_last_preset(&mut self, preset: u32) {
        if self.last_preset != Some(preset) {
            debug!(preset, "Last preset updated");
            self.last_preset = Some(preset);
            self.notify(StateEvent::LastPresetChanged(preset));
        }
    }

    pub fn last_preset(&self) -> Option<u32> {
        self.last_preset
    }

    pub fn set_connection(&mut self, state: ConnectionState, message: Option<String>) {
        if self.connection != state {
            self.connection = state;
            self.notify(StateEvent::ConnectionChanged { state, message });
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Drop all controls and the last preset (connection state is kept)
    pub fn reset(&mut self) {
        let had_state = !self.controls.is_empty() || self.last_preset.is_some();
        self.controls.clear();
        self.last_preset = None;
        if had_state {
            debug!("Control store reset");
            self.notify(StateEvent::Reset);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection,
            last_preset: self.last_preset,
            controls: self.controls.clone(),
        }
    }
}
