//! SessionActor - owns the DSP connection and its state
//!
//! A single task processes transport events, host commands and query timers
//! one at a time, so the store is never mutated concurrently:
//!
//! ```text
//!   host ── SessionCommand ──┐
//!                            ▼
//!   transport ── TaggedEvent ──► SessionActor ──► ControlStore ──► subscribers
//!                            ▲        │
//!   QueryScheduler deadline ─┘        └── Command lines ──► transport
//! ```
//!
//! Every teardown bumps the epoch. Events tagged with an older epoch come from
//! a connection that no longer exists and are ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use super::commands::SessionCommand;
use super::handle::SessionHandle;
use super::scheduler::QueryScheduler;
use super::{Action, Endpoint};
use crate::error::{Result, SessionError};
use crate::protocol::{Command, Message, MessageParser};
use crate::state::{ConnectionState, ControlStore};
use crate::transport::{Connector, EventSink, TaggedEvent, Transport, TransportEvent};

/// Close an enumeration left open this long without a terminating line
pub const ENUMERATION_IDLE: Duration = Duration::from_millis(200);

pub struct SessionActor {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    epoch: u64,

    store: ControlStore,
    parser: MessageParser,
    queries: QueryScheduler,
    /// When to give up waiting for the rest of an open enumeration
    enumeration_deadline: Option<Instant>,

    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    event_tx: mpsc::UnboundedSender<TaggedEvent>,
    event_rx: mpsc::UnboundedReceiver<TaggedEvent>,
}

impl SessionActor {
    /// Spawn an idle session actor and return its handle
    ///
    /// Nothing is opened until [`SessionHandle::start`] is called, so
    /// subscribers registered first see the whole connection sequence.
    pub fn spawn(endpoint: Endpoint, connector: Arc<dyn Connector>) -> SessionHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            endpoint,
            connector,
            transport: None,
            epoch: 0,
            store: ControlStore::new(),
            parser: MessageParser::new(),
            queries: QueryScheduler::new(),
            enumeration_deadline: None,
            command_rx,
            event_tx,
            event_rx,
        };

        tokio::spawn(actor.run());
        debug!("SessionActor spawned");

        SessionHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("SessionActor run loop started");

        loop {
            let deadline = self.queries.next_deadline();
            let enumeration_deadline = self.enumeration_deadline;

            tokio::select! {
                biased;

                Some(tagged) = self.event_rx.recv() => {
                    self.handle_transport_event(tagged);
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All session handles dropped");
                        break;
                    };
                    trace!(?cmd, "Processing command");
                    if let SessionCommand::Shutdown { response } = cmd {
                        self.destroy();
                        if let Some(response) = response {
                            let _ = response.send(());
                        }
                        return;
                    }
                    self.handle_command(cmd);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.send_due_queries();
                }

                _ = sleep_until(enumeration_deadline.unwrap_or_else(Instant::now)),
                    if enumeration_deadline.is_some() => {
                    self.flush_enumeration();
                }
            }
        }

        self.destroy();
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Issue { action, response } => {
                let result = self.issue(action);
                if let Err(e) = &result {
                    debug!(%action, error = %e, "Action rejected");
                }
                let _ = response.send(result);
            },
            SessionCommand::Snapshot { response } => {
                let _ = response.send(self.store.snapshot());
            },
            SessionCommand::Subscribe { listener, response } => {
                let id = self.store.subscribe(listener);
                debug!(subscriber_id = id, "Added subscriber");
                let _ = response.send(id);
            },
            SessionCommand::Start => self.restart(),
            SessionCommand::Reconfigure { host, port } => {
                self.endpoint = Endpoint::new(host, port);
                info!("🔧 DSP endpoint changed to {}", self.endpoint);
                self.restart();
            },
            // Handled by the run loop
            SessionCommand::Shutdown { .. } => {},
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a new transport for a fresh epoch
    fn start(&mut self) {
        self.epoch += 1;
        info!("🔌 Connecting to DSP at {}", self.endpoint);
        self.store.set_connection(ConnectionState::Connecting, None);

        let sink = EventSink::new(self.epoch, self.event_tx.clone());
        self.transport = Some(
            self.connector
                .open(&self.endpoint.host, self.endpoint.port, sink),
        );
    }

    /// Close the transport and drop everything tied to it
    fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if !self.queries.is_empty() {
            debug!(pending = self.queries.len(), "Cancelling pending value queries");
        }
        self.queries.clear();
        self.parser.reset();
        self.enumeration_deadline = None;
        self.epoch += 1;
    }

    /// Full session reset followed by a new connection attempt
    fn restart(&mut self) {
        self.teardown();
        self.store.reset();
        self.start();
    }

    fn destroy(&mut self) {
        self.teardown();
        self.store.reset();
        self.store.set_connection(ConnectionState::Disconnected, None);
        info!("🛑 DSP session closed");
    }

    fn connection_lost(&mut self, reason: String) {
        self.teardown();
        self.store
            .set_connection(ConnectionState::Disconnected, Some(reason));
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    fn handle_transport_event(&mut self, tagged: TaggedEvent) {
        if tagged.epoch != self.epoch {
            trace!(
                epoch = tagged.epoch,
                current = self.epoch,
                "Ignoring event from closed transport"
            );
            return;
        }

        match tagged.event {
            TransportEvent::Connected => {
                self.store.set_connection(ConnectionState::Connected, None);
                info!("✅ Connected to DSP at {}", self.endpoint);

                for command in [Command::GetLatestPreset, Command::GetAllPushEnabled] {
                    if let Err(e) = self.write(command) {
                        warn!("Bootstrap query {} failed: {}", command, e);
                    }
                }
            },
            TransportEvent::Data(chunk) => {
                for message in self.parser.feed(&chunk) {
                    self.apply(message);
                }
                self.enumeration_deadline = self
                    .parser
                    .has_open_enumeration()
                    .then(|| Instant::now() + ENUMERATION_IDLE);
            },
            TransportEvent::Error(reason) => {
                error!("DSP connection error: {}", reason);
                self.connection_lost(reason);
            },
            TransportEvent::Disconnected => {
                warn!("🔌 DSP closed the connection");
                self.connection_lost("connection closed by DSP".to_string());
            },
        }
    }

    fn apply(&mut self, message: Message) {
        match message {
            Message::Ack => trace!("ACK"),
            Message::PushUpdate { control, value }
            | Message::InitialPushValue { control, value } => {
                self.store.set_control(control, value);
            },
            Message::PresetLoaded { preset, global } => {
                debug!(preset, global, "Preset load acknowledged");
                self.store.set_last_preset(preset);
            },
            Message::LatestPreset(preset) => self.store.set_last_preset(preset),
            Message::PushEnabledList(controls) => {
                info!(
                    "📋 DSP reports {} push-enabled controls, querying values",
                    controls.len()
                );
                self.queries.schedule(&controls, Instant::now());
            },
        }
    }

    fn flush_enumeration(&mut self) {
        self.enumeration_deadline = None;
        if let Some(message) = self.parser.flush() {
            debug!("Push-enabled list had no terminator, closing after idle");
            self.apply(message);
        }
    }

    fn send_due_queries(&mut self) {
        for control in self.queries.pop_due(Instant::now()) {
            if let Err(e) = self.write(Command::GetControlValue { control }) {
                debug!(control = control.get(), error = %e, "Value query dropped");
            }
        }
    }

    // =========================================================================
    // Outgoing
    // =========================================================================

    fn issue(&mut self, action: Action) -> Result<()> {
        if action == Action::Reconnect {
            warn!("Reconnecting to DSP");
            self.restart();
            return Ok(());
        }

        action.validate()?;

        if self.store.connection() != ConnectionState::Connected {
            warn!("Unable to perform {}, connection to DSP lost; reconnecting", action);
            self.restart();
            return Err(SessionError::NotConnected);
        }

        let cached = action.control().and_then(|control| self.store.raw(control));
        match action.resolve(cached) {
            Some(command) => self.write(command),
            None => Ok(()),
        }
    }

    fn write(&self, command: Command) -> Result<()> {
        let line = command.encode()?;
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;
        transport.send(&line)?;
        debug!("📤 TX {}", command);
        Ok(())
    }
}
