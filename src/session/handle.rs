//! SessionHandle - Public API for the SessionActor
//!
//! Cheap to clone. Every method is a message to the actor; actions and
//! queries await a oneshot reply, lifecycle requests return immediately.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::actor::SessionActor;
use super::commands::SessionCommand;
use super::{Action, Endpoint};
use crate::error::{Result, SessionError};
use crate::state::{SessionSnapshot, SubscriberFn};
use crate::transport::{Connector, TcpConnector};

/// Handle for driving a DSP session
///
/// # Lifecycle
/// - `start` / `restart` - connect (or reconnect) to the current endpoint
/// - `reconfigure` - switch endpoint and reconnect
/// - `destroy` - close the connection and stop the actor
///
/// # Actions and queries
/// - `issue` - run an [`Action`] against the device
/// - `snapshot` - copy of the tracked state
/// - `subscribe` - register a [`StateEvent`](crate::state::StateEvent) listener
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Spawn a session over plain TCP
    pub fn spawn(endpoint: Endpoint) -> Self {
        Self::spawn_with(endpoint, Arc::new(TcpConnector))
    }

    /// Spawn a session over a custom connector
    pub fn spawn_with(endpoint: Endpoint, connector: Arc<dyn Connector>) -> Self {
        SessionActor::spawn(endpoint, connector)
    }

    fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| SessionError::Closed)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the configured endpoint, resetting any previous session
    pub fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start)
    }

    /// Tear down the current connection and connect again
    pub fn restart(&self) -> Result<()> {
        self.start()
    }

    /// Replace host and port, then reconnect
    pub fn reconfigure(&self, host: impl Into<String>, port: u16) -> Result<()> {
        self.send(SessionCommand::Reconfigure {
            host: host.into(),
            port,
        })
    }

    /// Close the connection, reset state and wait for the actor to stop
    pub async fn destroy(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(SessionCommand::Shutdown {
                response: Some(response_tx),
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    // =========================================================================
    // Actions and queries
    // =========================================================================

    /// Validate and send an action
    ///
    /// Fails with [`SessionError::NotConnected`] when the session is not
    /// connected; the session has already started reconnecting by then.
    pub async fn issue(&self, action: Action) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Issue {
            action,
            response: response_tx,
        })?;
        response_rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot {
            response: response_tx,
        })?;
        response_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Register a listener for state events, returns its id
    pub async fn subscribe(&self, listener: SubscriberFn) -> Result<usize> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe {
            listener,
            response: response_tx,
        })?;
        response_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Whether the actor is still running
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}
