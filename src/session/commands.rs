//! Command enum for the session actor
//!
//! Host requests reach the actor as messages. Queries and actions answer
//! through oneshot channels; lifecycle requests are fire-and-forget.

use tokio::sync::oneshot;

use super::Action;
use crate::error::Result;
use crate::state::{SessionSnapshot, SubscriberFn};

pub enum SessionCommand {
    /// Validate, resolve and write an action
    Issue {
        action: Action,
        response: oneshot::Sender<Result<()>>,
    },

    /// Copy of the current state
    Snapshot {
        response: oneshot::Sender<SessionSnapshot>,
    },

    /// Register a state change listener
    Subscribe {
        listener: SubscriberFn,
        response: oneshot::Sender<usize>,
    },

    /// (Re)start the session against the current endpoint
    Start,

    /// Replace the endpoint and restart
    Reconfigure { host: String, port: u16 },

    /// Close the transport and stop the actor
    Shutdown {
        response: Option<oneshot::Sender<()>>,
    },
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Issue { action, .. } => write!(f, "Issue({})", action),
            SessionCommand::Snapshot { .. } => write!(f, "Snapshot"),
            SessionCommand::Subscribe { .. } => write!(f, "Subscribe"),
            SessionCommand::Start => write!(f, "Start"),
            SessionCommand::Reconfigure { host, port } => {
                write!(f, "Reconfigure({}:{})", host, port)
            },
            SessionCommand::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}
