//! Remote terminal sessions against the shell gateway
//!
//! This module provides:
//! - The transport channel (one WebSocket per session)
//! - The protocol state machine that tracks the session phase
//! - The controller that wires channels, state machines and terminal surfaces

mod controller;
mod endpoint;
mod frame;
mod machine;
mod phase;
mod transport;

use std::fmt;

use uuid::Uuid;

pub use controller::{SessionController, SessionOptions};
pub use frame::{Credential, ProtocolMode};
pub use phase::{FailureReason, Phase};
pub use transport::{Connector, WsConnector};

/// Identifies one session inside the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell sessions apart in logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}
