//! Session phases and failure reasons

use std::fmt;

use thiserror::Error;

/// Why a session ended in `Phase::Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Session was opened without a credential token
    #[error("no credential configured for the shell gateway")]
    NoCredential,
    /// Gateway closed with 1008 or sent an error marker while authenticating
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    /// Error marker received while the remote shell was starting
    #[error("remote shell error: {0}")]
    ShellError(String),
    /// Socket-level error reported by the transport
    #[error("transport error: {0}")]
    TransportError(String),
    /// Abnormal close with no earlier classified failure
    #[error("connection lost{}", close_code_suffix(.0))]
    ConnectionLost(Option<u16>),
}

fn close_code_suffix(code: &Option<u16>) -> String {
    match code {
        Some(code) => format!(" (close code {})", code),
        None => String::new(),
    }
}

/// Lifecycle stage of one terminal session
///
/// `Failed` and `Closed` are terminal: no event moves a session out of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Authenticating,
    ShellConnecting,
    Connected,
    Failed(FailureReason),
    Closed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Failed(_) | Phase::Closed)
    }

    /// Short label for status lines and logs
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Connecting => "connecting",
            Phase::Authenticating => "authenticating",
            Phase::ShellConnecting => "starting shell",
            Phase::Connected => "connected",
            Phase::Failed(_) => "failed",
            Phase::Closed => "closed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}
