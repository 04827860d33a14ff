//! Wire frames exchanged with the shell gateway
//!
//! Outbound control frames share one JSON envelope keyed by `type`:
//! - `{"type":"auth","credentials":"<token>"}`, sent once after connect
//! - `{"type":"resize","cols":120,"rows":40}`
//!
//! Keystrokes travel raw with no envelope. Inbound frames are classified
//! according to the session's `ProtocolMode` until the shell is connected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token authorizing a session with the gateway
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// JSON control envelope for outbound frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Auth { credentials: String },
    Resize { cols: u16, rows: u16 },
}

/// Frame sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Auth(Credential),
    /// Raw keystroke bytes
    Input(Vec<u8>),
    Resize { rows: u16, cols: u16 },
}

/// Encoded form of an outbound frame, ready for the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl OutboundFrame {
    pub fn encode(&self) -> WirePayload {
        match self {
            OutboundFrame::Auth(credential) => WirePayload::Text(control_json(&ControlMessage::Auth {
                credentials: credential.expose().to_string(),
            })),
            OutboundFrame::Resize { rows, cols } => WirePayload::Text(control_json(
                &ControlMessage::Resize {
                    cols: *cols,
                    rows: *rows,
                },
            )),
            OutboundFrame::Input(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => WirePayload::Text(text.to_string()),
                Err(_) => WirePayload::Binary(bytes.clone()),
            },
        }
    }

    /// Short description for logs (never includes the credential)
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Auth(_) => "auth",
            OutboundFrame::Input(_) => "input",
            OutboundFrame::Resize { .. } => "resize",
        }
    }
}

fn control_json(message: &ControlMessage) -> String {
    // Serializing these plain structs cannot fail
    serde_json::to_string(message).unwrap_or_default()
}

/// Frame received from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl InboundFrame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            InboundFrame::Text(text) => text.as_bytes(),
            InboundFrame::Binary(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            InboundFrame::Text(text) => text.into_bytes(),
            InboundFrame::Binary(bytes) => bytes,
        }
    }

    fn text_lossy(&self) -> std::borrow::Cow<'_, str> {
        match self {
            InboundFrame::Text(text) => std::borrow::Cow::Borrowed(text.as_str()),
            InboundFrame::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

/// How inbound frames are classified before the shell is connected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Substring markers in free-form text, as sent by existing gateways
    #[default]
    Markers,
    /// Tagged JSON control frames alongside raw output
    Structured,
}

impl ProtocolMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "markers" | "legacy" => Some(ProtocolMode::Markers),
            "structured" | "json" => Some(ProtocolMode::Structured),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolMode::Markers => "markers",
            ProtocolMode::Structured => "structured",
        }
    }
}

/// What an inbound frame means for the session phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Gateway accepted the credential
    AuthSucceeded(String),
    /// Gateway is opening the remote shell
    ShellStarting(String),
    /// Shell prompt or login banner observed
    ShellReady,
    /// Error reported by the gateway
    Error(String),
    /// Opaque terminal output
    Output,
}

const ERROR_MARKERS: &[&str] = &["ERRO:", "ERROR:"];
const AUTH_SUCCESS_MARKERS: &[&str] = &["Autenticação bem-sucedida", "Authentication successful"];
const SHELL_START_MARKERS: &[&str] = &["iniciando SSH", "Starting SSH"];
const PROMPT_MARKERS: &[&str] = &["$", "#", "Welcome", "login:"];

/// Control envelope sent by gateways speaking the structured protocol
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayControl {
    Authenticated {
        #[serde(default)]
        message: Option<String>,
    },
    ShellStarted {
        #[serde(default)]
        message: Option<String>,
    },
    ShellReady,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Classify an inbound frame received before the shell is connected
pub fn classify(frame: &InboundFrame, mode: ProtocolMode) -> Classification {
    match mode {
        ProtocolMode::Markers => classify_markers(&frame.text_lossy()),
        ProtocolMode::Structured => classify_structured(frame),
    }
}

fn classify_markers(text: &str) -> Classification {
    if let Some(pos) = ERROR_MARKERS.iter().filter_map(|m| text.find(m)).min() {
        return Classification::Error(text[pos..].trim().to_string());
    }
    if AUTH_SUCCESS_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::AuthSucceeded(text.trim().to_string());
    }
    if SHELL_START_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::ShellStarting(text.trim().to_string());
    }
    if PROMPT_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::ShellReady;
    }
    Classification::Output
}

/// Whether a status frame also carries the shell prompt after its marker
///
/// Only markers mode mixes status text and terminal output in one frame.
pub fn prompt_follows_status(frame: &InboundFrame, mode: ProtocolMode) -> bool {
    if mode != ProtocolMode::Markers {
        return false;
    }
    let text = frame.text_lossy();
    let status_end = AUTH_SUCCESS_MARKERS
        .iter()
        .chain(SHELL_START_MARKERS)
        .filter_map(|m| text.rfind(m).map(|pos| pos + m.len()))
        .max();
    match status_end {
        Some(end) => PROMPT_MARKERS.iter().any(|m| text[end..].contains(m)),
        None => false,
    }
}

fn classify_structured(frame: &InboundFrame) -> Classification {
    let InboundFrame::Text(text) = frame else {
        return Classification::Output;
    };
    if !text.trim_start().starts_with('{') {
        return Classification::Output;
    }
    match serde_json::from_str::<GatewayControl>(text) {
        Ok(GatewayControl::Authenticated { message }) => {
            Classification::AuthSucceeded(message.unwrap_or_else(|| "Authenticated".to_string()))
        }
        Ok(GatewayControl::ShellStarted { message }) => {
            Classification::ShellStarting(message.unwrap_or_else(|| "Starting shell".to_string()))
        }
        Ok(GatewayControl::ShellReady) => Classification::ShellReady,
        Ok(GatewayControl::Error { message }) => {
            Classification::Error(message.unwrap_or_else(|| "gateway error".to_string()))
        }
        Err(_) => Classification::Output,
    }
}
