//! Session protocol state machine
//!
//! Maps transport events and local intents onto `Phase` transitions and
//! returns the side effects the controller must carry out. The machine never
//! touches the socket or the terminal itself, so the resulting phase depends
//! only on the starting phase and the sequence of events.

use tracing::{debug, info, warn};

use super::frame::{
    classify, prompt_follows_status, Classification, Credential, InboundFrame, OutboundFrame,
    ProtocolMode,
};
use super::phase::{FailureReason, Phase};

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Policy violation, used by the gateway to reject authentication
pub const CLOSE_AUTH_REJECTED: u16 = 1008;

/// Input to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ChannelOpened,
    Inbound(InboundFrame),
    ChannelError(String),
    ChannelClosed { code: Option<u16>, reason: String },
    Keystroke(Vec<u8>),
    Resize { rows: u16, cols: u16 },
    CloseRequested,
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(OutboundFrame),
    /// Write bytes to the terminal surface
    Render(Vec<u8>),
    /// Status text shown while the terminal is hidden
    Status(String),
    /// Show the terminal view
    Reveal,
    /// Replace the view with the error panel
    ShowError(FailureReason),
    CloseChannel,
    NotifyDisconnect,
}

pub struct SessionMachine {
    phase: Phase,
    mode: ProtocolMode,
    /// Taken when the auth frame is sent
    credential: Option<Credential>,
    channel_open: bool,
    /// Output received before the terminal is revealed
    pending_output: Vec<u8>,
    /// Latest viewport size seen before the shell connected
    pending_resize: Option<(u16, u16)>,
}

impl SessionMachine {
    pub fn new(credential: Option<Credential>, mode: ProtocolMode) -> Self {
        Self {
            phase: Phase::Connecting,
            mode,
            credential,
            channel_open: false,
            pending_output: Vec::new(),
            pending_resize: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    #[cfg(test)]
    pub fn is_channel_open(&self) -> bool {
        self.channel_open
    }

    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        if self.phase.is_terminal() {
            if let SessionEvent::ChannelClosed { .. } = event {
                self.channel_open = false;
            }
            debug!(phase = %self.phase, "ignoring event after session ended");
            return Vec::new();
        }

        match event {
            SessionEvent::ChannelOpened => self.on_open(),
            SessionEvent::Inbound(frame) => self.on_inbound(frame),
            SessionEvent::ChannelError(detail) => {
                warn!(%detail, "transport error");
                self.fail(FailureReason::TransportError(detail))
            }
            SessionEvent::ChannelClosed { code, reason } => self.on_close(code, reason),
            SessionEvent::Keystroke(bytes) => self.on_keystroke(bytes),
            SessionEvent::Resize { rows, cols } => self.on_resize(rows, cols),
            SessionEvent::CloseRequested => {
                info!(phase = %self.phase, "session close requested");
                self.phase = Phase::Closed;
                vec![Effect::CloseChannel]
            }
        }
    }

    fn on_open(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Connecting {
            warn!(phase = %self.phase, "duplicate open event");
            return Vec::new();
        }
        self.channel_open = true;
        match self.credential.take() {
            Some(credential) => {
                self.phase = Phase::Authenticating;
                vec![
                    Effect::Send(OutboundFrame::Auth(credential)),
                    Effect::Status("Authenticating...".to_string()),
                ]
            }
            None => self.fail(FailureReason::NoCredential),
        }
    }

    fn on_inbound(&mut self, frame: InboundFrame) -> Vec<Effect> {
        match self.phase {
            Phase::Connected => vec![Effect::Render(frame.into_bytes())],
            Phase::Authenticating => match classify(&frame, self.mode) {
                Classification::Error(message) => self.fail(FailureReason::AuthRejected(message)),
                Classification::AuthSucceeded(status) | Classification::ShellStarting(status) => {
                    info!("gateway accepted credential");
                    self.phase = Phase::ShellConnecting;
                    self.on_status(status, frame)
                }
                Classification::ShellReady | Classification::Output => {
                    self.buffer(frame);
                    Vec::new()
                }
            },
            Phase::ShellConnecting => match classify(&frame, self.mode) {
                Classification::Error(message) => self.fail(FailureReason::ShellError(message)),
                Classification::ShellStarting(status) | Classification::AuthSucceeded(status) => {
                    self.on_status(status, frame)
                }
                Classification::ShellReady => {
                    if self.mode == ProtocolMode::Markers {
                        // The prompt itself is terminal output
                        self.buffer(frame);
                    }
                    self.connect()
                }
                Classification::Output => {
                    self.buffer(frame);
                    Vec::new()
                }
            },
            Phase::Connecting => {
                warn!("inbound frame before channel open; dropped");
                Vec::new()
            }
            Phase::Failed(_) | Phase::Closed => Vec::new(),
        }
    }

    /// Status update while the shell starts; the same frame may end with the prompt
    fn on_status(&mut self, status: String, frame: InboundFrame) -> Vec<Effect> {
        if !prompt_follows_status(&frame, self.mode) {
            return vec![Effect::Status(status)];
        }
        self.buffer(frame);
        let mut effects = vec![Effect::Status(status)];
        effects.extend(self.connect());
        effects
    }

    fn on_close(&mut self, code: Option<u16>, reason: String) -> Vec<Effect> {
        self.channel_open = false;
        info!(?code, %reason, phase = %self.phase, "channel closed");
        match code {
            Some(CLOSE_NORMAL) => {
                self.phase = Phase::Closed;
                vec![Effect::NotifyDisconnect]
            }
            Some(CLOSE_AUTH_REJECTED) => {
                let detail = if reason.is_empty() {
                    "gateway closed the connection (1008)".to_string()
                } else {
                    reason
                };
                self.fail(FailureReason::AuthRejected(detail))
            }
            other => self.fail(FailureReason::ConnectionLost(other)),
        }
    }

    fn on_keystroke(&mut self, bytes: Vec<u8>) -> Vec<Effect> {
        if self.phase != Phase::Connected || !self.channel_open || bytes.is_empty() {
            return Vec::new();
        }
        vec![Effect::Send(OutboundFrame::Input(bytes))]
    }

    fn on_resize(&mut self, rows: u16, cols: u16) -> Vec<Effect> {
        if self.phase != Phase::Connected {
            self.pending_resize = Some((rows, cols));
            return Vec::new();
        }
        if !self.channel_open {
            return Vec::new();
        }
        vec![Effect::Send(OutboundFrame::Resize { rows, cols })]
    }

    fn buffer(&mut self, frame: InboundFrame) {
        self.pending_output.extend_from_slice(frame.as_bytes());
    }

    fn connect(&mut self) -> Vec<Effect> {
        info!("remote shell connected");
        self.phase = Phase::Connected;
        let mut effects = vec![Effect::Reveal];
        if !self.pending_output.is_empty() {
            effects.push(Effect::Render(std::mem::take(&mut self.pending_output)));
        }
        if let Some((rows, cols)) = self.pending_resize.take() {
            if self.channel_open {
                effects.push(Effect::Send(OutboundFrame::Resize { rows, cols }));
            }
        }
        effects
    }

    fn fail(&mut self, reason: FailureReason) -> Vec<Effect> {
        warn!(%reason, "session failed");
        self.phase = Phase::Failed(reason.clone());
        self.pending_output.clear();
        vec![
            Effect::ShowError(reason),
            Effect::NotifyDisconnect,
            Effect::CloseChannel,
        ]
    }
}
