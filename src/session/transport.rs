//! Transport channel to the shell gateway
//!
//! One WebSocket per session. A single spawned task owns the socket and
//! forwards outbound frames and inbound messages in order. Lifecycle events
//! reach the controller through an `EventSender`:
//! - exactly one `Opened` on success
//! - any number of `Message`
//! - then `Error` + `Closed`, or `Closed` alone
//!
//! There is no reconnection: a stale remote shell cannot be resumed by
//! reopening the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        error::ProtocolError,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message,
    },
};
use tracing::{debug, info, warn};

use super::frame::{InboundFrame, OutboundFrame, WirePayload};
use super::machine::CLOSE_AUTH_REJECTED;
use super::SessionHandle;

/// How long a local close waits for the gateway's close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle event reported by a transport channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(InboundFrame),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// Delivers channel events for one session to the controller
#[derive(Clone)]
pub struct EventSender {
    handle: SessionHandle,
    tx: mpsc::UnboundedSender<(SessionHandle, ChannelEvent)>,
}

impl EventSender {
    pub fn new(handle: SessionHandle, tx: mpsc::UnboundedSender<(SessionHandle, ChannelEvent)>) -> Self {
        Self { handle, tx }
    }

    /// Returns false once the controller has gone away
    pub fn emit(&self, event: ChannelEvent) -> bool {
        self.tx.send((self.handle, event)).is_ok()
    }
}

/// Bidirectional message channel owned by one session
pub trait Channel {
    /// Queue a frame; a no-op unless the channel is open
    fn send(&mut self, frame: OutboundFrame);
    /// Request closure; safe to call any number of times
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// Opens transport channels
pub trait Connector {
    type Channel: Channel;

    /// Start connecting to `url`; events are reported through `events`
    fn connect(&self, url: &str, events: EventSender) -> Self::Channel;
}

enum Outgoing {
    Frame(Message),
    Close,
}

/// Connector for `ws://` / `wss://` gateways
#[derive(Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Channel = WsChannel;

    fn connect(&self, url: &str, events: EventSender) -> WsChannel {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_socket(url.to_string(), outgoing_rx, events, open.clone()));
        WsChannel {
            outgoing_tx,
            open,
            task,
            closed: false,
        }
    }
}

/// WebSocket-backed channel handle
pub struct WsChannel {
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
    closed: bool,
}

impl Channel for WsChannel {
    fn send(&mut self, frame: OutboundFrame) {
        if self.closed || !self.is_open() {
            debug!(kind = frame.kind(), "dropping frame on closed channel");
            return;
        }
        let message = match frame.encode() {
            WirePayload::Text(text) => Message::Text(text),
            WirePayload::Binary(bytes) => Message::Binary(bytes),
        };
        let _ = self.outgoing_tx.send(Outgoing::Frame(message));
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.is_open() {
            let _ = self.outgoing_tx.send(Outgoing::Close);
        } else {
            // Still handshaking (or already finished); nothing to close gracefully
            self.task.abort();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    url: String,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSender,
    open: Arc<AtomicBool>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(WsError::Http(response))
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            info!(status = %response.status(), "gateway refused the upgrade");
            events.emit(ChannelEvent::Closed {
                code: Some(CLOSE_AUTH_REJECTED),
                reason: format!("gateway refused connection ({})", response.status()),
            });
            return;
        }
        Err(e) => {
            warn!(error = %e, "websocket connect failed");
            events.emit(ChannelEvent::Error(format!("could not connect: {}", e)));
            events.emit(ChannelEvent::Closed {
                code: None,
                reason: String::new(),
            });
            return;
        }
    };

    info!("websocket established");
    open.store(true, Ordering::SeqCst);
    if !events.emit(ChannelEvent::Opened) {
        return;
    }

    let (mut write, mut read) = stream.split();
    let mut close_code: Option<u16> = None;
    let mut close_reason = String::new();
    let mut closing = false;
    let mut close_deadline = tokio::time::Instant::now();

    let terminal = loop {
        tokio::select! {
            outgoing = outgoing_rx.recv(), if !closing => match outgoing {
                Some(Outgoing::Frame(message)) => {
                    if let Err(e) = write.send(message).await {
                        break Some(format!("send failed: {}", e));
                    }
                }
                Some(Outgoing::Close) | None => {
                    closing = true;
                    close_deadline = tokio::time::Instant::now() + CLOSE_TIMEOUT;
                    open.store(false, Ordering::SeqCst);
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    close_code = Some(u16::from(CloseCode::Normal));
                    if write.send(Message::Close(Some(frame))).await.is_err() {
                        break None;
                    }
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !closing {
                        events.emit(ChannelEvent::Message(InboundFrame::Text(text)));
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !closing {
                        events.emit(ChannelEvent::Message(InboundFrame::Binary(bytes)));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if !closing {
                        if let Some(frame) = frame {
                            close_code = Some(u16::from(frame.code));
                            close_reason = frame.reason.to_string();
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if matches!(
                        e,
                        WsError::ConnectionClosed
                            | WsError::AlreadyClosed
                            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
                    ) || closing
                    {
                        break None;
                    }
                    break Some(e.to_string());
                }
                None => break None,
            },
            _ = tokio::time::sleep_until(close_deadline), if closing => {
                debug!("close handshake timed out");
                break None;
            }
        }
    };

    open.store(false, Ordering::SeqCst);
    if let Some(detail) = terminal {
        warn!(%detail, "websocket error");
        events.emit(ChannelEvent::Error(detail));
    }
    info!(code = ?close_code, "websocket closed");
    events.emit(ChannelEvent::Closed {
        code: close_code,
        reason: close_reason,
    });
}
