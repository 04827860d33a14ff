//! Session controller
//!
//! Owns every open session together with its transport channel, state
//! machine and terminal surface. Transport events for all sessions arrive on
//! one queue tagged with the session handle and are applied in delivery
//! order, one at a time.

use std::collections::HashMap;

use anyhow::Result;
use crossterm::event::Event;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::endpoint::session_url;
use super::frame::{Credential, ProtocolMode};
use super::machine::{Effect, SessionEvent, SessionMachine};
use super::phase::Phase;
use super::transport::{Channel, ChannelEvent, Connector, EventSender};
use super::SessionHandle;
use crate::terminal::TerminalSurface;

/// Where and how sessions connect
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Gateway base URL (`wss://`, `ws://`, `https://` or `http://`)
    pub gateway_url: String,
    pub protocol: ProtocolMode,
    /// Dashboard `user:password`, sent as the handshake authorization
    pub basic_auth: Option<String>,
}

type SurfaceFactory = Box<dyn FnMut() -> TerminalSurface>;
type DisconnectCallback = Box<dyn FnMut(SessionHandle, &Phase)>;

struct Session<C> {
    host: String,
    machine: SessionMachine,
    channel: C,
    surface: TerminalSurface,
    /// Disconnect notification already delivered
    notified: bool,
}

pub struct SessionController<K: Connector> {
    connector: K,
    options: SessionOptions,
    new_surface: SurfaceFactory,
    sessions: HashMap<SessionHandle, Session<K::Channel>>,
    events_tx: mpsc::UnboundedSender<(SessionHandle, ChannelEvent)>,
    events_rx: mpsc::UnboundedReceiver<(SessionHandle, ChannelEvent)>,
    on_disconnect: Option<DisconnectCallback>,
}

impl<K: Connector> SessionController<K> {
    pub fn new(
        connector: K,
        options: SessionOptions,
        new_surface: impl FnMut() -> TerminalSurface + 'static,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            options,
            new_surface: Box::new(new_surface),
            sessions: HashMap::new(),
            events_tx,
            events_rx,
            on_disconnect: None,
        }
    }

    /// Register the disconnect notification
    ///
    /// Called once per session, when it closes normally or fails. Not called
    /// for sessions ended through `close_session`.
    pub fn on_disconnect(&mut self, callback: impl FnMut(SessionHandle, &Phase) + 'static) {
        self.on_disconnect = Some(Box::new(callback));
    }

    /// Open a terminal session to `host`; starts connecting immediately
    pub fn open_session(&mut self, host: &str, credential: Option<Credential>) -> Result<SessionHandle> {
        let url = session_url(
            &self.options.gateway_url,
            host,
            self.options.basic_auth.as_deref(),
        )?;
        let handle = SessionHandle::new();

        let mut surface = (self.new_surface)();
        let viewport = surface.mount()?;
        surface.show_status(host, &format!("Connecting to {}...", host))?;

        info!(session = %handle, host, protocol = self.options.protocol.as_str(), "opening session");
        let channel = self
            .connector
            .connect(&url, EventSender::new(handle, self.events_tx.clone()));

        self.sessions.insert(
            handle,
            Session {
                host: host.to_string(),
                machine: SessionMachine::new(credential, self.options.protocol),
                channel,
                surface,
                notified: false,
            },
        );

        // Remembered by the machine and sent once the shell is up
        self.apply(
            handle,
            SessionEvent::Resize {
                rows: viewport.rows,
                cols: viewport.cols,
            },
        )?;
        Ok(handle)
    }

    /// Close a session and release its channel and surface
    ///
    /// Safe to call in any phase, more than once, or after the channel has
    /// already closed.
    pub fn close_session(&mut self, handle: SessionHandle) -> Result<()> {
        let Some(mut session) = self.sessions.remove(&handle) else {
            return Ok(());
        };
        session.machine.handle(SessionEvent::CloseRequested);
        session.channel.close();
        info!(session = %handle, host = %session.host, "session closed");
        session.surface.dispose()
    }

    pub fn phase(&self, handle: SessionHandle) -> Option<&Phase> {
        self.sessions.get(&handle).map(|s| s.machine.phase())
    }

    #[cfg(test)]
    pub fn is_open(&self, handle: SessionHandle) -> bool {
        self.sessions.contains_key(&handle)
    }

    /// Wait for the next transport event from any session
    pub async fn next_event(&mut self) -> Option<(SessionHandle, ChannelEvent)> {
        self.events_rx.recv().await
    }

    /// Apply every transport event already queued
    #[cfg(test)]
    pub fn process_pending(&mut self) -> Result<usize> {
        let mut processed = 0;
        while let Ok((handle, event)) = self.events_rx.try_recv() {
            self.dispatch(handle, event)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Feed one transport event to its session
    pub fn dispatch(&mut self, handle: SessionHandle, event: ChannelEvent) -> Result<()> {
        let event = match event {
            ChannelEvent::Opened => SessionEvent::ChannelOpened,
            ChannelEvent::Message(frame) => SessionEvent::Inbound(frame),
            ChannelEvent::Error(detail) => SessionEvent::ChannelError(detail),
            ChannelEvent::Closed { code, reason } => SessionEvent::ChannelClosed { code, reason },
        };
        self.apply(handle, event)
    }

    /// Route a host terminal event (keys, paste, resize) to a session
    pub fn handle_terminal_event(&mut self, handle: SessionHandle, event: &Event) -> Result<()> {
        let Some(session) = self.sessions.get_mut(&handle) else {
            return Ok(());
        };
        let session_event = match event {
            Event::Resize(cols, rows) => match session.surface.fit(crate::terminal::Viewport::new(*cols, *rows)) {
                Some(viewport) => SessionEvent::Resize {
                    rows: viewport.rows,
                    cols: viewport.cols,
                },
                None => return Ok(()),
            },
            other => match session.surface.encode_input(other) {
                Some(bytes) => SessionEvent::Keystroke(bytes),
                None => return Ok(()),
            },
        };
        self.apply(handle, session_event)
    }

    /// Re-measure the host terminal once layout has settled after mount
    pub fn deferred_fit(&mut self, handle: SessionHandle) -> Result<()> {
        let Some(session) = self.sessions.get_mut(&handle) else {
            return Ok(());
        };
        match session.surface.refit()? {
            Some(viewport) => self.apply(
                handle,
                SessionEvent::Resize {
                    rows: viewport.rows,
                    cols: viewport.cols,
                },
            ),
            None => Ok(()),
        }
    }

    fn apply(&mut self, handle: SessionHandle, event: SessionEvent) -> Result<()> {
        let Some(session) = self.sessions.get_mut(&handle) else {
            debug!(session = %handle, "event for unknown session dropped");
            return Ok(());
        };

        // A failed surface write must not skip the channel and notification effects
        let mut surface_error: Option<anyhow::Error> = None;
        let mut notify = false;
        for effect in session.machine.handle(event) {
            let drawn = match effect {
                Effect::Send(frame) => {
                    if session.channel.is_open() {
                        debug!(session = %handle, kind = frame.kind(), "sending frame");
                        session.channel.send(frame);
                    }
                    Ok(())
                }
                Effect::Render(bytes) => session.surface.write(&bytes),
                Effect::Status(text) => session.surface.show_status(&session.host, &text),
                Effect::Reveal => session.surface.reveal(),
                Effect::ShowError(reason) => {
                    session.surface.show_error(&session.host, &reason.to_string())
                }
                Effect::CloseChannel => {
                    session.channel.close();
                    Ok(())
                }
                Effect::NotifyDisconnect => {
                    if !session.notified {
                        session.notified = true;
                        notify = true;
                    }
                    Ok(())
                }
            };
            if let Err(e) = drawn {
                warn!(session = %handle, error = %e, "terminal write failed");
                surface_error.get_or_insert(e);
            }
        }

        if notify {
            let phase = session.machine.phase().clone();
            info!(session = %handle, %phase, "session disconnected");
            if let Some(callback) = self.on_disconnect.as_mut() {
                callback(handle, &phase);
            }
        }
        match surface_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<K: Connector> Drop for SessionController<K> {
    fn drop(&mut self) {
        let handles: Vec<SessionHandle> = self.sessions.keys().copied().collect();
        for handle in handles {
            let _ = self.close_session(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::*;
    use crate::session::frame::{InboundFrame, OutboundFrame};
    use crate::session::phase::FailureReason;
    use crate::terminal::host::HeadlessHost;
    use crate::terminal::surface::test_support::SharedBuffer;

    /// Gateway side of an in-memory channel
    #[derive(Clone)]
    struct FakeGateway {
        url: String,
        events: EventSender,
        sent: Arc<Mutex<Vec<OutboundFrame>>>,
        open: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
    }

    impl FakeGateway {
        fn accept(&self) {
            self.open.store(true, Ordering::SeqCst);
            self.events.emit(ChannelEvent::Opened);
        }

        fn say(&self, text: &str) {
            self.events
                .emit(ChannelEvent::Message(InboundFrame::Text(text.to_string())));
        }

        fn hang_up(&self, code: u16) {
            self.open.store(false, Ordering::SeqCst);
            self.events.emit(ChannelEvent::Closed {
                code: Some(code),
                reason: String::new(),
            });
        }

        fn sent(&self) -> Vec<OutboundFrame> {
            self.sent.lock().unwrap().clone()
        }
    }

    struct FakeChannel {
        sent: Arc<Mutex<Vec<OutboundFrame>>>,
        open: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
    }

    impl Channel for FakeChannel {
        fn send(&mut self, frame: OutboundFrame) {
            if self.is_open() {
                self.sent.lock().unwrap().push(frame);
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        gateways: Arc<Mutex<Vec<FakeGateway>>>,
    }

    impl FakeConnector {
        fn last(&self) -> FakeGateway {
            self.gateways.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Connector for FakeConnector {
        type Channel = FakeChannel;

        fn connect(&self, url: &str, events: EventSender) -> FakeChannel {
            let gateway = FakeGateway {
                url: url.to_string(),
                events,
                sent: Default::default(),
                open: Default::default(),
                closes: Default::default(),
            };
            let channel = FakeChannel {
                sent: gateway.sent.clone(),
                open: gateway.open.clone(),
                closes: gateway.closes.clone(),
            };
            self.gateways.lock().unwrap().push(gateway);
            channel
        }
    }

    struct Harness {
        controller: SessionController<FakeConnector>,
        connector: FakeConnector,
        screen: SharedBuffer,
        disconnects: Arc<Mutex<Vec<(SessionHandle, Phase)>>>,
        detached: Arc<AtomicUsize>,
    }

    fn harness(protocol: ProtocolMode) -> Harness {
        let connector = FakeConnector::default();
        let screen = SharedBuffer::default();
        let detached = Arc::new(AtomicUsize::new(0));
        let options = SessionOptions {
            gateway_url: "wss://monitor.example.com".to_string(),
            protocol,
            basic_auth: None,
        };
        let surface_out = screen.clone();
        let surface_detached = detached.clone();
        let mut controller = SessionController::new(connector.clone(), options, move || {
            let mut host = HeadlessHost::new(80, 24);
            host.detached = surface_detached.clone();
            TerminalSurface::new(Box::new(host), Box::new(surface_out.clone()))
        });
        let disconnects = Arc::new(Mutex::new(Vec::new()));
        let sink = disconnects.clone();
        controller.on_disconnect(move |handle, phase| {
            sink.lock().unwrap().push((handle, phase.clone()));
        });
        Harness {
            controller,
            connector,
            screen,
            disconnects,
            detached,
        }
    }

    fn connect(h: &mut Harness) -> (SessionHandle, FakeGateway) {
        let handle = h
            .controller
            .open_session("10.0.0.5", Some(Credential::new("tok")))
            .unwrap();
        let gateway = h.connector.last();
        gateway.accept();
        gateway.say("Autenticação bem-sucedida, iniciando SSH...");
        gateway.say("user@host:~$ ");
        h.controller.process_pending().unwrap();
        (handle, gateway)
    }

    #[test]
    fn test_open_builds_session_url() {
        let mut h = harness(ProtocolMode::Markers);
        let handle = h.controller.open_session("10.0.0.5", None).unwrap();
        assert_eq!(h.connector.last().url, "wss://monitor.example.com/ws/ssh/10.0.0.5");
        assert_eq!(h.controller.phase(handle), Some(&Phase::Connecting));
        assert!(h.screen.text().contains("Connecting to 10.0.0.5"));
    }

    #[test]
    fn test_auth_frame_sent_once_and_first() {
        let mut h = harness(ProtocolMode::Markers);
        let (handle, gateway) = connect(&mut h);
        assert_eq!(h.controller.phase(handle), Some(&Phase::Connected));

        let sent = gateway.sent();
        assert_eq!(sent[0], OutboundFrame::Auth(Credential::new("tok")));
        let auth_frames = sent
            .iter()
            .filter(|f| matches!(f, OutboundFrame::Auth(_)))
            .count();
        assert_eq!(auth_frames, 1);
    }

    #[test]
    fn test_prompt_reveals_terminal() {
        let mut h = harness(ProtocolMode::Markers);
        let handle = h
            .controller
            .open_session("10.0.0.5", Some(Credential::new("tok")))
            .unwrap();
        let gateway = h.connector.last();
        gateway.accept();
        gateway.say("Autenticação bem-sucedida, iniciando SSH...");
        h.controller.process_pending().unwrap();
        assert_eq!(h.controller.phase(handle), Some(&Phase::ShellConnecting));
        assert!(h.screen.text().contains("iniciando SSH"));

        h.screen.clear();
        gateway.say("user@host:~$ ");
        h.controller.process_pending().unwrap();
        assert_eq!(h.controller.phase(handle), Some(&Phase::Connected));
        assert!(h.screen.text().ends_with("user@host:~$ "));
    }

    #[test]
    fn test_initial_size_sent_after_connect() {
        let mut h = harness(ProtocolMode::Markers);
        let (_, gateway) = connect(&mut h);
        assert_eq!(
            gateway.sent()[1..],
            [OutboundFrame::Resize { rows: 24, cols: 80 }]
        );
    }

    #[test]
    fn test_resize_while_connected_sends_one_notice() {
        let mut h = harness(ProtocolMode::Markers);
        let (handle, gateway) = connect(&mut h);
        let before = gateway.sent().len();

        h.controller
            .handle_terminal_event(handle, &Event::Resize(120, 40))
            .unwrap();

        let new_frames = gateway.sent()[before..].to_vec();
        assert_eq!(new_frames, vec![OutboundFrame::Resize { rows: 40, cols: 120 }]);
    }

    #[test]
    fn test_keystrokes_forwarded_raw() {
        let mut h = harness(ProtocolMode::Markers);
        let (handle, gateway) = connect(&mut h);
        let key = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        h.controller.handle_terminal_event(handle, &key).unwrap();
        assert_eq!(gateway.sent().last(), Some(&OutboundFrame::Input(vec![0x03])));
    }

    #[test]
    fn test_auth_rejected_close() {
        let mut h = harness(ProtocolMode::Markers);
        let handle = h
            .controller
            .open_session("10.0.0.5", Some(Credential::new("bad")))
            .unwrap();
        let gateway = h.connector.last();
        gateway.accept();
        gateway.hang_up(1008);
        h.controller.process_pending().unwrap();

        assert!(matches!(
            h.controller.phase(handle),
            Some(Phase::Failed(FailureReason::AuthRejected(_)))
        ));
        assert!(h.screen.text().contains("Session failed"));
        let disconnects = h.disconnects.lock().unwrap();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0].0, handle);
    }

    #[test]
    fn test_no_credential_never_sends() {
        let mut h = harness(ProtocolMode::Markers);
        let handle = h.controller.open_session("10.0.0.5", None).unwrap();
        let gateway = h.connector.last();
        gateway.accept();
        h.controller.process_pending().unwrap();

        assert!(gateway.sent().is_empty());
        assert_eq!(
            h.controller.phase(handle),
            Some(&Phase::Failed(FailureReason::NoCredential))
        );
        assert_eq!(h.disconnects.lock().unwrap().len(), 1);
        assert!(gateway.closes.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_normal_close_notifies_once() {
        let mut h = harness(ProtocolMode::Markers);
        let (handle, gateway) = connect(&mut h);
        gateway.hang_up(1000);
        gateway.hang_up(1000);
        gateway.say("late");
        h.controller.process_pending().unwrap();

        assert_eq!(h.controller.phase(handle), Some(&Phase::Closed));
        assert_eq!(
            *h.disconnects.lock().unwrap(),
            vec![(handle, Phase::Closed)]
        );
    }

    #[test]
    fn test_close_session_is_idempotent() {
        let mut h = harness(ProtocolMode::Markers);
        let (handle, gateway) = connect(&mut h);

        h.controller.close_session(handle).unwrap();
        h.controller.close_session(handle).unwrap();
        gateway.hang_up(1000);
        h.controller.process_pending().unwrap();

        assert!(!h.controller.is_open(handle));
        assert_eq!(h.detached.load(Ordering::SeqCst), 1);
        assert!(h.disconnects.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_after_failure() {
        let mut h = harness(ProtocolMode::Markers);
        let handle = h
            .controller
            .open_session("10.0.0.5", Some(Credential::new("tok")))
            .unwrap();
        let gateway = h.connector.last();
        gateway.events.emit(ChannelEvent::Error("connection refused".to_string()));
        gateway.events.emit(ChannelEvent::Closed {
            code: None,
            reason: String::new(),
        });
        h.controller.process_pending().unwrap();
        assert_eq!(
            h.controller.phase(handle),
            Some(&Phase::Failed(FailureReason::TransportError(
                "connection refused".to_string()
            )))
        );

        h.controller.close_session(handle).unwrap();
        assert_eq!(h.detached.load(Ordering::SeqCst), 1);
        assert_eq!(h.disconnects.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut h = harness(ProtocolMode::Markers);
        let (first, first_gateway) = connect(&mut h);
        let second = h.controller.open_session("10.0.0.6", None).unwrap();
        let second_gateway = h.connector.last();

        second_gateway.accept();
        h.controller.process_pending().unwrap();

        assert_eq!(h.controller.phase(first), Some(&Phase::Connected));
        assert!(h.controller.phase(second).is_some_and(Phase::is_terminal));
        assert_eq!(first_gateway.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_releases_sessions() {
        let mut h = harness(ProtocolMode::Markers);
        let (_, gateway) = connect(&mut h);
        let detached = h.detached.clone();
        drop(h);
        assert_eq!(detached.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.closes.load(Ordering::SeqCst), 1);
    }

    /// Terminal writer that starts failing once armed
    #[derive(Clone, Default)]
    struct FailingTerminal(Arc<AtomicBool>);

    impl std::io::Write for FailingTerminal {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.0.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "terminal gone",
                ));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failure_effects_survive_terminal_write_error() {
        let connector = FakeConnector::default();
        let terminal = FailingTerminal::default();
        let out = terminal.clone();
        let options = SessionOptions {
            gateway_url: "wss://monitor.example.com".to_string(),
            protocol: ProtocolMode::Markers,
            basic_auth: None,
        };
        let mut controller = SessionController::new(connector.clone(), options, move || {
            TerminalSurface::new(Box::new(HeadlessHost::new(80, 24)), Box::new(out.clone()))
        });
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        controller.on_disconnect(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handle = controller
            .open_session("10.0.0.5", Some(Credential::new("tok")))
            .unwrap();
        let gateway = connector.last();
        gateway.accept();
        controller.process_pending().unwrap();

        terminal.0.store(true, Ordering::SeqCst);
        gateway.say("ERRO: bad");
        assert!(controller.process_pending().is_err());
        assert_eq!(
            controller.phase(handle),
            Some(&Phase::Failed(FailureReason::AuthRejected("ERRO: bad".to_string())))
        );
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.closes.load(Ordering::SeqCst), 1);

        gateway.hang_up(1011);
        controller.process_pending().unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_next_event_delivers_in_order() {
        let mut h = harness(ProtocolMode::Structured);
        let handle = h
            .controller
            .open_session("10.0.0.5", Some(Credential::new("tok")))
            .unwrap();
        let gateway = h.connector.last();
        gateway.accept();
        gateway.say(r#"{"type":"authenticated"}"#);
        gateway.say("banner\n");
        gateway.say(r#"{"type":"shell_ready"}"#);

        for _ in 0..4 {
            let (from, event) = h.controller.next_event().await.unwrap();
            assert_eq!(from, handle);
            h.controller.dispatch(from, event).unwrap();
        }
        assert_eq!(h.controller.phase(handle), Some(&Phase::Connected));
        assert!(h.screen.text().ends_with("banner\r\n"));
    }
}
