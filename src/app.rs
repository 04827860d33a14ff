//! nodeterm App - one interactive session at a time
//!
//! Architecture:
//! - The session controller owns the socket, state machine and surface
//! - One loop selects over transport events, host terminal input and the
//!   deferred fit timer, so every state transition happens on this task
//! - Remote output passes straight through the surface to stdout

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::session::{
    Connector, Credential, FailureReason, Phase, SessionController, SessionHandle,
    SessionOptions,
};
use crate::terminal::TerminalSurface;

/// How a session ended, reported once the terminal is restored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Remote side closed normally
    Closed,
    /// User pressed the detach key
    Detached,
    /// Session failed and the user dismissed the error panel
    Failed(FailureReason),
}

pub struct App<K: Connector> {
    controller: SessionController<K>,
    fit_delay: Duration,
    /// Final phases reported by the controller, in order
    disconnects: Rc<RefCell<Vec<(SessionHandle, Phase)>>>,
}

impl<K: Connector> App<K> {
    pub fn new(
        connector: K,
        options: SessionOptions,
        fit_delay: Duration,
        new_surface: impl FnMut() -> TerminalSurface + 'static,
    ) -> Self {
        let mut controller = SessionController::new(connector, options, new_surface);
        let disconnects = Rc::new(RefCell::new(Vec::new()));
        let sink = disconnects.clone();
        controller.on_disconnect(move |handle, phase| {
            sink.borrow_mut().push((handle, phase.clone()));
        });
        Self {
            controller,
            fit_delay,
            disconnects,
        }
    }

    /// Run a session to `host` until it closes, fails or is detached
    pub async fn run(&mut self, host: &str, credential: Option<Credential>) -> Result<Outcome> {
        let handle = self.controller.open_session(host, credential)?;
        let mut events = EventStream::new();

        let fit_timer = tokio::time::sleep(self.fit_delay);
        tokio::pin!(fit_timer);
        let mut fit_pending = true;

        // Set once the error panel is up; the next key dismisses it
        let mut failure: Option<FailureReason> = None;

        let outcome = loop {
            tokio::select! {
                Some((from, event)) = self.controller.next_event() => {
                    self.controller.dispatch(from, event)?;
                }
                input = events.next() => match input {
                    Some(Ok(event)) => {
                        if let Some(reason) = &failure {
                            if is_key_press(&event) {
                                break Outcome::Failed(reason.clone());
                            }
                            continue;
                        }
                        if is_detach_key(&event) {
                            info!(session = %handle, "detach key pressed");
                            break Outcome::Detached;
                        }
                        self.controller.handle_terminal_event(handle, &event)?;
                    }
                    Some(Err(e)) => {
                        self.controller.close_session(handle)?;
                        return Err(e.into());
                    }
                    None => break Outcome::Detached,
                },
                _ = &mut fit_timer, if fit_pending => {
                    fit_pending = false;
                    self.controller.deferred_fit(handle)?;
                }
            }

            let ended = self
                .disconnects
                .borrow_mut()
                .drain(..)
                .find(|(from, _)| *from == handle)
                .map(|(_, phase)| phase);
            match ended {
                Some(Phase::Closed) => break Outcome::Closed,
                Some(Phase::Failed(reason)) => {
                    debug!(session = %handle, "waiting for key to dismiss error panel");
                    failure = Some(reason);
                }
                _ => {}
            }
        };

        self.controller.close_session(handle)?;
        Ok(outcome)
    }
}

/// Ctrl+], which some terminals report as Ctrl+5
fn is_detach_key(event: &Event) -> bool {
    match event {
        Event::Key(key) => {
            key.kind == KeyEventKind::Press
                && key.modifiers.contains(KeyModifiers::CONTROL)
                && matches!(key.code, KeyCode::Char(']') | KeyCode::Char('5'))
        }
        _ => false,
    }
}

fn is_key_press(event: &Event) -> bool {
    matches!(event, Event::Key(key) if key.kind == KeyEventKind::Press)
}
