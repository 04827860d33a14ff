//! Terminal surface for one remote session
//!
//! Remote output passes through to the host terminal untouched apart from
//! newline conversion, while a vt100 parser keeps a model of the screen so we
//! know which key encodings the remote application expects.
//!
//! Until the shell is connected the surface is hidden and only shows the
//! status panel; a failed session shows the error panel instead.

use std::io::Write;

use anyhow::Result;
use crossterm::event::Event;
use tracing::debug;

use super::escape::{CLEAR_SCREEN, CURSOR_HOME};
use super::host::{Host, Viewport};
use super::input::{encode_event, InputModes};
use super::panel::{error_panel, status_panel};

/// Scrollback kept by the screen model
const SCROLLBACK_LINES: usize = 1000;

pub struct TerminalSurface {
    host: Box<dyn Host>,
    out: Box<dyn Write + Send>,
    parser: vt100::Parser,
    viewport: Viewport,
    mounted: bool,
    visible: bool,
    /// Last byte written was a carriage return
    after_cr: bool,
}

impl TerminalSurface {
    pub fn new(host: Box<dyn Host>, out: Box<dyn Write + Send>) -> Self {
        let viewport = Viewport::new(80, 24);
        Self {
            host,
            out,
            parser: vt100::Parser::new(viewport.rows, viewport.cols, SCROLLBACK_LINES),
            viewport,
            mounted: false,
            visible: false,
            after_cr: false,
        }
    }

    /// Attach to the host terminal and size the screen model to it
    pub fn mount(&mut self) -> Result<Viewport> {
        if self.mounted {
            return Ok(self.viewport);
        }
        let viewport = self.host.attach()?;
        self.mounted = true;
        self.fit(viewport);
        Ok(self.viewport)
    }

    #[cfg(test)]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Recompute the grid for a new container size
    ///
    /// Returns the new size when it changed, so the caller can tell the
    /// remote PTY.
    pub fn fit(&mut self, viewport: Viewport) -> Option<Viewport> {
        let viewport = Viewport::new(viewport.cols, viewport.rows);
        if viewport == self.viewport {
            return None;
        }
        debug!(cols = viewport.cols, rows = viewport.rows, "terminal resized");
        self.viewport = viewport;
        self.parser.set_size(viewport.rows, viewport.cols);
        Some(viewport)
    }

    /// Re-read the host size and fit to it
    pub fn refit(&mut self) -> Result<Option<Viewport>> {
        if !self.mounted {
            return Ok(None);
        }
        let viewport = self.host.viewport()?;
        Ok(self.fit(viewport))
    }

    /// Show remote output; bare LF becomes CRLF
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.mounted || !self.visible || data.is_empty() {
            return Ok(());
        }
        let converted = self.convert_eol(data);

        // vt100 can panic on odd cursor positions; never let that take the session down
        let parser = &mut self.parser;
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            parser.process(&converted);
        }));

        self.out.write_all(&converted)?;
        self.out.flush()?;
        Ok(())
    }

    fn convert_eol(&mut self, data: &[u8]) -> Vec<u8> {
        let mut converted = Vec::with_capacity(data.len() + 8);
        for &byte in data {
            if byte == b'\n' && !self.after_cr {
                converted.push(b'\r');
            }
            converted.push(byte);
            self.after_cr = byte == b'\r';
        }
        converted
    }

    /// Translate a host input event into bytes for the remote shell
    pub fn encode_input(&self, event: &Event) -> Option<Vec<u8>> {
        let screen = self.parser.screen();
        let modes = InputModes {
            application_cursor: screen.application_cursor(),
            bracketed_paste: screen.bracketed_paste(),
        };
        encode_event(event, modes)
    }

    /// Status panel while the terminal is hidden
    pub fn show_status(&mut self, host: &str, status: &str) -> Result<()> {
        if !self.mounted || self.visible {
            return Ok(());
        }
        let panel = status_panel(self.viewport, host, status);
        self.out.write_all(panel.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    /// Clear the status panel and start showing remote output
    pub fn reveal(&mut self) -> Result<()> {
        if !self.mounted || self.visible {
            return Ok(());
        }
        self.visible = true;
        write!(self.out, "{}{}", CLEAR_SCREEN, CURSOR_HOME)?;
        self.out.flush()?;
        Ok(())
    }

    /// Replace the terminal view with the error panel
    pub fn show_error(&mut self, host: &str, reason: &str) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.visible = false;
        let panel = error_panel(self.viewport, host, reason);
        self.out.write_all(panel.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    /// Plain-text contents of the screen model
    #[cfg(test)]
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }

    /// Give the host terminal back; later calls do nothing
    pub fn dispose(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;
        self.visible = false;
        self.host.detach()
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}
