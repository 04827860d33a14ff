//! The local terminal a surface is mounted on

use std::io::{stdout, Write};

use anyhow::{Context, Result};
use crossterm::{
    cursor::Show,
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, size as terminal_size, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};

/// Size of the visible terminal area in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub cols: u16,
    pub rows: u16,
}

impl Viewport {
    pub fn new(cols: u16, rows: u16) -> Self {
        // A zero-sized grid is never useful to the remote PTY
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }
}

/// Container a terminal surface attaches to
pub trait Host: Send {
    /// Take over the container and report its size
    fn attach(&mut self) -> Result<Viewport>;
    /// Give the container back in the state it was found
    fn detach(&mut self) -> Result<()>;
    /// Current container size
    fn viewport(&self) -> Result<Viewport>;
}

/// The process's controlling terminal, driven through crossterm
///
/// Attaching enters raw mode and the alternate screen so the remote shell
/// owns the whole window; detaching restores the user's scrollback.
#[derive(Default)]
pub struct CrosstermHost {
    attached: bool,
}

impl Host for CrosstermHost {
    fn attach(&mut self) -> Result<Viewport> {
        let viewport = self.viewport()?;
        enable_raw_mode().context("Failed to enable raw mode")?;
        self.attached = true;
        execute!(stdout(), EnterAlternateScreen, EnableBracketedPaste)
            .context("Failed to enter alternate screen")?;
        Ok(viewport)
    }

    fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        self.attached = false;
        let mut stdout = stdout();
        execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen, Show)?;
        stdout.flush()?;
        disable_raw_mode().context("Failed to disable raw mode")?;
        Ok(())
    }

    fn viewport(&self) -> Result<Viewport> {
        let (cols, rows) = terminal_size().context("Failed to read terminal size")?;
        Ok(Viewport::new(cols, rows))
    }
}

impl Drop for CrosstermHost {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}

/// Restore the terminal from a panic hook, where the host is out of reach
pub fn emergency_restore() {
    let _ = disable_raw_mode();
    let _ = execute!(stdout(), DisableBracketedPaste, LeaveAlternateScreen, Show);
}

/// Fixed-size host with no real terminal behind it
#[cfg(test)]
pub struct HeadlessHost {
    pub viewport: std::sync::Arc<std::sync::Mutex<Viewport>>,
    pub attached: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    pub detached: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl HeadlessHost {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            viewport: std::sync::Arc::new(std::sync::Mutex::new(Viewport::new(cols, rows))),
            attached: Default::default(),
            detached: Default::default(),
        }
    }
}

#[cfg(test)]
impl Host for HeadlessHost {
    fn attach(&mut self) -> Result<Viewport> {
        self.attached.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.viewport()
    }

    fn detach(&mut self) -> Result<()> {
        self.detached.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn viewport(&self) -> Result<Viewport> {
        Ok(*self.viewport.lock().unwrap_or_else(|p| p.into_inner()))
    }
}
