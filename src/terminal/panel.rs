//! Status and error panels shown while the remote terminal is hidden
//!
//! Panels are drawn from the top-left of a cleared screen. Lines end with
//! CRLF because the host terminal is in raw mode.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::escape::{color, fg, BOLD, CLEAR_SCREEN, CURSOR_HOME, DIM, RESET};
use super::host::Viewport;

/// Widest a panel gets, even on very wide terminals
const MAX_PANEL_WIDTH: usize = 72;

/// Panel shown while connecting, authenticating and starting the shell
pub fn status_panel(viewport: Viewport, host: &str, status: &str) -> String {
    let mut panel = Panel::new(viewport, host);
    panel.line(&format!("{}●{} {}", fg(color::YELLOW), RESET, status), status.width() + 2);
    panel.blank();
    panel.dim_line("Ctrl+] disconnects");
    panel.finish()
}

/// Panel that replaces the terminal once a session has failed
pub fn error_panel(viewport: Viewport, host: &str, reason: &str) -> String {
    let mut panel = Panel::new(viewport, host);
    panel.line(
        &format!("{}{}✖ Session failed{}", BOLD, fg(color::RED), RESET),
        "✖ Session failed".width(),
    );
    panel.blank();
    for line in wrap(reason, panel.inner_width()) {
        let width = line.width();
        panel.line(&line, width);
    }
    panel.blank();
    panel.dim_line("Press any key to return");
    panel.finish()
}

struct Panel {
    width: usize,
    out: String,
}

impl Panel {
    fn new(viewport: Viewport, host: &str) -> Self {
        let width = (viewport.cols as usize).clamp(20, MAX_PANEL_WIDTH);
        let bar = "─".repeat(width.saturating_sub(2));
        let mut panel = Self {
            width,
            out: format!("{}{}", CLEAR_SCREEN, CURSOR_HOME),
        };

        panel.raw(&format!("{DIM}┌{bar}┐{RESET}"));

        let title = "NODETERM";
        let host = truncate(host, width.saturating_sub(title.len() + 6));
        let padding = width.saturating_sub(4 + title.len() + host.width());
        panel.raw(&format!(
            "{DIM}│{RESET} {BOLD}{}{title}{RESET}{}{host} {DIM}│{RESET}",
            fg(color::CYAN),
            " ".repeat(padding)
        ));

        panel.raw(&format!("{DIM}├{bar}┤{RESET}"));
        panel
    }

    fn inner_width(&self) -> usize {
        self.width.saturating_sub(4)
    }

    /// Add a row; `plain_width` is the display width without escape codes
    fn line(&mut self, content: &str, plain_width: usize) {
        let padding = self.inner_width().saturating_sub(plain_width);
        self.raw(&format!(
            "{DIM}│{RESET} {}{} {DIM}│{RESET}",
            content,
            " ".repeat(padding)
        ));
    }

    fn dim_line(&mut self, text: &str) {
        self.line(&format!("{DIM}{}{RESET}", text), text.width());
    }

    fn blank(&mut self) {
        self.line("", 0);
    }

    fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push_str("\r\n");
    }

    fn finish(mut self) -> String {
        let bar = "─".repeat(self.width.saturating_sub(2));
        self.raw(&format!("{DIM}└{bar}┘{RESET}"));
        self.out
    }
}

/// Cut `text` to at most `max` display columns
fn truncate(text: &str, max: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > max {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

/// Word-wrap `text` into lines of at most `width` display columns
///
/// Words wider than a line are split across lines.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.width()
        } else {
            current.width() + 1 + word.width()
        };
        if needed <= width {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        let mut rest = word;
        while rest.width() > width {
            let mut piece = truncate(rest, width);
            if piece.is_empty() {
                // Single character wider than the line
                piece = rest.chars().take(1).collect();
            }
            rest = &rest[piece.len()..];
            lines.push(piece);
        }
        current.push_str(rest);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
