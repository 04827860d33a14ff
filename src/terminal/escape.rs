//! ANSI escape sequence constants and helpers
//!
//! Readable names for the raw control codes used by the status and error
//! panels, plus the key encodings sent to the remote shell.

// === Screen Control ===

/// Clear the whole screen
pub const CLEAR_SCREEN: &str = "\x1b[2J";

/// Move cursor to home position (top-left)
pub const CURSOR_HOME: &str = "\x1b[H";

// === Text Styles ===

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RESET: &str = "\x1b[0m";

/// Set foreground color using 256-color palette
#[inline]
pub fn fg(color: u8) -> String {
    format!("\x1b[38;5;{}m", color)
}

pub mod color {
    /// Cyan (45) - Titles, host names
    pub const CYAN: u8 = 45;

    /// Yellow (220) - In-progress status
    pub const YELLOW: u8 = 220;

    /// Red (203) - Failures
    pub const RED: u8 = 203;
}

// === Bracketed Paste ===

pub const PASTE_START: &[u8] = b"\x1b[200~";
pub const PASTE_END: &[u8] = b"\x1b[201~";

/// Key encodings (xterm)
pub mod key {
    pub const ESC: u8 = 0x1b;
    pub const DEL: u8 = 0x7f;
    pub const TAB: u8 = b'\t';
    pub const CR: u8 = b'\r';
    pub const NUL: u8 = 0x00;

    /// Shift+Tab (CSI Z)
    pub const BACK_TAB: &[u8] = b"\x1b[Z";

    /// Cursor and editing keys, by final byte or tilde code
    #[inline]
    pub fn cursor(final_byte: u8, application_mode: bool) -> Vec<u8> {
        // Application cursor mode (DECCKM) switches CSI to SS3
        let intro = if application_mode { b'O' } else { b'[' };
        vec![ESC, intro, final_byte]
    }

    /// Cursor key with modifiers (CSI 1 ; modifier final)
    #[inline]
    pub fn cursor_modified(final_byte: u8, modifier: u8) -> Vec<u8> {
        format!("\x1b[1;{}{}", modifier, final_byte as char).into_bytes()
    }

    /// Tilde keys: Insert (2), Delete (3), PageUp (5), PageDown (6), F5-F12
    #[inline]
    pub fn tilde(code: u8, modifier: Option<u8>) -> Vec<u8> {
        match modifier {
            Some(m) => format!("\x1b[{};{}~", code, m).into_bytes(),
            None => format!("\x1b[{}~", code).into_bytes(),
        }
    }

    /// F1-F4 (SS3 P/Q/R/S, or CSI 1 ; modifier P/Q/R/S)
    #[inline]
    pub fn f1_f4(final_byte: u8, modifier: Option<u8>) -> Vec<u8> {
        match modifier {
            Some(m) => format!("\x1b[1;{}{}", m, final_byte as char).into_bytes(),
            None => vec![ESC, b'O', final_byte],
        }
    }

    /// Alt/Meta prefix before character bytes
    #[inline]
    pub fn alt(bytes: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(bytes.len() + 1);
        result.push(ESC);
        result.extend_from_slice(bytes);
        result
    }
}
