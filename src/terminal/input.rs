//! Keystroke encoding
//!
//! Turns crossterm key and paste events into the bytes an xterm would send,
//! honoring the remote application's cursor-key and bracketed-paste modes.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::escape::{key, PASTE_END, PASTE_START};

/// Terminal modes set by the remote application that change key encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct InputModes {
    pub application_cursor: bool,
    pub bracketed_paste: bool,
}

/// Encode a terminal event into bytes for the remote shell
///
/// Returns `None` for events that carry no input (resize, focus, mouse,
/// key releases).
pub fn encode_event(event: &Event, modes: InputModes) -> Option<Vec<u8>> {
    let bytes = match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => encode_key(key, modes),
        Event::Paste(text) => encode_paste(text, modes),
        _ => return None,
    };
    if bytes.is_empty() {
        None
    } else {
        Some(bytes)
    }
}

fn encode_paste(text: &str, modes: InputModes) -> Vec<u8> {
    if !modes.bracketed_paste {
        return text.as_bytes().to_vec();
    }
    let mut bytes = PASTE_START.to_vec();
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(PASTE_END);
    bytes
}

/// Encode a key event into bytes
pub fn encode_key(event: &KeyEvent, modes: InputModes) -> Vec<u8> {
    let shift = event.modifiers.contains(KeyModifiers::SHIFT);
    let alt = event.modifiers.contains(KeyModifiers::ALT);
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);

    // xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4)
    let code = 1 + u8::from(shift) + 2 * u8::from(alt) + 4 * u8::from(ctrl);
    let modifier = (code > 1).then_some(code);

    match event.code {
        KeyCode::Char(c) => encode_char(c, ctrl, alt),
        KeyCode::Enter => with_alt(vec![key::CR], alt),
        KeyCode::Backspace => with_alt(vec![key::DEL], alt || ctrl),
        KeyCode::Tab if shift => key::BACK_TAB.to_vec(),
        KeyCode::Tab => vec![key::TAB],
        KeyCode::BackTab => key::BACK_TAB.to_vec(),
        KeyCode::Esc => vec![key::ESC],
        KeyCode::Up => cursor_key(b'A', modifier, modes),
        KeyCode::Down => cursor_key(b'B', modifier, modes),
        KeyCode::Right => cursor_key(b'C', modifier, modes),
        KeyCode::Left => cursor_key(b'D', modifier, modes),
        KeyCode::Home => cursor_key(b'H', modifier, modes),
        KeyCode::End => cursor_key(b'F', modifier, modes),
        KeyCode::Insert => key::tilde(2, modifier),
        KeyCode::Delete => key::tilde(3, modifier),
        KeyCode::PageUp => key::tilde(5, modifier),
        KeyCode::PageDown => key::tilde(6, modifier),
        KeyCode::F(n @ 1..=4) => key::f1_f4(b'P' + (n - 1), modifier),
        KeyCode::F(n) => match function_key_code(n) {
            Some(tilde_code) => key::tilde(tilde_code, modifier),
            None => Vec::new(),
        },
        KeyCode::Null => vec![key::NUL],
        _ => Vec::new(),
    }
}

fn encode_char(c: char, ctrl: bool, alt: bool) -> Vec<u8> {
    let bytes = if ctrl && c.is_ascii() {
        match control_byte(c) {
            Some(b) => vec![b],
            None => c.to_string().into_bytes(),
        }
    } else {
        c.to_string().into_bytes()
    };
    with_alt(bytes, alt)
}

/// Ctrl+char to its C0 control byte
fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' => Some((c.to_ascii_lowercase() as u8) & 0x1f),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        '8' | '?' => Some(0x7f),
        _ => None,
    }
}

fn with_alt(bytes: Vec<u8>, alt: bool) -> Vec<u8> {
    if alt {
        key::alt(&bytes)
    } else {
        bytes
    }
}

fn cursor_key(final_byte: u8, modifier: Option<u8>, modes: InputModes) -> Vec<u8> {
    match modifier {
        Some(m) => key::cursor_modified(final_byte, m),
        None => key::cursor(final_byte, modes.application_cursor),
    }
}

fn function_key_code(n: u8) -> Option<u8> {
    match n {
        5 => Some(15),
        6 => Some(17),
        7 => Some(18),
        8 => Some(19),
        9 => Some(20),
        10 => Some(21),
        11 => Some(23),
        12 => Some(24),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    fn encode(event: Event) -> Option<Vec<u8>> {
        encode_event(&event, InputModes::default())
    }

    #[test]
    fn test_plain_chars_and_enter() {
        assert_eq!(encode(press(KeyCode::Char('l'), KeyModifiers::NONE)), Some(b"l".to_vec()));
        assert_eq!(encode(press(KeyCode::Char('ç'), KeyModifiers::NONE)), Some("ç".as_bytes().to_vec()));
        assert_eq!(encode(press(KeyCode::Enter, KeyModifiers::NONE)), Some(b"\r".to_vec()));
    }

    #[test]
    fn test_ctrl_and_alt() {
        assert_eq!(encode(press(KeyCode::Char('c'), KeyModifiers::CONTROL)), Some(vec![0x03]));
        assert_eq!(encode(press(KeyCode::Char('d'), KeyModifiers::CONTROL)), Some(vec![0x04]));
        assert_eq!(encode(press(KeyCode::Char('b'), KeyModifiers::ALT)), Some(b"\x1bb".to_vec()));
        assert_eq!(encode(press(KeyCode::Backspace, KeyModifiers::NONE)), Some(vec![0x7f]));
    }

    #[test]
    fn test_cursor_keys_follow_application_mode() {
        let up = press(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(encode(up.clone()), Some(b"\x1b[A".to_vec()));
        let modes = InputModes {
            application_cursor: true,
            bracketed_paste: false,
        };
        assert_eq!(encode_event(&up, modes), Some(b"\x1bOA".to_vec()));
        assert_eq!(
            encode(press(KeyCode::Right, KeyModifiers::CONTROL)),
            Some(b"\x1b[1;5C".to_vec())
        );
    }

    #[test]
    fn test_function_and_tilde_keys() {
        assert_eq!(encode(press(KeyCode::F(1), KeyModifiers::NONE)), Some(b"\x1bOP".to_vec()));
        assert_eq!(encode(press(KeyCode::F(5), KeyModifiers::NONE)), Some(b"\x1b[15~".to_vec()));
        assert_eq!(encode(press(KeyCode::Delete, KeyModifiers::NONE)), Some(b"\x1b[3~".to_vec()));
        assert_eq!(
            encode(press(KeyCode::PageUp, KeyModifiers::SHIFT)),
            Some(b"\x1b[5;2~".to_vec())
        );
    }

    #[test]
    fn test_paste_bracketing() {
        let paste = Event::Paste("echo hi".to_string());
        assert_eq!(encode(paste.clone()), Some(b"echo hi".to_vec()));
        let modes = InputModes {
            application_cursor: false,
            bracketed_paste: true,
        };
        assert_eq!(
            encode_event(&paste, modes),
            Some(b"\x1b[200~echo hi\x1b[201~".to_vec())
        );
    }

    #[test]
    fn test_non_input_events() {
        assert_eq!(encode(Event::Resize(80, 24)), None);
        assert_eq!(encode(Event::FocusGained), None);
    }
}
