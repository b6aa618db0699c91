use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::debug;

/// Set 1 make codes, one row of the US layout per entry: first scancode,
/// unshifted keys, shifted keys.
const LAYOUT: [(u8, &str, &str); 4] = [
    (0x02, "1234567890-=", "!@#$%^&*()_+"),
    (0x10, "qwertyuiop[]", "QWERTYUIOP{}"),
    (0x1E, "asdfghjkl;'`", "ASDFGHJKL:\"~"),
    (0x2C, "zxcvbnm,./", "ZXCVBNM<>?"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Key { scancode: u8, ascii: u8 },
    Quit,
}

/// Scancode and ASCII code a BIOS would buffer for `c`.
pub fn char_to_key(c: char) -> Option<(u8, u8)> {
    let scancode = match c {
        '\n' | '\r' => return Some((0x1C, 0x0D)),
        '\t' => return Some((0x0F, 0x09)),
        '\x08' => return Some((0x0E, 0x08)),
        '\x1B' => return Some((0x01, 0x1B)),
        ' ' => 0x39,
        '\\' | '|' => 0x2B,
        _ => LAYOUT.iter().find_map(|(first, plain, shifted)| {
            plain
                .chars()
                .position(|k| k == c)
                .or_else(|| shifted.chars().position(|k| k == c))
                .map(|i| first + i as u8)
        })?,
    };
    Some((scancode, c as u8))
}

/// Keys with no ASCII code (arrows, function keys) buffer an ASCII of 0.
pub fn key_to_scancode(code: KeyCode) -> Option<u8> {
    match code {
        KeyCode::Esc => Some(0x01),
        KeyCode::Backspace => Some(0x0E),
        KeyCode::Tab => Some(0x0F),
        KeyCode::Enter => Some(0x1C),
        KeyCode::Char(c) => char_to_key(c).map(|(scancode, _)| scancode),
        KeyCode::F(n @ 1..=10) => Some(0x3A + n),
        KeyCode::Home => Some(0x47),
        KeyCode::Up => Some(0x48),
        KeyCode::PageUp => Some(0x49),
        KeyCode::Left => Some(0x4B),
        KeyCode::Right => Some(0x4D),
        KeyCode::End => Some(0x4F),
        KeyCode::Down => Some(0x50),
        KeyCode::PageDown => Some(0x51),
        KeyCode::Insert => Some(0x52),
        KeyCode::Delete => Some(0x53),
        _ => None,
    }
}

pub fn translate(key: &KeyEvent) -> Option<HostEvent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return Some(HostEvent::Quit);
    }

    let scancode = key_to_scancode(key.code)?;
    let ascii = match key.code {
        KeyCode::Char(c) if ctrl && c.is_ascii_alphabetic() => c.to_ascii_uppercase() as u8 & 0x1F,
        KeyCode::Char(c) if c.is_ascii() => c as u8,
        KeyCode::Esc => 0x1B,
        KeyCode::Backspace => 0x08,
        KeyCode::Tab => 0x09,
        KeyCode::Enter => 0x0D,
        _ => 0x00,
    };
    Some(HostEvent::Key { scancode, ascii })
}

/// Non-blocking: returns the next translated key press, if any.
pub fn poll_event() -> io::Result<Option<HostEvent>> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if let Some(event) = translate(&key) {
                debug!("Host key {:?}", event);
                return Ok(Some(event));
            }
        }
    }
    Ok(None)
}
