//! Terminal front end: renders the text buffer with crossterm and feeds
//! key presses into the BIOS keyboard buffer.

pub mod display;
pub mod keyboard;

use std::io::{self, Stdout, Write};

use crossterm::cursor::{Hide, Show};
use crossterm::style::ResetColor;
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::execute;
use log::warn;

use crate::vm::runtime::Runtime;
use display::TextDisplay;
use keyboard::HostEvent;

/// Owns the terminal in raw mode for as long as it lives.
pub struct Terminal {
    out: Stdout,
    display: TextDisplay,
}

impl Terminal {
    pub fn enter() -> io::Result<Self> {
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, Hide, Clear(ClearType::All))?;
        Ok(Self { out, display: TextDisplay::new() })
    }

    pub fn render(&mut self, vm: &Runtime) -> io::Result<()> {
        let page = vm.bios.active_page;
        let cursor = vm.bios.cursor[page as usize % vm.bios.cursor.len()];
        self.display.render(&mut self.out, &vm.memory, page, cursor)
    }

    /// Moves pending key presses into the guest. Returns `false` once the
    /// user asked to quit.
    pub fn pump_keys(&mut self, vm: &mut Runtime) -> io::Result<bool> {
        while let Some(event) = keyboard::poll_event()? {
            match event {
                HostEvent::Quit => return Ok(false),
                HostEvent::Key { scancode, ascii } => {
                    if !vm.inject_key(scancode, ascii) {
                        warn!("Keyboard buffer full, dropping scancode {:02X}", scancode);
                    }
                }
            }
        }
        Ok(true)
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let _ = execute!(self.out, ResetColor, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
        let _ = self.out.flush();
    }
}
