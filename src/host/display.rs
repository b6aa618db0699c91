use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::{Attribute, Color, SetAttribute, SetBackgroundColor, SetForegroundColor};
use crossterm::QueueableCommand;

use crate::vm::memory::{Memory, TEXT_COLS, TEXT_ROWS};

const CELLS: usize = TEXT_COLS * TEXT_ROWS;

/// Glyphs for 0x00-0x1F.
const CP437_LOW: &str = " ☺☻♥♦♣♠•◘○◙♂♀♪♫☼►◄↕‼¶§▬↨↑↓→←∟↔▲▼";
/// Glyphs for 0x80-0xFF.
const CP437_HIGH: &str = "ÇüéâäàåçêëèïîìÄÅÉæÆôöòûùÿÖÜ¢£¥₧ƒáíóúñÑªº¿⌐¬½¼¡«»\
░▒▓│┤╡╢╖╕╣║╗╝╜╛┐└┴┬├─┼╞╟╚╔╩╦╠═╬╧╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀\
αßΓπΣσµτΦΘΩδ∞φε∩≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{A0}";

/// CGA palette, RGB per 4-bit color index.
const CGA_PALETTE: [(u8, u8, u8); 16] = [
    (0, 0, 0),       // Black
    (0, 0, 170),     // Blue
    (0, 170, 0),     // Green
    (0, 170, 170),   // Cyan
    (170, 0, 0),     // Red
    (170, 0, 170),   // Magenta
    (170, 85, 0),    // Brown
    (170, 170, 170), // Light gray
    (85, 85, 85),    // Dark gray
    (85, 85, 255),   // Light blue
    (85, 255, 85),   // Light green
    (85, 255, 255),  // Light cyan
    (255, 85, 85),   // Light red
    (255, 85, 255),  // Light magenta
    (255, 255, 85),  // Yellow
    (255, 255, 255), // White
];

/// Draws one text page onto the terminal, redrawing only cells that
/// changed since the previous frame.
pub struct TextDisplay {
    prev_buffer: [u16; CELLS],
    needs_full_redraw: bool,
}

impl TextDisplay {
    pub fn new() -> Self {
        Self {
            prev_buffer: [0; CELLS],
            needs_full_redraw: true,
        }
    }

    /// `cursor` is (row, column) on `page`.
    pub fn render(&mut self, out: &mut impl Write, memory: &Memory, page: u8, cursor: (u8, u8)) -> io::Result<()> {
        for (i, cell) in memory.text_buffer(page).chunks(2).enumerate() {
            let (ch, attr) = (cell[0], cell[1]);
            let packed = (attr as u16) << 8 | ch as u16;
            if !self.needs_full_redraw && self.prev_buffer[i] == packed {
                continue;
            }
            self.prev_buffer[i] = packed;

            let row = (i / TEXT_COLS) as u16;
            let col = (i % TEXT_COLS) as u16;
            let bold = if attr & 0x08 != 0 { Attribute::Bold } else { Attribute::NormalIntensity };
            out.queue(MoveTo(col, row))?
                .queue(SetForegroundColor(cga_to_color(attr & 0x0F)))?
                .queue(SetBackgroundColor(cga_to_color((attr >> 4) & 0x07)))?
                .queue(SetAttribute(bold))?;
            write!(out, "{}", cp437_to_char(ch))?;
        }
        self.needs_full_redraw = false;

        out.queue(MoveTo(cursor.1 as u16, cursor.0 as u16))?;
        out.flush()
    }
}

impl Default for TextDisplay {
    fn default() -> Self {
        Self::new()
    }
}

pub fn cga_to_color(index: u8) -> Color {
    let (r, g, b) = CGA_PALETTE[(index & 0x0F) as usize];
    Color::Rgb { r, g, b }
}

pub fn cp437_to_char(byte: u8) -> char {
    let glyph = match byte {
        0x00..=0x1F => CP437_LOW.chars().nth(byte as usize),
        0x7F => Some('⌂'),
        0x80..=0xFF => CP437_HIGH.chars().nth((byte - 0x80) as usize),
        _ => Some(byte as char),
    };
    glyph.unwrap_or(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_tables_are_complete() {
        assert_eq!(CP437_LOW.chars().count(), 0x20);
        assert_eq!(CP437_HIGH.chars().count(), 0x80);
    }

    #[test]
    fn cp437_glyphs() {
        assert_eq!(cp437_to_char(0x00), ' ');
        assert_eq!(cp437_to_char(0x01), '☺');
        assert_eq!(cp437_to_char(b'A'), 'A');
        assert_eq!(cp437_to_char(0xB3), '│');
        assert_eq!(cp437_to_char(0xDB), '█');
        assert_eq!(cp437_to_char(0xE3), 'π');
        assert_eq!(cp437_to_char(0xFF), '\u{A0}');
    }

    #[test]
    fn palette() {
        assert_eq!(cga_to_color(0x07), Color::Rgb { r: 170, g: 170, b: 170 });
        assert_eq!(cga_to_color(0x1E), Color::Rgb { r: 255, g: 255, b: 85 });
    }

    #[test]
    fn redraws_only_changed_cells() {
        let mut memory = Memory::new();
        let mut display = TextDisplay::new();
        let mut out = Vec::new();
        display.render(&mut out, &memory, 0, (0, 0)).unwrap();
        let full = out.len();

        memory.write_byte(crate::vm::memory::VGA_TEXT_BASE, b'#');
        let mut out = Vec::new();
        display.render(&mut out, &memory, 0, (0, 0)).unwrap();
        assert!(out.len() < full / 100);
        assert!(String::from_utf8_lossy(&out).contains('#'));
    }

    #[test]
    fn draws_the_requested_page() {
        use crate::vm::memory::{TEXT_PAGE_BYTES, VGA_TEXT_BASE};

        let mut memory = Memory::new();
        memory.write_byte(VGA_TEXT_BASE, b'@');
        memory.write_byte(VGA_TEXT_BASE + TEXT_PAGE_BYTES, b'#');
        let mut display = TextDisplay::new();

        let mut out = Vec::new();
        display.render(&mut out, &memory, 1, (0, 1)).unwrap();
        let frame = String::from_utf8_lossy(&out);
        assert!(frame.contains('#'));
        assert!(!frame.contains('@'));

        // Switching back repaints the cells that differ
        let mut out = Vec::new();
        display.render(&mut out, &memory, 0, (0, 0)).unwrap();
        assert!(String::from_utf8_lossy(&out).contains('@'));
    }
}
