use crate::bios::bda;
use crate::vm::memory::{linear, Memory, TEXT_COLS, TEXT_PAGES, TEXT_PAGE_BYTES, TEXT_ROWS, VGA_TEXT_BASE};
use crate::vm::runtime::Runtime;
use log::{debug, warn};

pub const PAGE_BYTES: usize = TEXT_PAGE_BYTES;
pub const PAGES: usize = TEXT_PAGES;
pub const BLANK_ATTRIBUTE: u8 = 0x07;

const LAST_ROW: u8 = TEXT_ROWS as u8 - 1;
const LAST_COL: u8 = TEXT_COLS as u8 - 1;

/// INT 10h: Video services
pub fn int10h(vm: &mut Runtime) {
    let ah = vm.cpu.registers.ax.high();
    debug!("[INT10h] AH={:02X} AL={:02X}", ah, vm.cpu.registers.ax.low());
    match ah {
        0x00 => set_video_mode(vm),
        0x01 => set_cursor_shape(vm),
        0x02 => {
            let page = vm.cpu.registers.bx.high();
            let row = vm.cpu.registers.dx.high();
            let col = vm.cpu.registers.dx.low();
            set_cursor(vm, page, row, col);
        }
        0x03 => get_cursor(vm),
        0x05 => {
            let page = vm.cpu.registers.ax.low() & 0x07;
            vm.bios.active_page = page;
            vm.memory.write_byte(bda::ACTIVE_PAGE, page);
        }
        0x06 | 0x07 => {
            let registers = &vm.cpu.registers;
            let window = Window {
                top: registers.cx.high(),
                left: registers.cx.low(),
                bottom: registers.dx.high(),
                right: registers.dx.low(),
            };
            let lines = registers.ax.low();
            let attr = registers.bx.high();
            let page = vm.bios.active_page;
            scroll(&mut vm.memory, page, window, attr, lines, ah == 0x06);
        }
        0x08 => read_char_attr(vm),
        0x09 => write_chars(vm, true),
        0x0A => write_chars(vm, false),
        0x0E => {
            let ch = vm.cpu.registers.ax.low();
            teletype(vm, ch);
        }
        0x0F => {
            vm.cpu.registers.ax.set_low(vm.bios.video_mode);
            vm.cpu.registers.ax.set_high(TEXT_COLS as u8);
            vm.cpu.registers.bx.set_high(vm.bios.active_page);
        }
        0x13 => write_string(vm),
        _ => warn!("[INT10h] unsupported function AH={:02X}", ah),
    }
}

#[inline]
fn cell_addr(page: u8, row: u8, col: u8) -> usize {
    VGA_TEXT_BASE
        + (page as usize & 0x07) * PAGE_BYTES
        + (row as usize * TEXT_COLS + col as usize) * 2
}

fn blank(memory: &mut Memory, addr: usize, cells: usize, attr: u8) {
    for i in 0..cells {
        memory.write_byte(addr + i * 2, b' ');
        memory.write_byte(addr + i * 2 + 1, attr);
    }
}

/// Inclusive character-cell rectangle.
#[derive(Clone, Copy, Debug)]
pub struct Window {
    pub top: u8,
    pub left: u8,
    pub bottom: u8,
    pub right: u8,
}

impl Window {
    pub const FULL: Window = Window { top: 0, left: 0, bottom: LAST_ROW, right: LAST_COL };
}

/// Scrolls `window` by `lines` rows, filling vacated rows with blanks in
/// `attr`. Zero lines, or more than the window holds, clears it.
pub fn scroll(memory: &mut Memory, page: u8, window: Window, attr: u8, lines: u8, up: bool) {
    let bottom = window.bottom.min(LAST_ROW);
    let right = window.right.min(LAST_COL);
    if window.top > bottom || window.left > right {
        return;
    }
    let height = bottom - window.top + 1;
    let cells = (right - window.left + 1) as usize;
    let lines = if lines == 0 || lines > height { height } else { lines };

    for i in 0..height - lines {
        let (src, dst) = if up {
            (window.top + i + lines, window.top + i)
        } else {
            (bottom - i - lines, bottom - i)
        };
        memory.move_block(cell_addr(page, src, window.left), cell_addr(page, dst, window.left), cells * 2);
    }
    for i in 0..lines {
        let row = if up { bottom - i } else { window.top + i };
        blank(memory, cell_addr(page, row, window.left), cells, attr);
    }
}

/// Moves the cursor of `page` and mirrors it into the BDA.
pub fn set_cursor(vm: &mut Runtime, page: u8, row: u8, col: u8) {
    let page = page & 0x07;
    vm.bios.cursor[page as usize] = (row, col);
    let offset = bda::CURSOR_POS + page as usize * 2;
    vm.memory.write_byte(offset, col);
    vm.memory.write_byte(offset + 1, row);
}

fn set_video_mode(vm: &mut Runtime) {
    let al = vm.cpu.registers.ax.low();
    // Bit 7 = don't clear screen
    set_mode(vm, al & 0x7F, al & 0x80 == 0);
}

/// Every mode is served as 80x25 text; the number is only recorded.
pub fn set_mode(vm: &mut Runtime, mode: u8, clear: bool) {
    if clear {
        blank(&mut vm.memory, VGA_TEXT_BASE, PAGES * PAGE_BYTES / 2, BLANK_ATTRIBUTE);
    }
    if mode != 0x03 && mode != 0x07 {
        debug!("[INT10h] mode {:02X} requested, staying in 80x25 text", mode);
    }

    vm.bios.video_mode = mode;
    vm.bios.active_page = 0;
    vm.memory.write_byte(bda::VIDEO_MODE, mode);
    vm.memory.write_word(bda::VIDEO_COLS, TEXT_COLS as u16);
    vm.memory.write_word(bda::PAGE_SIZE, PAGE_BYTES as u16);
    vm.memory.write_byte(bda::VIDEO_ROWS, LAST_ROW);
    vm.memory.write_byte(bda::ACTIVE_PAGE, 0);
    for page in 0..PAGES as u8 {
        set_cursor(vm, page, 0, 0);
    }
}

fn set_cursor_shape(vm: &mut Runtime) {
    let start = vm.cpu.registers.cx.high();
    let end = vm.cpu.registers.cx.low();
    vm.bios.cursor_shape = (start, end);
    vm.memory.write_byte(bda::CURSOR_SHAPE, end);
    vm.memory.write_byte(bda::CURSOR_SHAPE + 1, start);
}

fn get_cursor(vm: &mut Runtime) {
    let page = vm.cpu.registers.bx.high() & 0x07;
    let (row, col) = vm.bios.cursor[page as usize];
    let (start, end) = vm.bios.cursor_shape;
    let registers = &mut vm.cpu.registers;
    registers.dx.set_high(row);
    registers.dx.set_low(col);
    registers.cx.set_high(start);
    registers.cx.set_low(end);
}

fn read_char_attr(vm: &mut Runtime) {
    let page = vm.cpu.registers.bx.high();
    let (row, col) = vm.bios.cursor[page as usize & 0x07];
    let addr = cell_addr(page, row, col);
    let ch = vm.memory.read_byte(addr);
    let attr = vm.memory.read_byte(addr + 1);
    vm.cpu.registers.ax.set_low(ch);
    vm.cpu.registers.ax.set_high(attr);
}

/// AH=09/0A: CX copies of AL at the cursor, which does not move. AH=0A
/// keeps the attributes already on screen.
fn write_chars(vm: &mut Runtime, with_attr: bool) {
    let ch = vm.cpu.registers.ax.low();
    let page = vm.cpu.registers.bx.high();
    let attr = vm.cpu.registers.bx.low();
    let (row, col) = vm.bios.cursor[page as usize & 0x07];

    let first = row as usize * TEXT_COLS + col as usize;
    let count = (vm.cpu.registers.cx.word() as usize).min((TEXT_COLS * TEXT_ROWS).saturating_sub(first));
    let base = cell_addr(page, 0, 0);
    for cell in first..first + count {
        vm.memory.write_byte(base + cell * 2, ch);
        if with_attr {
            vm.memory.write_byte(base + cell * 2 + 1, attr);
        }
    }
}

/// AH=0E: writes one character on the active page and advances the cursor.
pub fn teletype(vm: &mut Runtime, ch: u8) {
    let page = vm.bios.active_page;
    let (mut row, mut col) = vm.bios.cursor[page as usize];

    match ch {
        // Bell
        0x07 => return,
        // Backspace
        0x08 => col = col.saturating_sub(1),
        // Tab
        0x09 => col = (col / 8 + 1).saturating_mul(8),
        // Line feed
        0x0A => row = row.saturating_add(1),
        // Carriage return
        0x0D => col = 0,
        _ => {
            let addr = cell_addr(page, row, col);
            vm.memory.write_byte(addr, ch);
            vm.memory.write_byte(addr + 1, vm.bios.default_attribute);
            col = col.saturating_add(1);
        }
    }

    if col > LAST_COL {
        col = 0;
        row = row.saturating_add(1);
    }
    if row > LAST_ROW {
        scroll(&mut vm.memory, page, Window::FULL, BLANK_ATTRIBUTE, 1, true);
        row = LAST_ROW;
    }
    set_cursor(vm, page, row, col);
}

/// AH=13: writes CX characters from ES:BP at DH,DL. AL bit 0 leaves the
/// cursor after the string, bit 1 means the string interleaves attributes.
fn write_string(vm: &mut Runtime) {
    let registers = &vm.cpu.registers;
    let mode = registers.ax.low();
    let attr = registers.bx.low();
    let page = registers.bx.high() & 0x07;
    let length = registers.cx.word();
    let (row, col) = (registers.dx.high(), registers.dx.low());
    let segment = registers.es.word();
    let mut offset = registers.bp.word();

    let saved = vm.bios.cursor[page as usize];
    set_cursor(vm, page, row, col);

    for _ in 0..length {
        let ch = vm.memory.read_byte(linear(segment, offset));
        offset = offset.wrapping_add(1);
        let cell_attr = if mode & 0x02 != 0 {
            let value = vm.memory.read_byte(linear(segment, offset));
            offset = offset.wrapping_add(1);
            value
        } else {
            attr
        };

        let (mut row, mut col) = vm.bios.cursor[page as usize];
        match ch {
            0x07 | 0x08 | 0x0A | 0x0D => {
                let active = vm.bios.active_page;
                vm.bios.active_page = page;
                teletype(vm, ch);
                vm.bios.active_page = active;
                continue;
            }
            _ => {
                let addr = cell_addr(page, row, col);
                vm.memory.write_byte(addr, ch);
                vm.memory.write_byte(addr + 1, cell_attr);
            }
        }
        col = col.saturating_add(1);
        if col > LAST_COL {
            col = 0;
            row = row.saturating_add(1);
        }
        if row > LAST_ROW {
            scroll(&mut vm.memory, page, Window::FULL, BLANK_ATTRIBUTE, 1, true);
            row = LAST_ROW;
        }
        set_cursor(vm, page, row, col);
    }

    if mode & 0x01 == 0 {
        set_cursor(vm, page, saved.0, saved.1);
    }
}

/// Page 0 as text, one line per row with trailing blanks removed.
pub fn screen_text(memory: &Memory) -> String {
    let buffer = memory.text_buffer(0);
    let mut lines = Vec::with_capacity(TEXT_ROWS);
    for row in buffer.chunks(TEXT_COLS * 2) {
        let line: String = row
            .chunks(2)
            .map(|cell| match cell[0] {
                0x20..=0x7E => cell[0] as char,
                _ => ' ',
            })
            .collect();
        lines.push(line.trim_end().to_string());
    }
    while lines.last().map_or(false, |line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_addresses() {
        assert_eq!(cell_addr(0, 0, 0), 0xB8000);
        assert_eq!(cell_addr(0, 1, 2), 0xB8000 + 164);
        assert_eq!(cell_addr(1, 0, 0), 0xB9000);
    }

    #[test]
    fn scroll_window_up_and_down() {
        let mut memory = Memory::new();
        for row in 0..4u8 {
            memory.write_byte(cell_addr(0, row, 5), b'0' + row);
        }
        let window = Window { top: 0, left: 5, bottom: 3, right: 5 };

        scroll(&mut memory, 0, window, 0x1F, 1, true);
        assert_eq!(memory.read_byte(cell_addr(0, 0, 5)), b'1');
        assert_eq!(memory.read_byte(cell_addr(0, 2, 5)), b'3');
        assert_eq!(memory.read_byte(cell_addr(0, 3, 5)), b' ');
        assert_eq!(memory.read_byte(cell_addr(0, 3, 5) + 1), 0x1F);
        // Outside the window
        assert_eq!(memory.read_byte(cell_addr(0, 0, 4)), 0);

        scroll(&mut memory, 0, window, 0x07, 2, false);
        assert_eq!(memory.read_byte(cell_addr(0, 0, 5)), b' ');
        assert_eq!(memory.read_byte(cell_addr(0, 2, 5)), b'1');
        assert_eq!(memory.read_byte(cell_addr(0, 3, 5)), b'2');

        scroll(&mut memory, 0, window, 0x07, 0, true);
        for row in 0..4u8 {
            assert_eq!(memory.read_byte(cell_addr(0, row, 5)), b' ');
        }
    }

    #[test]
    fn screen_text_trims() {
        let mut memory = Memory::new();
        memory.load(VGA_TEXT_BASE, &[b'H', 7, b'i', 7]);
        memory.load(VGA_TEXT_BASE + TEXT_COLS * 2, &[b' ', 7, b'!', 7]);
        assert_eq!(screen_text(&memory), "Hi\n !");
    }
}
