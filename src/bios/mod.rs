//! Firmware services emulated in Rust. Software interrupts aimed at a
//! serviced vector are handled here instead of going through the IVT.

pub mod bda;
pub mod disk;
pub mod dos;
pub mod keyboard;
pub mod video;


pub use keyboard::KeyboardBuffer;

use crate::vm::memory::{BIOS_ROM, MEMORY_SIZE, TEXT_COLS, TEXT_ROWS};
use crate::vm::runtime::Runtime;
use log::debug;

pub const DEFAULT_ATTRIBUTE: u8 = 0x07;
const ROM_DATE_TEXT: &[u8] = b"01/01/92";
const MODEL_PC_AT: u8 = 0xFC;

/// BIOS-side machine state. Cursor positions are kept per page as
/// (row, column).
#[derive(Clone, Debug)]
pub struct Bios {
    pub video_mode: u8,
    pub active_page: u8,
    pub cursor: [(u8, u8); video::PAGES],
    /// (start, end) scan lines.
    pub cursor_shape: (u8, u8),
    pub default_attribute: u8,
    pub keyboard: KeyboardBuffer,
    pub shift_flags: u8,
    pub disk_status: u8,
}

impl Bios {
    pub fn new() -> Self {
        Self {
            video_mode: 0x03,
            active_page: 0,
            cursor: [(0, 0); video::PAGES],
            cursor_shape: (0x06, 0x07),
            default_attribute: DEFAULT_ATTRIBUTE,
            keyboard: KeyboardBuffer::new(),
            shift_flags: 0,
            disk_status: 0,
        }
    }
}

impl Default for Bios {
    fn default() -> Self {
        Self::new()
    }
}

/// Power-on setup: BDA fields, a blank 80x25 screen and the ROM
/// identification bytes. The IVT is left empty.
pub fn init(vm: &mut Runtime) {
    // Floppy present, 80x25 color
    vm.memory.write_word(bda::EQUIP_WORD, 0x0021);
    vm.memory.write_word(bda::MEMORY_SIZE_KB, 640);
    vm.memory.write_word(bda::KB_BUFFER_OFFSET, bda::KB_BUF_OFFSET_START);
    vm.memory.write_word(bda::KB_BUFFER_END_OFFSET, bda::KB_BUF_OFFSET_END);

    let mode = vm.bios.video_mode;
    video::set_mode(vm, mode, true);
    let (start, end) = vm.bios.cursor_shape;
    vm.memory.write_byte(bda::CURSOR_SHAPE, end);
    vm.memory.write_byte(bda::CURSOR_SHAPE + 1, start);
    keyboard::sync(vm);

    vm.memory.load(bda::ROM_DATE, ROM_DATE_TEXT);
    vm.memory.write_byte(bda::ROM_MODEL, MODEL_PC_AT);
    vm.memory.set_read_only(BIOS_ROM, MEMORY_SIZE - BIOS_ROM, true);

    debug!("BIOS ready, {}x{} text, ROM at {:05X}", TEXT_COLS, TEXT_ROWS, BIOS_ROM);
}

/// Services `vector` if it belongs to the emulated firmware. Returns
/// `false` to let the caller go through the IVT.
pub fn intercept(vm: &mut Runtime, vector: u8) -> bool {
    match vector {
        0x10 => video::int10h(vm),
        0x13 => disk::int13h(vm),
        0x16 => keyboard::int16h(vm),
        0x20 => dos::int20h(vm),
        0x21 => dos::int21h(vm),
        _ => return false,
    }
    true
}

pub fn sync_keyboard(vm: &mut Runtime) {
    keyboard::sync(vm);
}
