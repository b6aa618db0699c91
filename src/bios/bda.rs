// BIOS Data Area (BDA), physical addresses (segment 0x0040 base = 0x400)

pub const EQUIP_WORD: usize = 0x410;       // Equipment word (2 bytes)
pub const MEMORY_SIZE_KB: usize = 0x413;   // Conventional memory in KB (2 bytes)
pub const KB_SHIFT_FLAGS: usize = 0x417;   // Keyboard shift state
pub const KB_HEAD: usize = 0x41A;          // Keyboard buffer head (segment offset, word)
pub const KB_TAIL: usize = 0x41C;          // Keyboard buffer tail (segment offset, word)
pub const KB_BUFFER_START: usize = 0x41E;  // Ring buffer start (32 bytes = 16 entries)
pub const FLOPPY_STATUS: usize = 0x441;    // Last floppy disk status byte
pub const VIDEO_MODE: usize = 0x449;       // Current video mode
pub const VIDEO_COLS: usize = 0x44A;       // Screen columns (word)
pub const PAGE_SIZE: usize = 0x44C;        // Bytes per video page (word)
pub const CURSOR_POS: usize = 0x450;       // Cursor positions array (8 pages x 2 bytes)
pub const CURSOR_SHAPE: usize = 0x460;     // Cursor end/start scan lines (word)
pub const ACTIVE_PAGE: usize = 0x462;      // Current display page
pub const VIDEO_ROWS: usize = 0x484;       // Text rows minus 1
pub const KB_BUFFER_OFFSET: usize = 0x480; // Buffer start offset (word)
pub const KB_BUFFER_END_OFFSET: usize = 0x482; // Buffer end offset (word)

// Segment-relative offsets for the keyboard ring buffer head/tail pointers
pub const KB_BUF_OFFSET_START: u16 = 0x1E;
pub const KB_BUF_OFFSET_END: u16 = 0x3E;

// ROM identification bytes at the top of the BIOS segment
pub const ROM_DATE: usize = 0xFFFF5;
pub const ROM_MODEL: usize = 0xFFFFE;
