use byteorder::{ByteOrder, LittleEndian};

pub const MEMORY_SIZE: usize = 0x10_0000;
pub const ADDRESS_MASK: usize = MEMORY_SIZE - 1;
pub const PAGE_SIZE: usize = 0x1000;
const PAGE_COUNT: usize = MEMORY_SIZE / PAGE_SIZE;

pub const IVT_BASE: usize = 0x0000;
pub const BDA_BASE: usize = 0x0400;
pub const BOOT_ADDR: usize = 0x7C00;
pub const VGA_TEXT_BASE: usize = 0xB8000;
pub const BIOS_ROM: usize = 0xF0000;

pub const TEXT_COLS: usize = 80;
pub const TEXT_ROWS: usize = 25;
pub const TEXT_BUFFER_SIZE: usize = TEXT_COLS * TEXT_ROWS * 2;
/// Bytes between the starts of consecutive text pages.
pub const TEXT_PAGE_BYTES: usize = 0x1000;
pub const TEXT_PAGES: usize = 8;

/// Real-mode linear address: `(segment << 4) + offset`, reduced to 20 bits.
#[inline(always)]
pub const fn linear(segment: u16, offset: u16) -> usize {
    (((segment as usize) << 4) + offset as usize) & ADDRESS_MASK
}

/// The 1MB real-mode address space.
///
/// Every access is reduced modulo 1MB first, so reading past `0xFFFFF`
/// lands back at the bottom of memory exactly as on an 8086. Each 4KB page
/// can be marked read-only; writes to such a page are dropped silently.
pub struct Memory {
    data: Box<[u8]>,
    read_only: [bool; PAGE_COUNT],
}

impl Memory {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
            read_only: [false; PAGE_COUNT],
        }
    }

    #[inline(always)]
    pub fn read_byte(&self, addr: usize) -> u8 {
        self.data[addr & ADDRESS_MASK]
    }

    #[inline]
    pub fn read_word(&self, addr: usize) -> u16 {
        let addr = addr & ADDRESS_MASK;
        if addr + 2 <= MEMORY_SIZE {
            LittleEndian::read_u16(&self.data[addr..addr + 2])
        } else {
            u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr + 1)])
        }
    }

    #[inline]
    pub fn read_dword(&self, addr: usize) -> u32 {
        let addr = addr & ADDRESS_MASK;
        if addr + 4 <= MEMORY_SIZE {
            LittleEndian::read_u32(&self.data[addr..addr + 4])
        } else {
            u32::from_le_bytes([
                self.read_byte(addr),
                self.read_byte(addr + 1),
                self.read_byte(addr + 2),
                self.read_byte(addr + 3),
            ])
        }
    }

    #[inline(always)]
    pub fn write_byte(&mut self, addr: usize, value: u8) {
        let addr = addr & ADDRESS_MASK;
        if self.read_only[addr / PAGE_SIZE] {
            return;
        }
        self.data[addr] = value;
    }

    // A word may straddle a protected page, so each byte is checked on its own.
    #[inline]
    pub fn write_word(&mut self, addr: usize, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(addr, low);
        self.write_byte(addr + 1, high);
    }

    #[inline]
    pub fn write_dword(&mut self, addr: usize, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr + i, byte);
        }
    }

    #[inline(always)]
    pub fn read_byte_at(&self, segment: u16, offset: u16) -> u8 {
        self.read_byte(linear(segment, offset))
    }

    /// Word access through a segment wraps the offset at 64KB, so the high
    /// byte of a word at `xxxx:FFFF` comes from `xxxx:0000`.
    #[inline]
    pub fn read_word_at(&self, segment: u16, offset: u16) -> u16 {
        u16::from_le_bytes([
            self.read_byte(linear(segment, offset)),
            self.read_byte(linear(segment, offset.wrapping_add(1))),
        ])
    }

    #[inline(always)]
    pub fn write_byte_at(&mut self, segment: u16, offset: u16, value: u8) {
        self.write_byte(linear(segment, offset), value);
    }

    #[inline]
    pub fn write_word_at(&mut self, segment: u16, offset: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(linear(segment, offset), low);
        self.write_byte(linear(segment, offset.wrapping_add(1)), high);
    }

    pub fn load(&mut self, addr: usize, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.write_byte(addr + i, *byte);
        }
    }

    pub fn dump(&self, addr: usize, buffer: &mut [u8]) {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.read_byte(addr + i);
        }
    }

    /// Overlap-safe copy (memmove semantics), wrapping and protection applied per byte.
    pub fn move_block(&mut self, src: usize, dst: usize, len: usize) {
        let mut staging = vec![0u8; len];
        self.dump(src, &mut staging);
        self.load(dst, &staging);
    }

    pub fn fill(&mut self, addr: usize, len: usize, value: u8) {
        for i in 0..len {
            self.write_byte(addr + i, value);
        }
    }

    /// Marks every 4KB page touched by `addr..addr + len`.
    pub fn set_read_only(&mut self, addr: usize, len: usize, read_only: bool) {
        if len == 0 {
            return;
        }
        let first = (addr & ADDRESS_MASK) / PAGE_SIZE;
        let pages = ((addr & (PAGE_SIZE - 1)) + len).div_ceil(PAGE_SIZE).min(PAGE_COUNT);
        for page in 0..pages {
            self.read_only[(first + page) % PAGE_COUNT] = read_only;
        }
    }

    #[inline]
    pub fn is_read_only(&self, addr: usize) -> bool {
        self.read_only[(addr & ADDRESS_MASK) / PAGE_SIZE]
    }

    /// One 80x25 colour text page as (character, attribute) byte pairs.
    pub fn text_buffer(&self, page: u8) -> &[u8] {
        let start = VGA_TEXT_BASE + (page as usize % TEXT_PAGES) * TEXT_PAGE_BYTES;
        &self.data[start..start + TEXT_BUFFER_SIZE]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_address_is_shift_and_add() {
        assert_eq!(linear(0x1234, 0x0010), 0x12350);
        assert_eq!(linear(0x0000, 0xFFFF), 0x0FFFF);
        // Two different pairs alias the same byte
        assert_eq!(linear(0x07C0, 0x0000), linear(0x0000, 0x7C00));
    }

    #[test]
    fn linear_address_wraps_past_one_megabyte() {
        // FFFF:0010 is the classic A20 wrap to 0x00000
        assert_eq!(linear(0xFFFF, 0x0010), 0x00000);
        assert_eq!(linear(0xFFFF, 0xFFFF), 0x0FFEF);
    }

    #[test]
    fn reads_wrap_modulo_address_space() {
        let mut memory = Memory::new();
        memory.write_byte(0x1234, 0xAB);
        assert_eq!(memory.read_byte(0x1234), memory.read_byte(0x1234 + MEMORY_SIZE));
        memory.write_byte(0x10_0005, 0xCD);
        assert_eq!(memory.read_byte(0x0005), 0xCD);
    }

    #[test]
    fn word_straddles_top_of_memory() {
        let mut memory = Memory::new();
        memory.write_word(0xFFFFF, 0xBEEF);
        assert_eq!(memory.read_byte(0xFFFFF), 0xEF);
        assert_eq!(memory.read_byte(0x00000), 0xBE);
        assert_eq!(memory.read_word(0xFFFFF), 0xBEEF);
    }

    #[test]
    fn dword_round_trip_and_wrap() {
        let mut memory = Memory::new();
        memory.write_dword(0x500, 0xDEAD_BEEF);
        assert_eq!(memory.read_dword(0x500), 0xDEAD_BEEF);
        assert_eq!(memory.read_word(0x502), 0xDEAD);

        memory.write_dword(0xFFFFE, 0x1122_3344);
        assert_eq!(memory.read_dword(0xFFFFE), 0x1122_3344);
        assert_eq!(memory.read_word(0x00000), 0x1122);
    }

    #[test]
    fn segment_word_wraps_offset() {
        let mut memory = Memory::new();
        memory.write_word_at(0x1000, 0xFFFF, 0x5AA5);
        assert_eq!(memory.read_byte(0x1FFFF), 0xA5);
        assert_eq!(memory.read_byte(0x10000), 0x5A);
        assert_eq!(memory.read_word_at(0x1000, 0xFFFF), 0x5AA5);
    }

    #[test]
    fn read_only_page_drops_writes() {
        let mut memory = Memory::new();
        memory.write_byte(BIOS_ROM + 0x10, 0x11);
        memory.set_read_only(BIOS_ROM, 0x10000, true);

        memory.write_byte(BIOS_ROM + 0x10, 0x22);
        assert_eq!(memory.read_byte(BIOS_ROM + 0x10), 0x11);
        assert!(memory.is_read_only(0xFFFFF));
        assert!(!memory.is_read_only(BIOS_ROM - 1));

        memory.set_read_only(BIOS_ROM, 0x10000, false);
        memory.write_byte(BIOS_ROM + 0x10, 0x22);
        assert_eq!(memory.read_byte(BIOS_ROM + 0x10), 0x22);
    }

    #[test]
    fn word_write_across_protected_boundary_is_partial() {
        let mut memory = Memory::new();
        memory.set_read_only(0x2000, 1, true);
        memory.write_word(0x1FFF, 0x1234);
        assert_eq!(memory.read_byte(0x1FFF), 0x34);
        assert_eq!(memory.read_byte(0x2000), 0x00);
    }

    #[test]
    fn load_and_dump_wrap_per_byte() {
        let mut memory = Memory::new();
        memory.load(0xFFFFE, &[1, 2, 3, 4]);
        assert_eq!(memory.read_byte(0xFFFFF), 2);
        assert_eq!(memory.read_byte(0x00001), 4);

        let mut buffer = [0u8; 4];
        memory.dump(0xFFFFE, &mut buffer);
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn move_block_handles_overlap() {
        let mut memory = Memory::new();
        memory.load(0x100, &[1, 2, 3, 4, 5, 6]);
        memory.move_block(0x102, 0x100, 4);
        let mut buffer = [0u8; 6];
        memory.dump(0x100, &mut buffer);
        assert_eq!(buffer, [3, 4, 5, 6, 5, 6]);
    }

    #[test]
    fn text_buffer_view() {
        let mut memory = Memory::new();
        memory.write_byte(VGA_TEXT_BASE, b'A');
        memory.write_byte(VGA_TEXT_BASE + 1, 0x1F);
        let text = memory.text_buffer(0);
        assert_eq!(text.len(), TEXT_BUFFER_SIZE);
        assert_eq!(&text[..2], &[b'A', 0x1F]);

        memory.write_byte(VGA_TEXT_BASE + TEXT_PAGE_BYTES * 7, b'Z');
        assert_eq!(memory.text_buffer(7)[0], b'Z');
        assert_eq!(memory.text_buffer(15)[0], b'Z');
    }
}
