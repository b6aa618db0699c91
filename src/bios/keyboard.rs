use crate::bios::bda;
use crate::vm::runtime::{CpuFlag, Runtime};
use log::{debug, warn};

pub const KEYBOARD_SLOTS: usize = 16;
/// One slot stays free so a full ring never shows head == tail.
pub const KEYBOARD_CAPACITY: usize = KEYBOARD_SLOTS - 1;

/// Circular buffer of (scancode, ASCII) pairs, filled by the host and
/// drained by INT 16h.
#[derive(Clone, Debug, Default)]
pub struct KeyboardBuffer {
    slots: [(u8, u8); KEYBOARD_SLOTS],
    head: usize,
    tail: usize,
    len: usize,
}

impl KeyboardBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and drops the key when the buffer is full.
    pub fn inject(&mut self, scancode: u8, ascii: u8) -> bool {
        if self.len == KEYBOARD_CAPACITY {
            return false;
        }
        self.slots[self.tail] = (scancode, ascii);
        self.tail = (self.tail + 1) % KEYBOARD_SLOTS;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<(u8, u8)> {
        let key = self.peek()?;
        self.head = (self.head + 1) % KEYBOARD_SLOTS;
        self.len -= 1;
        Some(key)
    }

    pub fn peek(&self) -> Option<(u8, u8)> {
        if self.len == 0 {
            return None;
        }
        Some(self.slots[self.head])
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Mirrors the buffer and shift state into the BDA so guest code that
/// inspects 0040:001A directly sees the same keys.
pub fn sync(vm: &mut Runtime) {
    vm.memory.write_byte(bda::KB_SHIFT_FLAGS, vm.bios.shift_flags);

    let keyboard = &vm.bios.keyboard;
    for i in 0..KEYBOARD_SLOTS {
        let (scancode, ascii) = keyboard.slots[i];
        let addr = bda::KB_BUFFER_START + i * 2;
        vm.memory.write_byte(addr, ascii);
        vm.memory.write_byte(addr + 1, scancode);
    }
    let head = bda::KB_BUF_OFFSET_START + (keyboard.head * 2) as u16;
    let tail = bda::KB_BUF_OFFSET_START + (keyboard.tail * 2) as u16;
    vm.memory.write_word(bda::KB_HEAD, head);
    vm.memory.write_word(bda::KB_TAIL, tail);
}

/// INT 16h: Keyboard services
pub fn int16h(vm: &mut Runtime) {
    let ah = vm.cpu.registers.ax.high();
    match ah {
        // AH=00/10: Read keystroke. The host never blocks the guest, so an
        // empty buffer returns AX=0.
        0x00 | 0x10 => {
            match vm.bios.keyboard.pop() {
                Some((scancode, ascii)) => {
                    vm.cpu.registers.ax.set_low(ascii);
                    vm.cpu.registers.ax.set_high(scancode);
                }
                None => {
                    debug!("[INT16h] read on empty buffer");
                    vm.cpu.registers.ax.set(0x0000);
                }
            }
            sync(vm);
        }
        // AH=01/11: Check keystroke available (non-blocking)
        0x01 | 0x11 => match vm.bios.keyboard.peek() {
            Some((scancode, ascii)) => {
                vm.cpu.registers.ax.set_low(ascii);
                vm.cpu.registers.ax.set_high(scancode);
                vm.cpu.unset_flag(CpuFlag::Zero);
            }
            None => {
                vm.cpu.registers.ax.set(0x0000);
                vm.cpu.set_flag(CpuFlag::Zero);
            }
        },
        // AH=02/12: Get shift flags
        0x02 | 0x12 => {
            vm.cpu.registers.ax.set_low(vm.bios.shift_flags);
        }
        _ => warn!("[INT16h] unsupported function AH={:02X}", ah),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_order_and_capacity() {
        let mut buffer = KeyboardBuffer::new();
        for i in 0..KEYBOARD_CAPACITY as u8 {
            assert!(buffer.inject(i, b'a' + i));
        }
        assert!(!buffer.inject(0xFF, 0xFF));

        assert_eq!(buffer.pop(), Some((0, b'a')));
        assert!(buffer.inject(0x30, b'z'));
        for _ in 1..KEYBOARD_CAPACITY {
            buffer.pop();
        }
        assert_eq!(buffer.peek(), Some((0x30, b'z')));
        assert_eq!(buffer.pop(), Some((0x30, b'z')));
        assert!(buffer.is_empty());
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn full_ring_stays_visible_in_bda() {
        let mut vm = Runtime::default();
        for i in 0..KEYBOARD_CAPACITY as u8 {
            assert!(vm.inject_key(0x10 + i, b'a' + i));
        }
        assert!(!vm.inject_key(0x2C, b'z'));

        let head = vm.memory.read_word(bda::KB_HEAD);
        let tail = vm.memory.read_word(bda::KB_TAIL);
        assert_eq!(head, bda::KB_BUF_OFFSET_START);
        assert_eq!(tail, bda::KB_BUF_OFFSET_END - 2);
        assert_ne!(head, tail);

        // Draining past the end of the ring wraps tail to the start
        vm.bios.keyboard.pop();
        assert!(vm.inject_key(0x2C, b'z'));
        assert_eq!(vm.memory.read_word(bda::KB_TAIL), bda::KB_BUF_OFFSET_START);
        assert_eq!(vm.memory.read_word(bda::KB_HEAD), bda::KB_BUF_OFFSET_START + 2);
    }
}
