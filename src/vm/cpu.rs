use crate::vm::memory::BOOT_ADDR;
use crate::vm::registers::Registers;
use crate::vm::runtime::{CpuFlag, SegmentType};

/// Bits 12-15 and bit 1 always read as one on the 8086.
pub const FLAGS_FIXED: u16 = 0xF002;
/// Bits that POPF/IRET/SAHF can actually change.
pub const FLAGS_WRITABLE: u16 = 0x0FD5;

pub const RESET_SP: u16 = 0xFFFE;
pub const RESET_IP: u16 = BOOT_ADDR as u16;

pub struct Cpu {
    pub registers: Registers,
    pub flags: u16,
    pub halted: bool,
    pub pending_interrupt: Option<u8>,
    // Per-instruction prefix state
    pub segment_override: Option<SegmentType>,
    /// `Some(true)` for REP/REPE, `Some(false)` for REPNE.
    pub rep: Option<bool>,
    pub cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        let mut cpu = Self {
            registers: Registers::new(),
            flags: FLAGS_FIXED,
            halted: false,
            pending_interrupt: None,
            segment_override: None,
            rep: None,
            cycles: 0,
        };
        cpu.reset();
        cpu
    }

    /// SP near the top of segment 0, IP at the boot sector, interrupts off.
    pub fn reset(&mut self) {
        self.registers = Registers::new();
        self.registers.sp.set(RESET_SP);
        self.registers.ip.set(RESET_IP);
        self.flags = FLAGS_FIXED;
        self.halted = false;
        self.pending_interrupt = None;
        self.clear_prefixes();
        self.cycles = 0;
    }

    #[inline]
    pub fn clear_prefixes(&mut self) {
        self.segment_override = None;
        self.rep = None;
    }

    /// FLAGS as PUSHF and interrupt entry store them.
    #[inline]
    pub fn flags_image(&self) -> u16 {
        self.flags | FLAGS_FIXED
    }

    /// FLAGS as POPF and IRET load them.
    #[inline]
    pub fn load_flags(&mut self, value: u16) {
        self.flags = (value & FLAGS_WRITABLE) | FLAGS_FIXED;
    }

    #[inline(always)]
    pub fn set_flag(&mut self, flag: CpuFlag) {
        self.flags |= 1u16 << (flag as u8);
    }

    #[inline(always)]
    pub fn unset_flag(&mut self, flag: CpuFlag) {
        self.flags &= !(1u16 << (flag as u8));
    }

    #[inline(always)]
    pub fn update_flag(&mut self, flag: CpuFlag, active: bool) {
        if active {
            self.set_flag(flag);
        } else {
            self.unset_flag(flag);
        }
    }

    #[inline(always)]
    pub fn flip_flag(&mut self, flag: CpuFlag) {
        self.update_flag(flag, !self.check_flag(flag));
    }

    #[inline(always)]
    pub fn check_flag(&self, flag: CpuFlag) -> bool {
        (self.flags & 1u16 << (flag as u8)) != 0
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::runtime::CpuFlag::*;

    #[test]
    fn reset_state() {
        let cpu = Cpu::new();
        assert_eq!(cpu.registers.sp.word(), 0xFFFE);
        assert_eq!(cpu.registers.ip.word(), 0x7C00);
        assert_eq!(cpu.registers.cs.word(), 0);
        assert_eq!(cpu.registers.ss.word(), 0);
        assert_eq!(cpu.flags, 0xF002);
        assert!(!cpu.check_flag(Interrupt));
        assert!(!cpu.halted);
    }

    #[test]
    fn flag_helpers() {
        let mut cpu = Cpu::new();
        cpu.set_flag(Carry);
        assert!(cpu.check_flag(Carry));
        cpu.flip_flag(Carry);
        assert!(!cpu.check_flag(Carry));
        cpu.update_flag(Overflow, true);
        assert_eq!(cpu.flags & 0x0800, 0x0800);
    }

    #[test]
    fn load_flags_applies_fixed_bits() {
        let mut cpu = Cpu::new();
        cpu.load_flags(0x0000);
        assert_eq!(cpu.flags, 0xF002);
        cpu.load_flags(0xFFFF);
        assert_eq!(cpu.flags, 0xFFD7);
    }
}
