use crate::utils::number::SpecialOps;
use crate::vm::memory::Memory;
use crate::vm::registers::Registers;
use crate::vm::runtime::{Runtime, SegmentType};

/// Where a ModR/M operand lives once its addressing byte is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectiveAddress {
    Register(u8),
    Memory {
        segment: SegmentType,
        offset: u16,
        displacement: u16,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct ModRm {
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
    pub operand: EffectiveAddress,
}

#[inline(always)]
pub fn split(byte: u8) -> (u8, u8, u8) {
    ((byte >> 6) & 0b11, (byte >> 3) & 0b111, byte & 0b111)
}

/// Displacement bytes that follow the ModR/M byte.
#[inline]
pub fn displacement_len(mode: u8, rm: u8) -> usize {
    match mode {
        0b00 if rm == 0b110 => 2,
        0b01 => 1,
        0b10 => 2,
        _ => 0,
    }
}

/// BP-based forms use SS, everything else DS.
#[inline]
pub fn default_segment(mode: u8, rm: u8) -> SegmentType {
    match rm {
        0b010 | 0b011 => SegmentType::SS,
        0b110 if mode != 0b00 => SegmentType::SS,
        _ => SegmentType::DS,
    }
}

#[inline(always)]
fn rm_base(regs: &Registers, rm: u8) -> u16 {
    let bx = regs.bx.word();
    let bp = regs.bp.word();
    let si = regs.si.word();
    let di = regs.di.word();
    match rm & 0b111 {
        0b000 => bx.wrapping_add(si),
        0b001 => bx.wrapping_add(di),
        0b010 => bp.wrapping_add(si),
        0b011 => bp.wrapping_add(di),
        0b100 => si,
        0b101 => di,
        0b110 => bp,
        _ => bx,
    }
}

/// `displacement` is already sign-extended for `mod == 01`.
pub fn effective_address(
    regs: &Registers,
    mode: u8,
    rm: u8,
    displacement: u16,
    segment_override: Option<SegmentType>,
) -> EffectiveAddress {
    if mode == 0b11 {
        return EffectiveAddress::Register(rm);
    }
    let base = if mode == 0b00 && rm == 0b110 {
        0
    } else {
        rm_base(regs, rm)
    };
    EffectiveAddress::Memory {
        segment: segment_override.unwrap_or_else(|| default_segment(mode, rm)),
        offset: base.wrapping_add(displacement),
        displacement,
    }
}

/// Operand access for the two operand widths.
pub trait ModRM: SpecialOps {
    fn read_register(regs: &Registers, reg: u8) -> Self;
    fn write_register(regs: &mut Registers, reg: u8, value: Self);
    fn read_memory(memory: &Memory, segment: u16, offset: u16) -> Self;
    fn write_memory(memory: &mut Memory, segment: u16, offset: u16, value: Self);
    fn fetch(vm: &mut Runtime) -> Self;
}

impl ModRM for u8 {
    #[inline(always)]
    fn read_register(regs: &Registers, reg: u8) -> u8 {
        regs.read_reg_byte(reg)
    }

    #[inline(always)]
    fn write_register(regs: &mut Registers, reg: u8, value: u8) {
        regs.write_reg_byte(reg, value)
    }

    #[inline(always)]
    fn read_memory(memory: &Memory, segment: u16, offset: u16) -> u8 {
        memory.read_byte_at(segment, offset)
    }

    #[inline(always)]
    fn write_memory(memory: &mut Memory, segment: u16, offset: u16, value: u8) {
        memory.write_byte_at(segment, offset, value)
    }

    #[inline(always)]
    fn fetch(vm: &mut Runtime) -> u8 {
        vm.fetch_byte()
    }
}

impl ModRM for u16 {
    #[inline(always)]
    fn read_register(regs: &Registers, reg: u8) -> u16 {
        regs.read_reg_word(reg)
    }

    #[inline(always)]
    fn write_register(regs: &mut Registers, reg: u8, value: u16) {
        regs.write_reg_word(reg, value)
    }

    #[inline(always)]
    fn read_memory(memory: &Memory, segment: u16, offset: u16) -> u16 {
        memory.read_word_at(segment, offset)
    }

    #[inline(always)]
    fn write_memory(memory: &mut Memory, segment: u16, offset: u16, value: u16) {
        memory.write_word_at(segment, offset, value)
    }

    #[inline(always)]
    fn fetch(vm: &mut Runtime) -> u16 {
        vm.fetch_word()
    }
}
