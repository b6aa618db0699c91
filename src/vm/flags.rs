use crate::utils::number::SpecialOps;
use crate::vm::cpu::Cpu;
use crate::vm::runtime::CpuFlag::*;

const AUX_CARRY_BIT: u32 = 0x10;

/// `PARITY[b]` is true when `b` has an even number of set bits.
pub const PARITY: [bool; 256] = build_parity_table();

const fn build_parity_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() % 2 == 0;
        i += 1;
    }
    table
}

#[inline(always)]
pub fn parity(value: u8) -> bool {
    PARITY[value as usize]
}

/// ZF, SF and PF from a truncated result.
#[inline]
pub fn update_result_flags<T: SpecialOps>(cpu: &mut Cpu, res: T) {
    cpu.update_flag(Zero, res == T::zero());
    cpu.update_flag(Sign, res.is_negative());
    cpu.update_flag(Parity, parity(res.low_byte()));
}

#[inline]
pub fn add<T: SpecialOps>(cpu: &mut Cpu, a: T, b: T, carry_in: bool) -> T {
    let (res, carry) = a.add_with_carry(b, carry_in);
    cpu.update_flag(Carry, carry);
    cpu.update_flag(Overflow, ((a ^ res) & (b ^ res)).is_negative());
    cpu.update_flag(AuxCarry, (a ^ b ^ res).widen() & AUX_CARRY_BIT != 0);
    update_result_flags(cpu, res);
    res
}

#[inline]
pub fn sub<T: SpecialOps>(cpu: &mut Cpu, a: T, b: T, borrow_in: bool) -> T {
    let (res, borrow) = a.sub_with_borrow(b, borrow_in);
    cpu.update_flag(Carry, borrow);
    cpu.update_flag(Overflow, ((a ^ b) & (a ^ res)).is_negative());
    cpu.update_flag(AuxCarry, (a ^ b ^ res).widen() & AUX_CARRY_BIT != 0);
    update_result_flags(cpu, res);
    res
}

/// AND/OR/XOR/TEST: CF and OF cleared, AF cleared.
#[inline]
pub fn logic<T: SpecialOps>(cpu: &mut Cpu, res: T) -> T {
    cpu.unset_flag(Carry);
    cpu.unset_flag(Overflow);
    cpu.unset_flag(AuxCarry);
    update_result_flags(cpu, res);
    res
}

#[inline]
pub fn inc<T: SpecialOps>(cpu: &mut Cpu, value: T) -> T {
    let carry = cpu.check_flag(Carry);
    let res = add(cpu, value, T::one(), false);
    cpu.update_flag(Carry, carry);
    res
}

#[inline]
pub fn dec<T: SpecialOps>(cpu: &mut Cpu, value: T) -> T {
    let carry = cpu.check_flag(Carry);
    let res = sub(cpu, value, T::one(), false);
    cpu.update_flag(Carry, carry);
    res
}

pub fn add8(cpu: &mut Cpu, a: u8, b: u8) -> u8 {
    add(cpu, a, b, false)
}

pub fn add16(cpu: &mut Cpu, a: u16, b: u16) -> u16 {
    add(cpu, a, b, false)
}

pub fn sub8(cpu: &mut Cpu, a: u8, b: u8) -> u8 {
    sub(cpu, a, b, false)
}

pub fn sub16(cpu: &mut Cpu, a: u16, b: u16) -> u16 {
    sub(cpu, a, b, false)
}
