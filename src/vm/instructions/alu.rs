use crate::utils::number::{div_rem, extend_sign, SpecialOps};
use crate::vm::flags;
use crate::vm::modrm::{EffectiveAddress, ModRM};
use crate::vm::runtime::CpuFlag::*;
use crate::vm::runtime::Runtime;
use super::control::div_zero;

const BYTE_SIGN_FLAG: u8 = 0b_1000_0000;

/// ADD OR ADC SBB AND SUB XOR CMP, in opcode bit 3-5 / ModR/M reg order.
/// Returns `None` for CMP, which only sets flags.
pub(super) fn alu<T: ModRM>(vm: &mut Runtime, op: u8, lhs: T, rhs: T) -> Option<T> {
    let cpu = &mut vm.cpu;
    match op & 0b_111 {
        // ADD
        0b_000 => Some(flags::add(cpu, lhs, rhs, false)),
        // OR
        0b_001 => Some(flags::logic(cpu, lhs | rhs)),
        // ADC
        0b_010 => {
            let carry = cpu.check_flag(Carry);
            Some(flags::add(cpu, lhs, rhs, carry))
        }
        // SBB
        0b_011 => {
            let borrow = cpu.check_flag(Carry);
            Some(flags::sub(cpu, lhs, rhs, borrow))
        }
        // AND
        0b_100 => Some(flags::logic(cpu, lhs & rhs)),
        // SUB
        0b_101 => Some(flags::sub(cpu, lhs, rhs, false)),
        // XOR
        0b_110 => Some(flags::logic(cpu, lhs ^ rhs)),
        // CMP
        _ => {
            flags::sub(cpu, lhs, rhs, false);
            None
        }
    }
}

/// Opcodes 00-3D: `op r/m,reg`, `op reg,r/m` and `op ac,imm`.
pub(super) fn alu_family<T: ModRM>(vm: &mut Runtime, opcode: u8, directional: bool) {
    let op = (opcode >> 3) & 0b_111;
    if opcode & 0b_100 != 0 {
        let imm = T::fetch(vm);
        let acc = T::read_register(&vm.cpu.registers, 0);
        if let Some(res) = alu(vm, op, acc, imm) {
            T::write_register(&mut vm.cpu.registers, 0, res);
        }
        return;
    }

    let modrm = vm.fetch_modrm();
    let reg = T::read_register(&vm.cpu.registers, modrm.reg);
    let rm = vm.read_operand::<T>(&modrm.operand);
    if directional {
        if let Some(res) = alu(vm, op, reg, rm) {
            T::write_register(&mut vm.cpu.registers, modrm.reg, res);
        }
    } else if let Some(res) = alu(vm, op, rm, reg) {
        vm.write_operand(&modrm.operand, res);
    }
}

pub(super) fn group_80_83(vm: &mut Runtime, opcode: u8) {
    let modrm = vm.fetch_modrm();
    match opcode {
        // op r/m16,imm16
        0x81 => {
            let imm = vm.fetch_word();
            immediate::<u16>(vm, modrm.reg, &modrm.operand, imm);
        }
        // op r/m16,imm8 (sign-extended)
        0x83 => {
            let imm = extend_sign(vm.fetch_byte());
            immediate::<u16>(vm, modrm.reg, &modrm.operand, imm);
        }
        // 0x82 is an alias of 0x80
        _ => {
            let imm = vm.fetch_byte();
            immediate::<u8>(vm, modrm.reg, &modrm.operand, imm);
        }
    }
}

#[inline]
fn immediate<T: ModRM>(vm: &mut Runtime, op: u8, operand: &EffectiveAddress, imm: T) {
    let lhs = vm.read_operand::<T>(operand);
    if let Some(res) = alu(vm, op, lhs, imm) {
        vm.write_operand(operand, res);
    }
}

/// TEST NOT NEG MUL IMUL DIV IDIV
pub(super) fn group_f6_f7<T: ModRM>(vm: &mut Runtime) {
    let modrm = vm.fetch_modrm();
    let value = vm.read_operand::<T>(&modrm.operand);

    match modrm.reg {
        // TEST (reg=1 is an undocumented alias)
        0b_000 | 0b_001 => {
            let imm = T::fetch(vm);
            flags::logic(&mut vm.cpu, value & imm);
        }
        // NOT
        0b_010 => vm.write_operand(&modrm.operand, !value),
        // NEG
        0b_011 => {
            let res = flags::sub(&mut vm.cpu, T::zero(), value, false);
            vm.write_operand(&modrm.operand, res);
        }
        // MUL
        0b_100 => {
            let acc = T::read_register(&vm.cpu.registers, 0);
            let product = acc.widen() * value.widen();
            store_wide::<T>(vm, product);
            let high = product >> T::BITS != 0;
            vm.cpu.update_flag(Carry, high);
            vm.cpu.update_flag(Overflow, high);
        }
        // IMUL
        0b_101 => {
            let acc = T::read_register(&vm.cpu.registers, 0);
            let product = acc.sign_extend() * value.sign_extend();
            store_wide::<T>(vm, product as u32);
            let overflow = T::truncate(product as u32).sign_extend() != product;
            vm.cpu.update_flag(Carry, overflow);
            vm.cpu.update_flag(Overflow, overflow);
        }
        // DIV
        0b_110 => {
            let divisor = value.widen();
            if divisor == 0 {
                div_zero(vm);
                return;
            }
            let (quot, rem) = div_rem(load_wide::<T>(vm), divisor);
            if quot > T::max_value().widen() {
                div_zero(vm);
                return;
            }
            store_quotient::<T>(vm, T::truncate(quot), T::truncate(rem));
        }
        // IDIV
        _ => {
            let divisor = value.sign_extend();
            if divisor == 0 {
                div_zero(vm);
                return;
            }
            let dividend = if T::BITS == 8 {
                load_wide::<T>(vm) as u16 as i16 as i32
            } else {
                load_wide::<T>(vm) as i32
            };
            let (quot, rem) = match (dividend.checked_div(divisor), dividend.checked_rem(divisor)) {
                (Some(quot), Some(rem)) => (quot, rem),
                _ => {
                    div_zero(vm);
                    return;
                }
            };
            // The 8086 faults on the most negative quotient as well
            let limit = 1i32 << (T::BITS - 1);
            if quot >= limit || quot <= -limit {
                div_zero(vm);
                return;
            }
            store_quotient::<T>(vm, T::truncate(quot as u32), T::truncate(rem as u32));
        }
    }
}

/// AX for byte operands, DX:AX for words.
#[inline]
fn load_wide<T: SpecialOps>(vm: &Runtime) -> u32 {
    let registers = &vm.cpu.registers;
    if T::BITS == 8 {
        registers.ax.word() as u32
    } else {
        (registers.dx.word() as u32) << 16 | registers.ax.word() as u32
    }
}

#[inline]
fn store_wide<T: SpecialOps>(vm: &mut Runtime, value: u32) {
    let registers = &mut vm.cpu.registers;
    if T::BITS == 8 {
        registers.ax.set(value as u16);
    } else {
        registers.ax.set(value as u16);
        registers.dx.set((value >> 16) as u16);
    }
}

/// AL/AH for byte division, AX/DX for word division.
#[inline]
fn store_quotient<T: SpecialOps>(vm: &mut Runtime, quot: T, rem: T) {
    let registers = &mut vm.cpu.registers;
    if T::BITS == 8 {
        registers.ax.set_low(quot.low_byte());
        registers.ax.set_high(rem.low_byte());
    } else {
        registers.ax.set(quot.widen() as u16);
        registers.dx.set(rem.widen() as u16);
    }
}

#[inline]
fn update_al_flags(vm: &mut Runtime) {
    let al = vm.cpu.registers.ax.low();
    flags::update_result_flags(&mut vm.cpu, al);
}

pub(super) fn daa(vm: &mut Runtime) {
    let old_al = vm.cpu.registers.ax.low();
    let old_cf = vm.cpu.check_flag(Carry);
    let old_af = vm.cpu.check_flag(AuxCarry);
    let mut cf = false;

    if old_af || (old_al & 0x0F) >= 0x0A {
        let (al, carry) = old_al.overflowing_add(0x06);
        vm.cpu.registers.ax.set_low(al);
        cf = old_cf || carry;
        vm.cpu.set_flag(AuxCarry);
    } else {
        vm.cpu.unset_flag(AuxCarry);
    }
    // With AF set the upper threshold moves to 0x9F on the 8086
    let upper_threshold = if old_af { 0x9F } else { 0x99 };
    if old_cf || old_al > upper_threshold {
        let al = vm.cpu.registers.ax.low().wrapping_add(0x60);
        vm.cpu.registers.ax.set_low(al);
        cf = true;
    }
    vm.cpu.update_flag(Carry, cf);
    update_al_flags(vm);
}

pub(super) fn das(vm: &mut Runtime) {
    let old_al = vm.cpu.registers.ax.low();
    let old_cf = vm.cpu.check_flag(Carry);
    let old_af = vm.cpu.check_flag(AuxCarry);
    // The low-nibble borrow never reaches CF
    let mut cf = old_cf;

    if old_af || (old_al & 0x0F) >= 0x0A {
        vm.cpu.registers.ax.set_low(old_al.wrapping_sub(0x06));
        vm.cpu.set_flag(AuxCarry);
    } else {
        vm.cpu.unset_flag(AuxCarry);
    }
    let upper_threshold = if old_af { 0x9F } else { 0x99 };
    if old_cf || old_al > upper_threshold {
        let al = vm.cpu.registers.ax.low().wrapping_sub(0x60);
        vm.cpu.registers.ax.set_low(al);
        cf = true;
    }
    vm.cpu.update_flag(Carry, cf);
    update_al_flags(vm);
}

/// AAA (`adjust_up`) and AAS.
pub(super) fn ascii_adjust(vm: &mut Runtime, adjust_up: bool) {
    let al = vm.cpu.registers.ax.low();
    let adjust = (al & 0x0F) >= 0x0A || vm.cpu.check_flag(AuxCarry);

    if adjust {
        let ax = &mut vm.cpu.registers.ax;
        if adjust_up {
            ax.set_low(al.wrapping_add(6));
            ax.set_high(ax.high().wrapping_add(1));
        } else {
            ax.set_low(al.wrapping_sub(6));
            ax.set_high(ax.high().wrapping_sub(1));
        }
    }
    vm.cpu.update_flag(AuxCarry, adjust);
    vm.cpu.update_flag(Carry, adjust);
    let al = vm.cpu.registers.ax.low() & 0x0F;
    vm.cpu.registers.ax.set_low(al);
}

pub(super) fn aam(vm: &mut Runtime) {
    let factor = vm.fetch_byte();
    if factor == 0 {
        // Flags read as if the result were zero when the fault is taken
        vm.cpu.set_flag(Zero);
        vm.cpu.unset_flag(Sign);
        vm.cpu.set_flag(Parity);
        div_zero(vm);
        return;
    }
    let (ah, al) = div_rem(vm.cpu.registers.ax.low(), factor);
    vm.cpu.registers.ax.set_high(ah);
    vm.cpu.registers.ax.set_low(al);
    update_al_flags(vm);
}

pub(super) fn aad(vm: &mut Runtime) {
    let factor = vm.fetch_byte();
    let ax = &mut vm.cpu.registers.ax;
    let al = ax.high().wrapping_mul(factor).wrapping_add(ax.low());
    ax.set(al as u16);
    update_al_flags(vm);
}

pub(super) fn cbw(vm: &mut Runtime) {
    let al = vm.cpu.registers.ax.low();
    vm.cpu.registers.ax.set_high(if al & BYTE_SIGN_FLAG != 0 { !0 } else { 0 });
}

pub(super) fn cwd(vm: &mut Runtime) {
    let ax = vm.cpu.registers.ax.word();
    vm.cpu.registers.dx.set(if ax.is_negative() { 0xFFFF } else { 0 });
}
