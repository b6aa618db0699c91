use super::invalid_opcode;
use crate::error::EmulationError;
use crate::utils::number::extend_sign;
use crate::vm::flags;
use crate::vm::modrm::EffectiveAddress;
use crate::vm::runtime::CpuFlag::*;
use crate::vm::runtime::Runtime;

/// INC DEC CALL JMP PUSH
pub(super) fn group_fe_ff(vm: &mut Runtime, opcode: u8, is_word: bool) -> Result<(), EmulationError> {
    let modrm = vm.fetch_modrm();

    match (modrm.reg, is_word) {
        // INC
        (0b_000, false) => {
            let value = vm.read_operand::<u8>(&modrm.operand);
            let res = flags::inc(&mut vm.cpu, value);
            vm.write_operand(&modrm.operand, res);
        }
        (0b_000, true) => {
            let value = vm.read_operand::<u16>(&modrm.operand);
            let res = flags::inc(&mut vm.cpu, value);
            vm.write_operand(&modrm.operand, res);
        }
        // DEC
        (0b_001, false) => {
            let value = vm.read_operand::<u8>(&modrm.operand);
            let res = flags::dec(&mut vm.cpu, value);
            vm.write_operand(&modrm.operand, res);
        }
        (0b_001, true) => {
            let value = vm.read_operand::<u16>(&modrm.operand);
            let res = flags::dec(&mut vm.cpu, value);
            vm.write_operand(&modrm.operand, res);
        }
        // FE only encodes INC/DEC
        (_, false) => return Err(invalid_opcode(vm, opcode)),
        // CALL r/m16 (target read before the push so CALL SP works)
        (0b_010, true) => {
            let target = vm.read_operand::<u16>(&modrm.operand);
            vm.push_word(vm.cpu.registers.ip.word());
            vm.cpu.registers.ip.set(target);
        }
        // CALL m16:16
        (0b_011, true) => {
            let (ip, cs) = far_pointer(vm, &modrm.operand).ok_or_else(|| invalid_opcode(vm, opcode))?;
            vm.push_word(vm.cpu.registers.cs.word());
            vm.push_word(vm.cpu.registers.ip.word());
            vm.cpu.registers.ip.set(ip);
            vm.cpu.registers.cs.set(cs);
        }
        // JMP r/m16
        (0b_100, true) => {
            let target = vm.read_operand::<u16>(&modrm.operand);
            vm.cpu.registers.ip.set(target);
        }
        // JMP m16:16
        (0b_101, true) => {
            let (ip, cs) = far_pointer(vm, &modrm.operand).ok_or_else(|| invalid_opcode(vm, opcode))?;
            vm.cpu.registers.ip.set(ip);
            vm.cpu.registers.cs.set(cs);
        }
        // PUSH r/m16 (reg=7 is an undocumented alias)
        _ => {
            if modrm.operand == EffectiveAddress::Register(0b_100) {
                push_sp(vm);
            } else {
                let value = vm.read_operand::<u16>(&modrm.operand);
                vm.push_word(value);
            }
        }
    }
    Ok(())
}

/// The 8086 pushes SP after decrementing it.
#[inline]
pub(super) fn push_sp(vm: &mut Runtime) {
    let sp = vm.cpu.registers.sp.word().wrapping_sub(2);
    vm.push_word(sp);
}

/// Offset and segment words of a memory operand. Register operands have none.
pub(super) fn far_pointer(vm: &Runtime, operand: &EffectiveAddress) -> Option<(u16, u16)> {
    match *operand {
        EffectiveAddress::Memory { segment, offset, .. } => {
            let segment = vm.cpu.registers.segment(segment);
            Some((
                vm.memory.read_word_at(segment, offset),
                vm.memory.read_word_at(segment, offset.wrapping_add(2)),
            ))
        }
        EffectiveAddress::Register(_) => None,
    }
}

#[inline]
pub(super) fn jump_short(vm: &mut Runtime, disp: u8) {
    vm.cpu.registers.ip.operation(extend_sign(disp), u16::wrapping_add);
}

/// Jcc condition for 70-7F. Odd opcodes take the negated form.
pub(super) fn condition(vm: &Runtime, opcode: u8) -> bool {
    let cpu = &vm.cpu;
    let taken = match (opcode >> 1) & 0b_111 {
        // JO / JNO
        0b_000 => cpu.check_flag(Overflow),
        // JB,JNAE / JAE,JNB
        0b_001 => cpu.check_flag(Carry),
        // JE,JZ / JNE,JNZ
        0b_010 => cpu.check_flag(Zero),
        // JBE,JNA / JA,JNBE
        0b_011 => cpu.check_flag(Carry) || cpu.check_flag(Zero),
        // JS / JNS
        0b_100 => cpu.check_flag(Sign),
        // JP,JPE / JNP,JPO
        0b_101 => cpu.check_flag(Parity),
        // JL,JNGE / JGE,JNL
        0b_110 => cpu.check_flag(Sign) != cpu.check_flag(Overflow),
        // JLE,JNG / JG,JNLE
        _ => cpu.check_flag(Zero) || cpu.check_flag(Sign) != cpu.check_flag(Overflow),
    };
    taken != (opcode & 1 != 0)
}

/// LOOPNE LOOPE LOOP JCXZ
pub(super) fn loop_family(vm: &mut Runtime, opcode: u8) {
    let disp = vm.fetch_byte();
    let taken = if opcode == 0xE3 {
        vm.cpu.registers.cx.word() == 0
    } else {
        let cx = vm.cpu.registers.cx.operation(1, u16::wrapping_sub);
        cx != 0
            && match opcode {
                0xE0 => !vm.cpu.check_flag(Zero),
                0xE1 => vm.cpu.check_flag(Zero),
                _ => true,
            }
    };
    if taken {
        jump_short(vm, disp);
    }
}

pub(super) fn div_zero(vm: &mut Runtime) {
    vm.dispatch_interrupt(0);
}
