mod alu;
mod control;
mod shift;
mod string;


use crate::error::EmulationError;
use crate::vm::flags;
use crate::vm::modrm::{EffectiveAddress, ModRM};
use crate::vm::runtime::CpuFlag::*;
use crate::vm::runtime::{Prefix, Runtime, SegmentType};
use log::{debug, trace};

const WORD_MASK: u8 = 0b_00_00_00_01;
const DIRECTION_MASK: u8 = 0b_00_00_00_10;

pub(super) fn invalid_opcode(vm: &Runtime, opcode: u8) -> EmulationError {
    EmulationError::InvalidOpcode {
        opcode,
        cs: vm.cpu.registers.cs.word(),
        ip: vm.cpu.registers.op_ip,
    }
}

/// Runs the width-generic helper `$f` as a byte or word operation.
macro_rules! sized {
    ($is_word:expr, $($f:ident)::+, $($arg:expr),*) => {
        if $is_word {
            $($f)::+::<u16>($($arg),*)
        } else {
            $($f)::+::<u8>($($arg),*)
        }
    };
}

/// Fetches, decodes and executes one instruction with its prefixes.
pub fn process(vm: &mut Runtime) -> Result<(), EmulationError> {
    vm.cpu.registers.op_ip = vm.cpu.registers.ip.word();
    vm.cpu.clear_prefixes();

    let opcode = loop {
        let byte = vm.fetch_byte();
        match Prefix::decode(byte) {
            Some(Prefix::Seg(segment)) => vm.cpu.segment_override = Some(segment),
            Some(Prefix::Rep(while_equal)) => vm.cpu.rep = Some(while_equal),
            // Single bus master, nothing to lock
            Some(Prefix::Lock) => {}
            None => break byte,
        }
    };
    let is_word: bool = opcode & WORD_MASK != 0;
    let directional: bool = opcode & DIRECTION_MASK != 0;

    match opcode {
        // ADD OR ADC SBB AND SUB XOR CMP  (r/m,reg | reg,r/m | ac,imm)
        0b_0000_0000..=0b_0011_1111 if opcode & 0b_110 != 0b_110 => {
            sized!(is_word, alu::alu_family, vm, opcode, directional);
        }
        // PUSH sreg
        0b_0000_0110 | 0b_0000_1110 | 0b_0001_0110 | 0b_0001_1110 => {
            let word = vm.cpu.registers.segment(SegmentType::from(opcode >> 3));
            vm.push_word(word);
        }
        // POP sreg (0x0F is POP CS on the 8086)
        0b_0000_0111 | 0b_0000_1111 | 0b_0001_0111 | 0b_0001_1111 => {
            let word = vm.pop_word();
            vm.cpu.registers.set_segment(SegmentType::from(opcode >> 3), word);
        }
        // DAA
        0x27 => alu::daa(vm),
        // DAS
        0x2F => alu::das(vm),
        // AAA
        0x37 => alu::ascii_adjust(vm, true),
        // AAS
        0x3F => alu::ascii_adjust(vm, false),
        // INC reg
        0b_0100_0000..=0b_0100_0111 => {
            let reg = opcode & 0b_111;
            let word = vm.cpu.registers.read_reg_word(reg);
            let res = flags::inc(&mut vm.cpu, word);
            vm.cpu.registers.write_reg_word(reg, res);
        }
        // DEC reg
        0b_0100_1000..=0b_0100_1111 => {
            let reg = opcode & 0b_111;
            let word = vm.cpu.registers.read_reg_word(reg);
            let res = flags::dec(&mut vm.cpu, word);
            vm.cpu.registers.write_reg_word(reg, res);
        }
        // PUSH reg
        0b_0101_0000..=0b_0101_0111 => {
            let reg = opcode & 0b_111;
            if reg == 0b_100 {
                control::push_sp(vm);
            } else {
                vm.push_word(vm.cpu.registers.read_reg_word(reg));
            }
        }
        // POP reg
        0b_0101_1000..=0b_0101_1111 => {
            let word = vm.pop_word();
            vm.cpu.registers.write_reg_word(opcode & 0b_111, word);
        }
        // JMP CONDITIONAL disp
        0x70..=0x7F => {
            let disp = vm.fetch_byte();
            if control::condition(vm, opcode) {
                control::jump_short(vm, disp);
            }
        }
        // Group 80-83: ADD OR ADC SBB AND SUB XOR CMP r/m,imm
        0b_1000_0000..=0b_1000_0011 => alu::group_80_83(vm, opcode),
        // TEST r/m,reg
        0b_1000_0100 | 0b_1000_0101 => sized!(is_word, test_modrm, vm),
        // XCHG r/m,reg
        0b_1000_0110 | 0b_1000_0111 => sized!(is_word, xchg_modrm, vm),
        // MOV Mod R/M
        0b_1000_1000..=0b_1000_1011 => sized!(is_word, mov_modrm, vm, directional),
        // MOV r/m,sreg
        0x8C => {
            let modrm = vm.fetch_modrm();
            let word = vm.cpu.registers.segment(SegmentType::from(modrm.reg));
            vm.write_operand(&modrm.operand, word);
        }
        // LEA
        0x8D => {
            let modrm = vm.fetch_modrm();
            let address = match modrm.operand {
                EffectiveAddress::Memory { offset, .. } => offset,
                EffectiveAddress::Register(_) => return Err(invalid_opcode(vm, opcode)),
            };
            vm.cpu.registers.write_reg_word(modrm.reg, address);
        }
        // MOV sreg,r/m
        0x8E => {
            let modrm = vm.fetch_modrm();
            let word = vm.read_operand::<u16>(&modrm.operand);
            vm.cpu.registers.set_segment(SegmentType::from(modrm.reg), word);
        }
        // POP r/m
        0x8F => {
            let word = vm.pop_word();
            let modrm = vm.fetch_modrm();
            vm.write_operand(&modrm.operand, word);
        }
        // NOP
        0x90 => {}
        // XCHG AX,reg
        0b_1001_0001..=0b_1001_0111 => {
            let reg = opcode & 0b_111;
            let word = vm.cpu.registers.read_reg_word(reg);
            let ax = vm.cpu.registers.ax.word();
            vm.cpu.registers.write_reg_word(reg, ax);
            vm.cpu.registers.ax.set(word);
        }
        // CBW
        0x98 => alu::cbw(vm),
        // CWD
        0x99 => alu::cwd(vm),
        // CALL addr
        0x9A => {
            let address = vm.fetch_word();
            let segment = vm.fetch_word();
            vm.push_word(vm.cpu.registers.cs.word());
            vm.push_word(vm.cpu.registers.ip.word());
            vm.cpu.registers.cs.set(segment);
            vm.cpu.registers.ip.set(address);
        }
        // WAIT
        0x9B => {}
        // PUSHF
        0x9C => vm.push_word(vm.cpu.flags_image()),
        // POPF
        0x9D => {
            let flags = vm.pop_word();
            vm.cpu.load_flags(flags);
        }
        // SAHF
        0x9E => {
            let ah = vm.cpu.registers.ax.high() as u16;
            vm.cpu.load_flags((vm.cpu.flags & 0xFF00) | ah);
        }
        // LAHF
        0x9F => vm.cpu.registers.ax.set_high(vm.cpu.flags as u8),
        // MOV ac,mem (moffs)
        0b_1010_0000 | 0b_1010_0001 => {
            let address = vm.fetch_word();
            let segment = vm.data_segment();
            if is_word {
                let word = vm.memory.read_word_at(segment, address);
                vm.cpu.registers.ax.set(word);
            } else {
                let byte = vm.memory.read_byte_at(segment, address);
                vm.cpu.registers.ax.set_low(byte);
            }
        }
        // MOV mem,ac
        0b_1010_0010 | 0b_1010_0011 => {
            let address = vm.fetch_word();
            let segment = vm.data_segment();
            if is_word {
                let word = vm.cpu.registers.ax.word();
                vm.memory.write_word_at(segment, address, word);
            } else {
                let byte = vm.cpu.registers.ax.low();
                vm.memory.write_byte_at(segment, address, byte);
            }
        }
        // MOVS
        0b_1010_0100 | 0b_1010_0101 => sized!(is_word, string::movs, vm),
        // CMPS
        0b_1010_0110 | 0b_1010_0111 => sized!(is_word, string::cmps, vm),
        // TEST ac,imm
        0b_1010_1000 | 0b_1010_1001 => {
            if is_word {
                let word = vm.fetch_word() & vm.cpu.registers.ax.word();
                flags::logic(&mut vm.cpu, word);
            } else {
                let byte = vm.fetch_byte() & vm.cpu.registers.ax.low();
                flags::logic(&mut vm.cpu, byte);
            }
        }
        // STOS
        0b_1010_1010 | 0b_1010_1011 => sized!(is_word, string::stos, vm),
        // LODS
        0b_1010_1100 | 0b_1010_1101 => sized!(is_word, string::lods, vm),
        // SCAS
        0b_1010_1110 | 0b_1010_1111 => sized!(is_word, string::scas, vm),
        // MOV reg,data
        0b_1011_0000..=0b_1011_1111 => {
            let reg = opcode & 0b_111;
            if opcode & 0b_0000_1000 != 0 {
                let word = vm.fetch_word();
                vm.cpu.registers.write_reg_word(reg, word);
            } else {
                let byte = vm.fetch_byte();
                vm.cpu.registers.write_reg_byte(reg, byte);
            }
        }
        // RET disp16
        0xC2 => {
            let disp = vm.fetch_word();
            let ip = vm.pop_word();
            vm.cpu.registers.ip.set(ip);
            vm.cpu.registers.sp.operation(disp, u16::wrapping_add);
        }
        // RET
        0xC3 => {
            let ip = vm.pop_word();
            vm.cpu.registers.ip.set(ip);
        }
        // LES | LDS
        0xC4 | 0xC5 => {
            let modrm = vm.fetch_modrm();
            let (offset, segment) =
                control::far_pointer(vm, &modrm.operand).ok_or_else(|| invalid_opcode(vm, opcode))?;
            vm.cpu.registers.write_reg_word(modrm.reg, offset);
            let target = if is_word { SegmentType::DS } else { SegmentType::ES };
            vm.cpu.registers.set_segment(target, segment);
        }
        // MOV r/m,data (all reg values behave as MOV on the 8086)
        0b_1100_0110 | 0b_1100_0111 => sized!(is_word, mov_immediate, vm),
        // RET far disp16
        0xCA => {
            let disp = vm.fetch_word();
            far_return(vm);
            vm.cpu.registers.sp.operation(disp, u16::wrapping_add);
        }
        // RET far
        0xCB => far_return(vm),
        // INT 3
        0xCC => vm.dispatch_interrupt(0x03),
        // INT imm8
        0xCD => {
            let vector = vm.fetch_byte();
            vm.dispatch_interrupt(vector);
        }
        // INTO
        0xCE => {
            if vm.cpu.check_flag(Overflow) {
                vm.dispatch_interrupt(0x04);
            }
        }
        // IRET
        0xCF => {
            let ip = vm.pop_word();
            let cs = vm.pop_word();
            let flags = vm.pop_word();
            vm.cpu.registers.ip.set(ip);
            vm.cpu.registers.cs.set(cs);
            vm.cpu.load_flags(flags);
        }
        // ROL ROR RCL RCR SHL SHR SAL SAR
        0b_1101_0000..=0b_1101_0011 => sized!(is_word, shift::group_d0_d3, vm, directional),
        // AAM
        0xD4 => alu::aam(vm),
        // AAD
        0xD5 => alu::aad(vm),
        // XLAT
        0xD7 => {
            let address = vm.cpu.registers.bx.word().wrapping_add(vm.cpu.registers.ax.low() as u16);
            let byte = vm.memory.read_byte_at(vm.data_segment(), address);
            vm.cpu.registers.ax.set_low(byte);
        }
        // ESC (no coprocessor, ModR/M consumed)
        0b_1101_1000..=0b_1101_1111 => {
            let modrm = vm.fetch_modrm();
            trace!("ESC {:02X} /{} ignored", opcode, modrm.reg);
        }
        // LOOPNE LOOPE LOOP JCXZ
        0xE0..=0xE3 => control::loop_family(vm, opcode),
        // IN ac,imm8
        0xE4 | 0xE5 => {
            let port = vm.fetch_byte() as u16;
            port_in(vm, port, is_word);
        }
        // OUT imm8,ac
        0xE6 | 0xE7 => {
            let port = vm.fetch_byte() as u16;
            port_out(vm, port, is_word);
        }
        // CALL disp16
        0xE8 => {
            let disp = vm.fetch_word();
            vm.push_word(vm.cpu.registers.ip.word());
            vm.cpu.registers.ip.operation(disp, u16::wrapping_add);
        }
        // JMP disp16
        0xE9 => {
            let disp = vm.fetch_word();
            vm.cpu.registers.ip.operation(disp, u16::wrapping_add);
        }
        // JMP addr
        0xEA => {
            let ip = vm.fetch_word();
            let cs = vm.fetch_word();
            vm.cpu.registers.ip.set(ip);
            vm.cpu.registers.cs.set(cs);
        }
        // JMP disp
        0xEB => {
            let disp = vm.fetch_byte();
            control::jump_short(vm, disp);
        }
        // IN ac,DX
        0xEC | 0xED => {
            let port = vm.cpu.registers.dx.word();
            port_in(vm, port, is_word);
        }
        // OUT DX,ac
        0xEE | 0xEF => {
            let port = vm.cpu.registers.dx.word();
            port_out(vm, port, is_word);
        }
        // HLT
        0xF4 => vm.cpu.halted = true,
        // CMC
        0xF5 => vm.cpu.flip_flag(Carry),
        // TEST NOT NEG MUL IMUL DIV IDIV
        0b_1111_0110 | 0b_1111_0111 => sized!(is_word, alu::group_f6_f7, vm),
        // CLC / STC
        0xF8 | 0xF9 => vm.cpu.update_flag(Carry, is_word),
        // CLI
        0xFA => vm.cpu.unset_flag(Interrupt),
        // STI
        0xFB => vm.cpu.set_flag(Interrupt),
        // CLD / STD
        0xFC | 0xFD => vm.cpu.update_flag(Directional, is_word),
        // (GRP) INC DEC CALL JMP PUSH
        0b_1111_1110 | 0b_1111_1111 => control::group_fe_ff(vm, opcode, is_word)?,
        opcode => return Err(invalid_opcode(vm, opcode)),
    }
    Ok(())
}

fn test_modrm<T: ModRM>(vm: &mut Runtime) {
    let modrm = vm.fetch_modrm();
    let reg = T::read_register(&vm.cpu.registers, modrm.reg);
    let rm = vm.read_operand::<T>(&modrm.operand);
    flags::logic(&mut vm.cpu, rm & reg);
}

fn xchg_modrm<T: ModRM>(vm: &mut Runtime) {
    let modrm = vm.fetch_modrm();
    let reg = T::read_register(&vm.cpu.registers, modrm.reg);
    let rm = vm.read_operand::<T>(&modrm.operand);
    vm.write_operand(&modrm.operand, reg);
    T::write_register(&mut vm.cpu.registers, modrm.reg, rm);
}

fn mov_modrm<T: ModRM>(vm: &mut Runtime, directional: bool) {
    let modrm = vm.fetch_modrm();
    if directional {
        let value = vm.read_operand::<T>(&modrm.operand);
        T::write_register(&mut vm.cpu.registers, modrm.reg, value);
    } else {
        let value = T::read_register(&vm.cpu.registers, modrm.reg);
        vm.write_operand(&modrm.operand, value);
    }
}

fn mov_immediate<T: ModRM>(vm: &mut Runtime) {
    let modrm = vm.fetch_modrm();
    let value = T::fetch(vm);
    vm.write_operand(&modrm.operand, value);
}

fn far_return(vm: &mut Runtime) {
    let ip = vm.pop_word();
    let cs = vm.pop_word();
    vm.cpu.registers.ip.set(ip);
    vm.cpu.registers.cs.set(cs);
}

/// No devices are attached: reads float high.
fn port_in(vm: &mut Runtime, port: u16, is_word: bool) {
    trace!("IN {:04X}", port);
    if is_word {
        vm.cpu.registers.ax.set(0xFFFF);
    } else {
        vm.cpu.registers.ax.set_low(0xFF);
    }
}

fn port_out(vm: &mut Runtime, port: u16, is_word: bool) {
    if is_word {
        debug!("OUT {:04X} <- {:04X} discarded", port, vm.cpu.registers.ax.word());
    } else {
        debug!("OUT {:04X} <- {:02X} discarded", port, vm.cpu.registers.ax.low());
    }
}
