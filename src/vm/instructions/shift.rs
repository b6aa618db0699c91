use crate::utils::number::SpecialOps;
use crate::vm::flags;
use crate::vm::modrm::ModRM;
use crate::vm::runtime::CpuFlag::*;
use crate::vm::runtime::Runtime;

/// ROL ROR RCL RCR SHL SHR SAL SAR by 1 (D0/D1) or by CL (D2/D3).
pub(super) fn group_d0_d3<T: ModRM>(vm: &mut Runtime, directional: bool) {
    let modrm = vm.fetch_modrm();
    // The 8086 does not mask the count
    let count = if directional { vm.cpu.registers.cx.low() as u32 } else { 1 };
    if count == 0 {
        return;
    }

    let value = vm.read_operand::<T>(&modrm.operand);
    let res = shift(vm, modrm.reg, value, count);
    vm.write_operand(&modrm.operand, res);
}

fn shift<T: SpecialOps>(vm: &mut Runtime, op: u8, value: T, count: u32) -> T {
    let cpu = &mut vm.cpu;
    let (res, carry) = match op & 0b_111 {
        // ROL
        0b_000 => {
            let res = value.rotate_left(count % T::BITS);
            (res, res & T::one() != T::zero())
        }
        // ROR
        0b_001 => {
            let res = value.rotate_right(count % T::BITS);
            (res, res.is_negative())
        }
        // RCL
        0b_010 => value.rotate_carry_left(count, cpu.check_flag(Carry)),
        // RCR
        0b_011 => value.rotate_carry_right(count, cpu.check_flag(Carry)),
        // SHL | SAL (reg=6 is an undocumented alias)
        0b_100 | 0b_110 => {
            let wide = value.widen().checked_shl(count).unwrap_or(0);
            let carry = count <= T::BITS && (value.widen() >> (T::BITS - count)) & 1 != 0;
            (T::truncate(wide), carry)
        }
        // SHR
        0b_101 => {
            let wide = value.widen().checked_shr(count).unwrap_or(0);
            let carry = count <= T::BITS && (value.widen() >> (count - 1)) & 1 != 0;
            (T::truncate(wide), carry)
        }
        // SAR
        _ => {
            let signed = value.sign_extend();
            let res = signed >> count.min(31);
            let carry = (signed >> (count - 1).min(31)) & 1 != 0;
            (T::truncate(res as u32), carry)
        }
    };

    cpu.update_flag(Carry, carry);
    if op & 0b_100 != 0 {
        flags::update_result_flags(cpu, res);
        // OF is only defined for single-bit shifts
        if count == 1 {
            let overflow = match op & 0b_111 {
                // SHR: sign of the original operand
                0b_101 => value.is_negative(),
                // SAR never changes the sign
                0b_111 => false,
                // SHL: sign changed
                _ => res.is_negative() != carry,
            };
            cpu.update_flag(Overflow, overflow);
        }
    } else if count == 1 {
        let overflow = match op & 0b_111 {
            // ROL, RCL: MSB(result) XOR CF
            0b_000 | 0b_010 => res.is_negative() != carry,
            // ROR, RCR: top two bits of the result differ
            _ => res.is_negative() != ((res << 1) & T::SIGN_BIT != T::zero()),
        };
        cpu.update_flag(Overflow, overflow);
    }
    res
}
