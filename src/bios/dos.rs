use crate::bios::{keyboard, video};
use crate::vm::memory::{linear, IVT_BASE};
use crate::vm::runtime::{CpuFlag, Runtime};
use log::{debug, info, warn};

/// Reported by AH=30h.
pub const DOS_VERSION: (u8, u8) = (5, 0);

/// INT 20h: Program terminate
pub fn int20h(vm: &mut Runtime) {
    terminate(vm, 0);
}

/// INT 21h: DOS console services
pub fn int21h(vm: &mut Runtime) {
    let ah = vm.cpu.registers.ax.high();
    debug!("[INT21h] AH={:02X}", ah);
    match ah {
        0x00 => terminate(vm, 0),
        0x01 => {
            let ascii = read_key(vm).unwrap_or(0);
            if ascii != 0 {
                video::teletype(vm, ascii);
            }
            vm.cpu.registers.ax.set_low(ascii);
        }
        0x02 => {
            let ch = vm.cpu.registers.dx.low();
            video::teletype(vm, ch);
            vm.cpu.registers.ax.set_low(ch);
        }
        0x06 => direct_console_io(vm),
        0x09 => print_string(vm),
        0x25 => {
            let vector = vm.cpu.registers.ax.low() as usize;
            let offset = vm.cpu.registers.dx.word();
            let segment = vm.cpu.registers.ds.word();
            vm.memory.write_word(IVT_BASE + vector * 4, offset);
            vm.memory.write_word(IVT_BASE + vector * 4 + 2, segment);
        }
        0x30 => {
            let registers = &mut vm.cpu.registers;
            registers.ax.set_low(DOS_VERSION.0);
            registers.ax.set_high(DOS_VERSION.1);
            registers.bx.set(0x0000);
            registers.cx.set(0x0000);
        }
        0x35 => {
            let vector = vm.cpu.registers.ax.low() as usize;
            let offset = vm.memory.read_word(IVT_BASE + vector * 4);
            let segment = vm.memory.read_word(IVT_BASE + vector * 4 + 2);
            vm.cpu.registers.bx.set(offset);
            vm.cpu.registers.es.set(segment);
        }
        0x4C => {
            let code = vm.cpu.registers.ax.low();
            terminate(vm, code);
        }
        _ => warn!("[INT21h] unsupported function AH={:02X}", ah),
    }
}

fn terminate(vm: &mut Runtime, code: u8) {
    info!("Program terminated with exit code {}", code);
    vm.exit_status = Some(code);
    vm.cpu.halted = true;
}

fn read_key(vm: &mut Runtime) -> Option<u8> {
    let (_, ascii) = vm.bios.keyboard.pop()?;
    keyboard::sync(vm);
    Some(ascii)
}

/// AH=06: DL=FF polls for input (ZF set when none), anything else is output.
fn direct_console_io(vm: &mut Runtime) {
    let dl = vm.cpu.registers.dx.low();
    if dl != 0xFF {
        video::teletype(vm, dl);
        vm.cpu.registers.ax.set_low(dl);
        return;
    }
    match read_key(vm) {
        Some(ascii) => {
            vm.cpu.registers.ax.set_low(ascii);
            vm.cpu.unset_flag(CpuFlag::Zero);
        }
        None => {
            vm.cpu.registers.ax.set_low(0);
            vm.cpu.set_flag(CpuFlag::Zero);
        }
    }
}

/// AH=09: `$`-terminated string at DS:DX. The scan stops at the end of
/// the segment if no terminator is found.
fn print_string(vm: &mut Runtime) {
    let segment = vm.cpu.registers.ds.word();
    let start = vm.cpu.registers.dx.word();
    for i in 0..=u16::MAX {
        let ch = vm.memory.read_byte(linear(segment, start.wrapping_add(i)));
        if ch == b'$' {
            break;
        }
        video::teletype(vm, ch);
    }
    vm.cpu.registers.ax.set_low(b'$');
}
