use crate::bios::bda;
use crate::vm::runtime::{CpuFlag, Runtime};

// 1.44MB 3.5" floppy
const CYLINDERS: u16 = 80;
const HEADS: u8 = 2;
const SECTORS_PER_TRACK: u8 = 18;
const DRIVE_TYPE_144M: u8 = 0x04;

/// INT 13h: Disk services. No image backs the drive: transfers report
/// success and move no data.
pub fn int13h(vm: &mut Runtime) {
    let ah = vm.cpu.registers.ax.high();
    let dl = vm.cpu.registers.dx.low();
    log::debug!(
        "[INT13h] AH={:02X} DL={:02X} at {:04X}:{:04X}",
        ah,
        dl,
        vm.cpu.registers.cs.word(),
        vm.cpu.registers.op_ip
    );

    match ah {
        // Reset, read, write. AL keeps the requested sector count.
        0x00 | 0x02 | 0x03 => disk_ok(vm),
        0x01 => get_status(vm),
        0x08 => get_drive_params(vm),
        _ => log::debug!("[INT13h] AH={:02X} ignored", ah),
    }
}

fn disk_ok(vm: &mut Runtime) {
    vm.cpu.unset_flag(CpuFlag::Carry);
    vm.cpu.registers.ax.set_high(0);
    vm.bios.disk_status = 0;
    vm.memory.write_byte(bda::FLOPPY_STATUS, 0);
}

fn get_status(vm: &mut Runtime) {
    let status = vm.bios.disk_status;
    vm.cpu.registers.ax.set_high(status);
    vm.cpu.update_flag(CpuFlag::Carry, status != 0);
}

fn get_drive_params(vm: &mut Runtime) {
    let max_cyl = CYLINDERS - 1;
    let registers = &mut vm.cpu.registers;
    registers.cx.set_high((max_cyl & 0xFF) as u8);
    registers.cx.set_low((((max_cyl >> 8) as u8 & 0x03) << 6) | (SECTORS_PER_TRACK & 0x3F));
    registers.dx.set_high(HEADS - 1);
    // One floppy drive
    registers.dx.set_low(1);
    registers.bx.set_low(DRIVE_TYPE_144M);
    disk_ok(vm);
}
