use crate::bios::{self, Bios};
use crate::error::EmulationError;
use crate::loader;
use crate::utils::number::extend_sign;
use crate::vm::cpu::Cpu;
use crate::vm::instructions::process;
use crate::vm::memory::{linear, Memory, IVT_BASE};
use crate::vm::modrm::{self, EffectiveAddress, ModRm, ModRM};
use crate::vm::runtime::CpuFlag::{Carry, Interrupt, Overflow, Sign, Trap, Zero};
use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use std::path::Path;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum CpuFlag {
    Carry = 0,
    Parity = 2,
    AuxCarry = 4,
    Zero = 6,
    Sign = 7,
    Trap = 8,
    Interrupt = 9,
    Directional = 10,
    Overflow = 11,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SegmentType {
    ES = 0b_00,
    CS = 0b_01,
    SS = 0b_10,
    DS = 0b_11,
}

impl From<u8> for SegmentType {
    fn from(value: u8) -> Self {
        match value & 0b_11 {
            0b_00 => SegmentType::ES,
            0b_01 => SegmentType::CS,
            0b_10 => SegmentType::SS,
            _ => SegmentType::DS,
        }
    }
}

pub enum Prefix {
    /// `true` for REP/REPE (F3), `false` for REPNE (F2).
    Rep(bool),
    Lock,
    Seg(SegmentType),
}

impl Prefix {
    pub fn decode(byte: u8) -> Option<Prefix> {
        match byte {
            // SEG
            0b_0010_0110 | 0b_0010_1110 | 0b_0011_0110 | 0b_0011_1110 => {
                Some(Prefix::Seg(SegmentType::from(byte >> 3)))
            }
            // REPNE | REP
            0b_1111_0010 | 0b_1111_0011 => Some(Prefix::Rep(byte & 1 != 0)),
            // LOCK
            0b_1111_0000 => Some(Prefix::Lock),
            _ => None,
        }
    }
}

/// Segment a DOS .COM image is loaded at.
pub const COM_SEGMENT: u16 = 0x1000;
pub const COM_ENTRY: u16 = 0x0100;

#[derive(Clone, Copy, Default, Debug)]
pub struct RuntimeOptions {
    /// Log every instruction at `trace` level.
    pub trace: bool,
}

pub struct Runtime {
    pub cpu: Cpu,
    pub memory: Memory,
    pub bios: Bios,
    /// Exit code recorded by a DOS terminate call.
    pub exit_status: Option<u8>,
    pub trace: bool,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let mut vm = Self {
            cpu: Cpu::new(),
            memory: Memory::new(),
            bios: Bios::new(),
            exit_status: None,
            trace: options.trace,
        };
        bios::init(&mut vm);
        vm
    }

    /// Executes one instruction, delivering a pending interrupt first.
    /// The step that halts (HLT or a DOS exit) still returns `Ok(())`;
    /// `Err(Halt)` comes from the next call on the halted CPU.
    pub fn step(&mut self) -> Result<(), EmulationError> {
        if self.cpu.check_flag(Interrupt) {
            if let Some(vector) = self.cpu.pending_interrupt.take() {
                self.cpu.halted = false;
                self.dispatch_interrupt(vector);
            }
        }
        if self.cpu.halted {
            return Err(EmulationError::Halt);
        }
        if self.trace {
            trace!("{:?}", self);
        }

        process(self)?;
        self.cpu.cycles += 1;
        Ok(())
    }

    /// Steps until the CPU halts. A halt is a normal stop.
    pub fn run(&mut self) -> Result<(), EmulationError> {
        debug!(
            "Starting at {:04X}:{:04X}",
            self.cpu.registers.cs.word(),
            self.cpu.registers.ip.word()
        );
        while !self.cpu.halted {
            match self.step() {
                Ok(()) | Err(EmulationError::Halt) => {}
                Err(e) => return Err(e),
            }
        }
        debug!("CPU halted after {} instructions", self.cpu.cycles);
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.halted
    }

    pub fn fetch_byte(&mut self) -> u8 {
        let ip = self.cpu.registers.ip.word();
        self.cpu.registers.ip.set(ip.wrapping_add(1));
        self.memory.read_byte_at(self.cpu.registers.cs.word(), ip)
    }

    pub fn fetch_word(&mut self) -> u16 {
        let low = self.fetch_byte() as u16;
        let high = self.fetch_byte() as u16;
        high << 8 | low
    }

    pub fn push_word(&mut self, word: u16) {
        let address = self.cpu.registers.sp.operation(2, u16::wrapping_sub);
        self.memory
            .write_word_at(self.cpu.registers.ss.word(), address, word);
    }

    pub fn pop_word(&mut self) -> u16 {
        let address = self.cpu.registers.sp.word();
        self.cpu.registers.sp.operation(2, u16::wrapping_add);
        self.memory.read_word_at(self.cpu.registers.ss.word(), address)
    }

    /// DS unless a segment prefix is active.
    pub fn data_segment(&self) -> u16 {
        let segment = self.cpu.segment_override.unwrap_or(SegmentType::DS);
        self.cpu.registers.segment(segment)
    }

    /// Reads the ModR/M byte and any displacement, resolving the operand.
    pub fn fetch_modrm(&mut self) -> ModRm {
        let (mode, reg, rm) = modrm::split(self.fetch_byte());
        let displacement = match modrm::displacement_len(mode, rm) {
            1 => extend_sign(self.fetch_byte()),
            2 => self.fetch_word(),
            _ => 0,
        };
        let operand = modrm::effective_address(
            &self.cpu.registers,
            mode,
            rm,
            displacement,
            self.cpu.segment_override,
        );
        ModRm { mode, reg, rm, operand }
    }

    pub fn read_operand<T: ModRM>(&self, operand: &EffectiveAddress) -> T {
        match *operand {
            EffectiveAddress::Register(reg) => T::read_register(&self.cpu.registers, reg),
            EffectiveAddress::Memory { segment, offset, .. } => {
                T::read_memory(&self.memory, self.cpu.registers.segment(segment), offset)
            }
        }
    }

    pub fn write_operand<T: ModRM>(&mut self, operand: &EffectiveAddress, value: T) {
        match *operand {
            EffectiveAddress::Register(reg) => T::write_register(&mut self.cpu.registers, reg, value),
            EffectiveAddress::Memory { segment, offset, .. } => {
                let segment = self.cpu.registers.segment(segment);
                T::write_memory(&mut self.memory, segment, offset, value)
            }
        }
    }

    /// Queues a hardware-style interrupt for delivery before the next fetch.
    pub fn raise_interrupt(&mut self, vector: u8) {
        self.cpu.pending_interrupt = Some(vector);
    }

    /// Routes a software interrupt to the BIOS layer or the IVT.
    pub fn dispatch_interrupt(&mut self, vector: u8) {
        if bios::intercept(self, vector) {
            return;
        }
        self.handle_interrupt(vector);
    }

    pub(crate) fn handle_interrupt(&mut self, vector: u8) {
        let addr = IVT_BASE + (vector as usize) * 4;
        let ip = self.memory.read_word(addr);
        let cs = self.memory.read_word(addr + 2);
        if ip == 0 && cs == 0 {
            debug!("INT {:02X}h has no handler installed, ignoring", vector);
            return;
        }

        self.push_word(self.cpu.flags_image());
        self.push_word(self.cpu.registers.cs.word());
        self.push_word(self.cpu.registers.ip.word());

        self.cpu.unset_flag(Interrupt);
        self.cpu.unset_flag(Trap);

        self.cpu.registers.ip.set(ip);
        self.cpu.registers.cs.set(cs);
    }

    /// Places a key in the BIOS buffer. Returns `false` when the buffer is full.
    pub fn inject_key(&mut self, scancode: u8, ascii: u8) -> bool {
        let injected = self.bios.keyboard.inject(scancode, ascii);
        bios::sync_keyboard(self);
        injected
    }

    pub fn set_shift_flags(&mut self, flags: u8) {
        self.bios.shift_flags = flags;
        bios::sync_keyboard(self);
    }

    /// Loads a boot sector at 0000:7C00. Reset state already points CS:IP there.
    pub fn load_boot_sector(&mut self, path: impl AsRef<Path>) -> Result<usize, EmulationError> {
        loader::load_boot_sector(&mut self.memory, path)
    }

    pub fn load_binary(&mut self, path: impl AsRef<Path>, load_address: usize) -> Result<usize, EmulationError> {
        loader::load_binary(&mut self.memory, path, load_address)
    }

    /// Loads a DOS .COM image at `COM_SEGMENT:0100` behind a minimal PSP.
    pub fn load_com(&mut self, path: impl AsRef<Path>) -> Result<usize, EmulationError> {
        let psp = linear(COM_SEGMENT, 0);
        let size = loader::load_binary(&mut self.memory, path, psp + COM_ENTRY as usize)?;

        // INT 20h at PSP:0000 so a near RET to 0 terminates
        self.memory.write_word(psp, 0x20CD);
        // First segment past the program's memory
        self.memory.write_word(psp + 2, 0xA000);

        let registers = &mut self.cpu.registers;
        registers.cs.set(COM_SEGMENT);
        registers.ds.set(COM_SEGMENT);
        registers.es.set(COM_SEGMENT);
        registers.ss.set(COM_SEGMENT);
        registers.ip.set(COM_ENTRY);
        registers.sp.set(0xFFFE);
        self.push_word(0x0000);
        Ok(size)
    }

    pub fn screen_text(&self) -> String {
        bios::video::screen_text(&self.memory)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}

#[inline(always)]
fn show_flag(vm: &Runtime, flag: CpuFlag, c: char) -> char {
    if vm.cpu.check_flag(flag) {
        return c;
    }
    '-'
}

impl Debug for Runtime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let registers = &self.cpu.registers;
        let cs = registers.cs.word();
        let ip = registers.ip.word();
        write!(
            f,
            "{:04x} {:04x} {:04x} {:04x} {:04x} {:04x} {:04x} {:04x} {}{}{}{}{} {:04x}:{:04x} {:02x}{:02x} {}",
            registers.ax.word(),
            registers.bx.word(),
            registers.cx.word(),
            registers.dx.word(),
            registers.sp.word(),
            registers.bp.word(),
            registers.si.word(),
            registers.di.word(),
            show_flag(self, Overflow, 'O'),
            show_flag(self, Sign, 'S'),
            show_flag(self, Zero, 'Z'),
            show_flag(self, Carry, 'C'),
            show_flag(self, Interrupt, 'I'),
            cs,
            ip,
            self.memory.read_byte_at(cs, ip),
            self.memory.read_byte_at(cs, ip.wrapping_add(1)),
            if self.cpu.halted { "Halted" } else { "Running" }
        )
    }
}
