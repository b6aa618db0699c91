use crate::vm::runtime::SegmentType;

/// A 16-bit register with independent access to its low and high bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Register(u16);

impl Register {
    pub const fn new(word: u16) -> Self {
        Self(word)
    }

    #[inline(always)]
    pub fn word(&self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub fn low(&self) -> u8 {
        self.0 as u8
    }

    #[inline(always)]
    pub fn high(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline(always)]
    pub fn set(&mut self, word: u16) {
        self.0 = word;
    }

    #[inline(always)]
    pub fn set_low(&mut self, byte: u8) {
        self.0 = (self.0 & 0xFF00) | byte as u16;
    }

    #[inline(always)]
    pub fn set_high(&mut self, byte: u8) {
        self.0 = (self.0 & 0x00FF) | (byte as u16) << 8;
    }

    #[inline(always)]
    pub fn operation<T>(&mut self, value: T, operation: fn(u16, T) -> u16) -> u16 {
        let res = operation(self.0, value);
        self.0 = res;
        res
    }
}

#[derive(Clone, Default)]
pub struct Registers {
    pub ax: Register,
    pub bx: Register,
    pub cx: Register,
    pub dx: Register,
    pub si: Register,
    pub di: Register,
    pub sp: Register,
    pub bp: Register,
    pub ip: Register,
    pub cs: Register,
    pub ds: Register,
    pub es: Register,
    pub ss: Register,
    /// IP of the opcode currently executing, prefixes included.
    pub op_ip: u16,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    // Byte selectors: 0-3 = AL CL DL BL, 4-7 = AH CH DH BH
    #[inline(always)]
    pub fn read_reg_byte(&self, reg: u8) -> u8 {
        match reg & 0b111 {
            0b000 => self.ax.low(),
            0b001 => self.cx.low(),
            0b010 => self.dx.low(),
            0b011 => self.bx.low(),
            0b100 => self.ax.high(),
            0b101 => self.cx.high(),
            0b110 => self.dx.high(),
            _ => self.bx.high(),
        }
    }

    #[inline(always)]
    pub fn write_reg_byte(&mut self, reg: u8, value: u8) {
        match reg & 0b111 {
            0b000 => self.ax.set_low(value),
            0b001 => self.cx.set_low(value),
            0b010 => self.dx.set_low(value),
            0b011 => self.bx.set_low(value),
            0b100 => self.ax.set_high(value),
            0b101 => self.cx.set_high(value),
            0b110 => self.dx.set_high(value),
            _ => self.bx.set_high(value),
        }
    }

    #[inline(always)]
    pub fn reg_word(&mut self, reg: u8) -> &mut Register {
        match reg & 0b111 {
            0b000 => &mut self.ax,
            0b001 => &mut self.cx,
            0b010 => &mut self.dx,
            0b011 => &mut self.bx,
            0b100 => &mut self.sp,
            0b101 => &mut self.bp,
            0b110 => &mut self.si,
            _ => &mut self.di,
        }
    }

    #[inline(always)]
    pub fn read_reg_word(&self, reg: u8) -> u16 {
        match reg & 0b111 {
            0b000 => self.ax.word(),
            0b001 => self.cx.word(),
            0b010 => self.dx.word(),
            0b011 => self.bx.word(),
            0b100 => self.sp.word(),
            0b101 => self.bp.word(),
            0b110 => self.si.word(),
            _ => self.di.word(),
        }
    }

    #[inline(always)]
    pub fn write_reg_word(&mut self, reg: u8, value: u16) {
        self.reg_word(reg).set(value);
    }

    #[inline(always)]
    pub fn segment(&self, segment: SegmentType) -> u16 {
        match segment {
            SegmentType::ES => self.es.word(),
            SegmentType::CS => self.cs.word(),
            SegmentType::SS => self.ss.word(),
            SegmentType::DS => self.ds.word(),
        }
    }

    #[inline(always)]
    pub fn set_segment(&mut self, segment: SegmentType, value: u16) {
        match segment {
            SegmentType::ES => self.es.set(value),
            SegmentType::CS => self.cs.set(value),
            SegmentType::SS => self.ss.set(value),
            SegmentType::DS => self.ds.set(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_halves_alias_the_word() {
        let mut reg = Register::new(0x1234);
        assert_eq!(reg.low(), 0x34);
        assert_eq!(reg.high(), 0x12);

        reg.set_low(0xCD);
        assert_eq!(reg.word(), 0x12CD);
        reg.set_high(0xAB);
        assert_eq!(reg.word(), 0xABCD);
    }

    #[test]
    fn operation_writes_back() {
        let mut reg = Register::new(0xFFFF);
        assert_eq!(reg.operation(1, u16::wrapping_add), 0);
        assert_eq!(reg.word(), 0);
    }

    #[test]
    fn byte_selectors_follow_encoding_order() {
        let mut regs = Registers::new();
        regs.ax.set(0x1122);
        regs.cx.set(0x3344);
        regs.dx.set(0x5566);
        regs.bx.set(0x7788);

        let expected = [0x22, 0x44, 0x66, 0x88, 0x11, 0x33, 0x55, 0x77];
        for (reg, value) in expected.iter().enumerate() {
            assert_eq!(regs.read_reg_byte(reg as u8), *value);
        }

        regs.write_reg_byte(0b111, 0xEE);
        assert_eq!(regs.bx.word(), 0xEE88);
    }

    #[test]
    fn word_selectors_follow_encoding_order() {
        let mut regs = Registers::new();
        for reg in 0..8u8 {
            regs.write_reg_word(reg, 0x1000 + reg as u16);
        }
        assert_eq!(regs.ax.word(), 0x1000);
        assert_eq!(regs.cx.word(), 0x1001);
        assert_eq!(regs.dx.word(), 0x1002);
        assert_eq!(regs.bx.word(), 0x1003);
        assert_eq!(regs.sp.word(), 0x1004);
        assert_eq!(regs.bp.word(), 0x1005);
        assert_eq!(regs.si.word(), 0x1006);
        assert_eq!(regs.di.word(), 0x1007);
    }

    #[test]
    fn segment_access() {
        let mut regs = Registers::new();
        regs.set_segment(SegmentType::SS, 0x9000);
        regs.set_segment(SegmentType::ES, 0xB800);
        assert_eq!(regs.ss.word(), 0x9000);
        assert_eq!(regs.segment(SegmentType::ES), 0xB800);
        assert_eq!(regs.segment(SegmentType::DS), 0);
    }
}
