//! ALU implementation

/// 16-bit combinational ALU with a two-bit flag register.
/// Every operation masks its result to 16 bits and refreshes the flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct ALU {
    /// Zero flag: the last result was 0
    pub z_flag: bool,
    /// Negative flag: bit 15 of the last result was set
    pub n_flag: bool,
}

impl ALU {
    pub fn make() -> Self {
        Self::default()
    }

    /// Recomputes the flags from a 16-bit result.
    /// Also called standalone when a load-type instruction must set
    /// flags without running an arithmetic op.
    pub fn update_flags(&mut self, result: u16) {
        self.z_flag = result == 0;
        self.n_flag = result & 0x8000 != 0;
    }

    pub fn add(&mut self, a: u16, b: u16) -> u16 {
        let res = a.wrapping_add(b);
        self.update_flags(res);
        res
    }

    /// Two's-complement subtraction; no carry or overflow flag is modeled
    pub fn sub(&mut self, a: u16, b: u16) -> u16 {
        let res = a.wrapping_sub(b);
        self.update_flags(res);
        res
    }

    pub fn and(&mut self, a: u16, b: u16) -> u16 {
        let res = a & b;
        self.update_flags(res);
        res
    }

    pub fn invert(&mut self, a: u16) -> u16 {
        let res = !a;
        self.update_flags(res);
        res
    }

    pub fn shift_left(&mut self, a: u16) -> u16 {
        let res = a << 1;
        self.update_flags(res);
        res
    }

    /// Logical right shift (the high bit is not preserved)
    pub fn shift_right(&mut self, a: u16) -> u16 {
        let res = a >> 1;
        self.update_flags(res);
        res
    }
}

/// Set of ALU operations, named for the per-step signal trace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ALUOp {
    ADD,
    SUB,
    AND,
    INV,
    SHL,
    SHR,
}
