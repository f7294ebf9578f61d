//! MAC-1 CPU state

use crate::alu::ALU;
use crate::control::MicroPc;

/// CPU state: the MAC-1 register set plus the micro-program counter.
/// One instance owns all mutable machine state except memory.
#[derive(Clone, Copy, Debug)]
pub struct CPUState {
    /// Program counter
    pub pc: Register,
    /// Accumulator
    pub ac: Register,
    /// Stack pointer
    pub sp: Register,
    /// Instruction register
    pub ir: Register,
    /// Temporary instruction register
    pub tir: Register,
    /// Memory address register
    pub mar: Register,
    /// Memory buffer register
    pub mbr: Register,

    /// Arithmetic/logic unit with its flag register
    pub alu: ALU,

    /// Micro-program counter; `MicroPc::Fetch0` is both the reset state
    /// and the fetch-cycle entry state
    pub mpc: MicroPc,

    /// CPU policy
    pub policy: CPUPolicy,

    /// History of execution
    pub history: CPUHistory,
}

impl CPUState {
    pub fn make(policy: CPUPolicy) -> Self {
        Self {
            pc: Register::new(0),
            ac: Register::new(0),
            sp: Register::new(0),
            ir: Register::new(0),
            tir: Register::new(0),
            mar: Register::new(0),
            mbr: Register::new(0),
            alu: ALU::make(),
            mpc: MicroPc::default(),
            policy,
            history: CPUHistory::default(),
        }
    }

    /// Reinitializes registers, flags, MPC and history; keeps the policy
    pub fn reset(&mut self) {
        *self = Self::make(self.policy);
    }

    /// Increments history micro-step count
    pub fn update_step_count(&mut self, value: u64) {
        self.history.micro_step_count += value;
    }

    /// Increments history instruction count
    pub fn update_inst_count(&mut self, value: u64) {
        self.history.inst_count += value;
    }
}

/// A single 16-bit storage cell.
/// The `u16` backing makes every write wrap to 0..65535.
#[derive(Clone, Copy, Debug, Default)]
pub struct Register {
    /// Current data in the register
    data: u16,
}

impl Register {
    pub fn new(data: u16) -> Self {
        Self { data }
    }

    /// Reads the register
    pub fn read(&self) -> u16 {
        self.data
    }

    /// Writes to register
    pub fn write(&mut self, value: u16) {
        self.data = value;
    }
}

/// CPU policy
#[derive(Clone, Copy, Debug, Default)]
pub struct CPUPolicy {
    pub verbose: bool,
    pub history: bool,
}

/// History module
#[derive(Clone, Copy, Debug, Default)]
pub struct CPUHistory {
    pub micro_step_count: u64,
    pub inst_count: u64,
}
