pub mod alu;
pub mod assembler;
pub mod control;
pub mod cpu;
pub mod instruction;
pub mod memory;
pub mod run_wrapper;

pub mod error;
