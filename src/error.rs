use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Assembly failed: {0}")]
    AssemblyError(#[from] AssemblyError),

    #[error("Execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Invalid trace file '{0}': {1}")]
    TraceError(PathBuf, String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while translating source lines into machine words.
/// Any of these aborts the whole assembly; no partial program is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("line {0}: unknown mnemonic '{1}'")]
    UnknownMnemonic(usize, String),

    #[error("line {0}: invalid operand '{1}'")]
    InvalidOperand(usize, String),

    #[error("line {0}: duplicate label '{1}'")]
    DuplicateLabel(usize, String),

    #[error("line {0}: {1} requires an operand")]
    MissingOperand(usize, String),
}

/// Errors related to driving the machine.
/// The micro-step engine itself never fails; only the run driver does.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Execution limit reached: {0} instructions")]
    ExecutionLimitReached(u64),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
