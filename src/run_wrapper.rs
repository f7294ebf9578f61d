//! A simulator wrapper

use crate::assembler;
use crate::control::{self, MicroPc, StepTrace};
use crate::cpu::CPUPolicy;
use crate::cpu::CPUState;
use crate::error::ExecutionError;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;
use crate::memory::cache::Cache;
use crate::memory::AccessStatus;
use crate::memory::Memory;

pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 1_000_000;

// (instruction count, micro-step count, cache hit rate)
pub type RunStats = (u64, u64, f64);

/// A complete machine: CPU state plus the cached memory it drives
pub struct Machine {
    pub cpu: CPUState,
    pub mem: Cache,
}

impl Machine {
    pub fn make(policy: CPUPolicy) -> Self {
        Self {
            cpu: CPUState::make(policy),
            mem: Cache::make(Memory::make()),
        }
    }

    /// Loads a program at ascending addresses starting from 0
    pub fn load(&mut self, program: &[u16]) {
        for (address, word) in program.iter().enumerate() {
            self.mem.memory.write(address as u16, *word);
        }
    }

    /// Executes one micro-instruction
    pub fn step(&mut self) -> StepTrace {
        control::micro_step(&mut self.cpu, &mut self.mem)
    }

    /// Executes micro-instructions until a full macro instruction has
    /// completed, returning the trace of its final micro-step
    pub fn step_instruction(&mut self) -> StepTrace {
        loop {
            let trace = self.step();
            if self.cpu.mpc == MicroPc::Fetch0 {
                return trace;
            }
        }
    }

    /// Clears CPU state, cache lines, and memory contents
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.mem.reset();
        self.mem.memory.reset();
    }

    /// Numeric address of the next micro-instruction
    pub fn mpc_address(&self) -> u16 {
        self.cpu.mpc.address()
    }

    /// Outcome of the most recent cache access
    pub fn cache_status(&self) -> AccessStatus {
        self.mem.last_access
    }
}

/// Assemble the given source file, load it, and run it to completion
pub fn run(source_path: &str, policy: CPUPolicy) -> SimulatorResult<RunStats> {
    let source = std::fs::read_to_string(source_path)?;
    let program = assembler::assemble(&source)?;

    let mut machine = Machine::make(policy);
    machine.load(&program);

    run_loaded(&mut machine, DEFAULT_INSTRUCTION_LIMIT)
}

/// Run a loaded machine until the program halts on a self-jump or the
/// instruction budget is exhausted
pub fn run_loaded(
    machine: &mut Machine,
    limit: u64,
) -> SimulatorResult<RunStats> {
    let policy = machine.cpu.policy;

    loop {
        if machine.cpu.history.inst_count >= limit {
            return Err(ExecutionError::ExecutionLimitReached(limit).into());
        }

        // PC at the start of the fetch cycle; a completed instruction
        // that lands back here is a self-jump, the halt convention
        let fetch_pc = machine.cpu.pc.read();

        loop {
            let trace = machine.step();
            if policy.verbose {
                eprintln!("[VERBOSE] {}", trace.description);
            }
            if machine.cpu.mpc == MicroPc::Fetch0 {
                break;
            }
        }

        if machine.cpu.pc.read() == fetch_pc {
            break;
        }
    }

    let instruction_count = machine.cpu.history.inst_count;
    let step_count = machine.cpu.history.micro_step_count;
    let hit_rate = machine.mem.hit_rate();

    if policy.history {
        eprintln!("[HISTORY] # instructions = {}", instruction_count);
        eprintln!("[HISTORY] # micro-steps = {}", step_count);
        eprintln!(
            "[HISTORY] steps/instruction = {:.2}",
            step_count as f64 / instruction_count as f64
        );
        eprintln!("[HISTORY] {:?}", machine.mem.history);
        eprintln!("[HISTORY] cache hit rate = {:.2}", hit_rate);
    }

    Ok((instruction_count, step_count, hit_rate))
}

/// Fetch operations from the trace file
pub fn fetch_operations(trace_path: &str) -> SimulatorResult<Vec<(char, u16)>> {
    let content = std::fs::read_to_string(trace_path)?;
    let mut operations: Vec<(char, u16)> = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        // Parse the line into op and address
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(SimulatorError::TraceError(
                trace_path.into(),
                format!(
                    "Invalid format at line {}: expected 'op address'",
                    line_num + 1
                ),
            ));
        }

        let op = parts[0].chars().next().ok_or_else(|| {
            SimulatorError::TraceError(
                trace_path.into(),
                format!("Invalid operation at line {}", line_num + 1),
            )
        })?;

        if op != 'r' && op != 'w' {
            return Err(SimulatorError::TraceError(
                trace_path.into(),
                format!(
                    "Invalid operation '{}' at line {}: expected 'r' or 'w'",
                    op,
                    line_num + 1
                ),
            ));
        }

        let address_str = parts[1];
        if !address_str.starts_with("0x") {
            return Err(SimulatorError::TraceError(
                trace_path.into(),
                format!("Invalid address format at line {}: expected hexadecimal starting with '0x'", line_num + 1)
            ));
        }

        let address =
            u16::from_str_radix(&address_str[2..], 16).map_err(|_| {
                SimulatorError::TraceError(
                    trace_path.into(),
                    format!(
                        "Invalid hexadecimal address at line {}",
                        line_num + 1
                    ),
                )
            })?;

        operations.push((op, address));
    }

    Ok(operations)
}

/// Replay a trace file against the given cache and return the observed
/// hit rate
pub fn run_trace(cache: &mut Cache, trace_path: &str) -> SimulatorResult<f64> {
    let operations = fetch_operations(trace_path)?;

    for (op, address) in &operations {
        match op {
            'r' => {
                cache.read(*address);
            }
            _ => {
                cache.write(*address, 0);
            }
        }
    }

    Ok(cache.hit_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_program(source: &str) -> (Machine, RunStats) {
        let program = assembler::assemble(source).unwrap();
        let mut machine = Machine::make(CPUPolicy::default());
        machine.load(&program);
        let stats =
            run_loaded(&mut machine, DEFAULT_INSTRUCTION_LIMIT).unwrap();
        (machine, stats)
    }

    #[test]
    fn test_store_load_round_trip() {
        let source = "\
LOCO 5
STOD 100
LOCO 0
LODD 100
DONE: JUMP DONE
";
        let (machine, stats) = run_program(source);
        assert_eq!(machine.cpu.ac.read(), 5);
        assert_eq!(machine.mem.memory.read(100), 5);
        assert_eq!(stats.0, 5);
    }

    #[test]
    fn test_countdown_loop() {
        let source = "\
LOCO 1
STOD 200
LOCO 3
TOP: SUBD 200
JNZE TOP
DONE: JUMP DONE
";
        let (machine, _) = run_program(source);
        assert_eq!(machine.cpu.ac.read(), 0);
        assert!(machine.cpu.alu.z_flag);
    }

    #[test]
    fn test_push_pop_discipline() {
        let source = "\
LOCO 500
SWAP
LOCO 11
PUSH
LOCO 22
PUSH
POP
POP
DONE: JUMP DONE
";
        let (machine, _) = run_program(source);
        assert_eq!(machine.cpu.ac.read(), 11);
        assert_eq!(machine.cpu.sp.read(), 500);
    }

    #[test]
    fn test_call_retn_linkage() {
        let source = "\
LOCO 500
SWAP
CALL SUB
DONE: JUMP DONE
SUB: LOCO 42
RETN
";
        let (machine, _) = run_program(source);
        assert_eq!(machine.cpu.ac.read(), 42);
        assert_eq!(machine.cpu.pc.read(), 3);
        assert_eq!(machine.cpu.sp.read(), 500);
    }

    #[test]
    fn test_instruction_limit() {
        // JUMP to the next word, twice, forever: never a self-jump
        let source = "A: JUMP B\nB: JUMP A\n";
        let program = assembler::assemble(source).unwrap();
        let mut machine = Machine::make(CPUPolicy::default());
        machine.load(&program);
        let result = run_loaded(&mut machine, 10);
        assert!(matches!(
            result,
            Err(SimulatorError::ExecutionError(
                ExecutionError::ExecutionLimitReached(10)
            ))
        ));
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut machine, _) = run_program("LOCO 9\nSTOD 50\nD: JUMP D\n");
        machine.reset();
        assert_eq!(machine.cpu.pc.read(), 0);
        assert_eq!(machine.cpu.ac.read(), 0);
        assert_eq!(machine.mem.memory.read(50), 0);
        assert_eq!(machine.mem.history.num_hit, 0);
        assert_eq!(machine.mpc_address(), 0);
    }
}
