//! Micro-program control unit
//!
//! The control store is a fixed table of micro-steps: the three-step
//! fetch sequence plus one short routine per macro-opcode. `micro_step`
//! executes exactly one step, advances the MPC, and returns the signal
//! snapshot for that step.

use crate::alu::ALUOp;
use crate::cpu::CPUState;
use crate::instruction::{self, StackOp};
use crate::memory::cache::Cache;

/// Named datapath components, reported in the per-step active path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    PC,
    AC,
    SP,
    IR,
    TIR,
    MAR,
    MBR,
    ALU,
    Cache,
}

/// Micro-address space: one variant per micro-step, grouped by routine.
/// Every routine terminates by setting the MPC back to `Fetch0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MicroPc {
    #[default]
    Fetch0,
    Fetch1,
    Fetch2,
    Lodd0,
    Lodd1,
    Stod0,
    Stod1,
    Addd0,
    Addd1,
    Addd2,
    Subd0,
    Subd1,
    Subd2,
    Jpos,
    Jzer,
    Jump,
    Loco,
    Lodl0,
    Lodl1,
    Stol0,
    Stol1,
    Addl0,
    Addl1,
    Addl2,
    Subl0,
    Subl1,
    Subl2,
    Jneg,
    Jnze,
    Call0,
    Call1,
    Call2,
    Call3,
    /// Type-F entry point: reads the discriminator and branches
    StackDispatch,
    Push0,
    Push1,
    Pop0,
    Pop1,
    Retn0,
    Retn1,
    Pshi0,
    Pshi1,
    Pshi2,
    Pshi3,
    Popi0,
    Popi1,
    Popi2,
}

impl MicroPc {
    /// Numeric micro-address, matching the documented control-store
    /// layout (fetch at 0..2, LODD at 10, ... POPI ending at 107)
    pub fn address(self) -> u16 {
        match self {
            MicroPc::Fetch0 => 0,
            MicroPc::Fetch1 => 1,
            MicroPc::Fetch2 => 2,
            MicroPc::Lodd0 => 10,
            MicroPc::Lodd1 => 11,
            MicroPc::Stod0 => 15,
            MicroPc::Stod1 => 16,
            MicroPc::Addd0 => 20,
            MicroPc::Addd1 => 21,
            MicroPc::Addd2 => 22,
            MicroPc::Subd0 => 25,
            MicroPc::Subd1 => 26,
            MicroPc::Subd2 => 27,
            MicroPc::Jpos => 30,
            MicroPc::Jzer => 35,
            MicroPc::Jump => 40,
            MicroPc::Loco => 45,
            MicroPc::Lodl0 => 50,
            MicroPc::Lodl1 => 51,
            MicroPc::Stol0 => 55,
            MicroPc::Stol1 => 56,
            MicroPc::Addl0 => 60,
            MicroPc::Addl1 => 61,
            MicroPc::Addl2 => 62,
            MicroPc::Subl0 => 65,
            MicroPc::Subl1 => 66,
            MicroPc::Subl2 => 67,
            MicroPc::Jneg => 70,
            MicroPc::Jnze => 75,
            MicroPc::Call0 => 80,
            MicroPc::Call1 => 81,
            MicroPc::Call2 => 82,
            MicroPc::Call3 => 83,
            MicroPc::StackDispatch => 90,
            MicroPc::Push0 => 91,
            MicroPc::Push1 => 92,
            MicroPc::Pop0 => 94,
            MicroPc::Pop1 => 95,
            MicroPc::Retn0 => 97,
            MicroPc::Retn1 => 98,
            MicroPc::Pshi0 => 100,
            MicroPc::Pshi1 => 101,
            MicroPc::Pshi2 => 102,
            MicroPc::Pshi3 => 103,
            MicroPc::Popi0 => 105,
            MicroPc::Popi1 => 106,
            MicroPc::Popi2 => 107,
        }
    }
}

/// Maps the opcode nibble of IR to the entry micro-address of its
/// routine. Every nibble value is assigned; anything else restarts the
/// fetch cycle.
fn decode(ir: u16) -> MicroPc {
    match instruction::opcode_field(ir) {
        0x0 => MicroPc::Lodd0,
        0x1 => MicroPc::Stod0,
        0x2 => MicroPc::Addd0,
        0x3 => MicroPc::Subd0,
        0x4 => MicroPc::Jpos,
        0x5 => MicroPc::Jzer,
        0x6 => MicroPc::Jump,
        0x7 => MicroPc::Loco,
        0x8 => MicroPc::Lodl0,
        0x9 => MicroPc::Stol0,
        0xA => MicroPc::Addl0,
        0xB => MicroPc::Subl0,
        0xC => MicroPc::Jneg,
        0xD => MicroPc::Jnze,
        0xE => MicroPc::Call0,
        0xF => MicroPc::StackDispatch,
        _ => MicroPc::Fetch0,
    }
}

/// Signal snapshot produced by one micro-step.
/// Purely observational: reset at the start of every step, populated by
/// exactly that step, returned rather than stored.
#[derive(Clone, Debug, Default)]
pub struct StepTrace {
    pub read_mem: bool,
    pub write_mem: bool,
    pub alu_op: Option<ALUOp>,
    pub active_path: Vec<Component>,
    pub description: String,
}

/// Executes ONE micro-instruction step
pub fn micro_step(cpu: &mut CPUState, mem: &mut Cache) -> StepTrace {
    use Component::*;

    let mut trace = StepTrace::default();
    cpu.update_step_count(1);

    match cpu.mpc {
        // Fetch cycle
        MicroPc::Fetch0 => {
            cpu.mar.write(cpu.pc.read());
            trace.active_path = vec![PC, MAR];
            trace.description =
                format!("Fetch: MAR <- PC ({})", cpu.pc.read());
            cpu.mpc = MicroPc::Fetch1;
        }
        MicroPc::Fetch1 => {
            let old_pc = cpu.pc.read();
            cpu.pc.write(old_pc.wrapping_add(1));
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![PC, ALU, PC, Cache, MBR];
            trace.description = format!(
                "Fetch: PC incremented ({}->{}), MBR <- Mem[{}] ({})",
                old_pc,
                cpu.pc.read(),
                cpu.mar.read(),
                val
            );
            cpu.mpc = MicroPc::Fetch2;
        }
        MicroPc::Fetch2 => {
            cpu.ir.write(cpu.mbr.read());
            // Decode scratch: IR shifted so the opcode sits in the low bits
            cpu.tir.write(cpu.mbr.read() >> 12);
            trace.active_path = vec![MBR, IR, TIR];
            trace.description = format!(
                "Fetch: IR <- MBR ({}). Decoding...",
                cpu.mbr.read()
            );
            cpu.mpc = decode(cpu.ir.read());
        }

        // LODD
        MicroPc::Lodd0 => {
            let addr = instruction::operand_field(cpu.ir.read());
            cpu.mar.write(addr);
            trace.active_path = vec![IR, MAR];
            trace.description = format!("LODD: MAR <- address ({})", addr);
            cpu.mpc = MicroPc::Lodd1;
        }
        MicroPc::Lodd1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            cpu.ac.write(val);
            cpu.alu.update_flags(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR, AC];
            trace.description =
                format!("LODD: AC <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Fetch0;
        }

        // STOD
        MicroPc::Stod0 => {
            let addr = instruction::operand_field(cpu.ir.read());
            cpu.mar.write(addr);
            trace.active_path = vec![IR, MAR];
            trace.description = format!("STOD: MAR <- address ({})", addr);
            cpu.mpc = MicroPc::Stod1;
        }
        MicroPc::Stod1 => {
            cpu.mbr.write(cpu.ac.read());
            mem.write(cpu.mar.read(), cpu.mbr.read());
            trace.write_mem = true;
            trace.active_path = vec![AC, MBR, Cache];
            trace.description = format!(
                "STOD: Mem[{}] <- AC ({})",
                cpu.mar.read(),
                cpu.ac.read()
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // ADDD
        MicroPc::Addd0 => {
            let addr = instruction::operand_field(cpu.ir.read());
            cpu.mar.write(addr);
            trace.active_path = vec![IR, MAR];
            trace.description = format!("ADDD: MAR <- address ({})", addr);
            cpu.mpc = MicroPc::Addd1;
        }
        MicroPc::Addd1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("ADDD: MBR <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Addd2;
        }
        MicroPc::Addd2 => {
            let old_ac = cpu.ac.read();
            let res = cpu.alu.add(old_ac, cpu.mbr.read());
            cpu.ac.write(res);
            trace.alu_op = Some(ALUOp::ADD);
            trace.active_path = vec![AC, MBR, ALU, AC];
            trace.description = format!(
                "ADDD: AC <- {} + {} = {}",
                old_ac,
                cpu.mbr.read(),
                res
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // SUBD
        MicroPc::Subd0 => {
            let addr = instruction::operand_field(cpu.ir.read());
            cpu.mar.write(addr);
            trace.active_path = vec![IR, MAR];
            trace.description = format!("SUBD: MAR <- address ({})", addr);
            cpu.mpc = MicroPc::Subd1;
        }
        MicroPc::Subd1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("SUBD: MBR <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Subd2;
        }
        MicroPc::Subd2 => {
            let old_ac = cpu.ac.read();
            let res = cpu.alu.sub(old_ac, cpu.mbr.read());
            cpu.ac.write(res);
            trace.alu_op = Some(ALUOp::SUB);
            trace.active_path = vec![AC, MBR, ALU, AC];
            trace.description = format!(
                "SUBD: AC <- {} - {} = {}",
                old_ac,
                cpu.mbr.read(),
                res
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // Conditional and unconditional jumps. The flags come from the
        // ALU, not from the AC sign bit.
        MicroPc::Jpos => {
            let mut jumped = false;
            trace.active_path = vec![AC];
            if !cpu.alu.n_flag && !cpu.alu.z_flag {
                cpu.pc.write(instruction::operand_field(cpu.ir.read()));
                jumped = true;
                trace.active_path = vec![AC, IR, PC];
            }
            trace.description = format!(
                "JPOS: {} (N={}, Z={})",
                if jumped { "taken" } else { "not taken" },
                cpu.alu.n_flag,
                cpu.alu.z_flag
            );
            cpu.mpc = MicroPc::Fetch0;
        }
        MicroPc::Jzer => {
            let mut jumped = false;
            trace.active_path = vec![AC];
            if cpu.alu.z_flag {
                cpu.pc.write(instruction::operand_field(cpu.ir.read()));
                jumped = true;
                trace.active_path = vec![AC, IR, PC];
            }
            trace.description = format!(
                "JZER: {} (Z={})",
                if jumped { "taken" } else { "not taken" },
                cpu.alu.z_flag
            );
            cpu.mpc = MicroPc::Fetch0;
        }
        MicroPc::Jneg => {
            let mut jumped = false;
            trace.active_path = vec![AC];
            if cpu.alu.n_flag {
                cpu.pc.write(instruction::operand_field(cpu.ir.read()));
                jumped = true;
                trace.active_path = vec![AC, IR, PC];
            }
            trace.description = format!(
                "JNEG: {} (N={})",
                if jumped { "taken" } else { "not taken" },
                cpu.alu.n_flag
            );
            cpu.mpc = MicroPc::Fetch0;
        }
        MicroPc::Jnze => {
            let mut jumped = false;
            trace.active_path = vec![AC];
            if !cpu.alu.z_flag {
                cpu.pc.write(instruction::operand_field(cpu.ir.read()));
                jumped = true;
                trace.active_path = vec![AC, IR, PC];
            }
            trace.description = format!(
                "JNZE: {} (Z={})",
                if jumped { "taken" } else { "not taken" },
                cpu.alu.z_flag
            );
            cpu.mpc = MicroPc::Fetch0;
        }
        MicroPc::Jump => {
            let addr = instruction::operand_field(cpu.ir.read());
            cpu.pc.write(addr);
            trace.active_path = vec![IR, PC];
            trace.description = format!("JUMP: PC <- {}", addr);
            cpu.mpc = MicroPc::Fetch0;
        }

        // LOCO
        MicroPc::Loco => {
            let val = instruction::operand_field(cpu.ir.read());
            cpu.ac.write(val);
            cpu.alu.update_flags(val);
            trace.active_path = vec![IR, AC];
            trace.description = format!("LOCO: AC <- constant {}", val);
            cpu.mpc = MicroPc::Fetch0;
        }

        // LODL
        MicroPc::Lodl0 => {
            let offset = instruction::operand_field(cpu.ir.read());
            let addr = cpu.sp.read().wrapping_add(offset) & 0xFFF;
            cpu.mar.write(addr);
            trace.alu_op = Some(ALUOp::ADD);
            trace.active_path = vec![SP, IR, ALU, MAR];
            trace.description =
                format!("LODL: MAR <- SP + {} ({})", offset, addr);
            cpu.mpc = MicroPc::Lodl1;
        }
        MicroPc::Lodl1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            cpu.ac.write(val);
            cpu.alu.update_flags(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR, AC];
            trace.description =
                format!("LODL: AC <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Fetch0;
        }

        // STOL
        MicroPc::Stol0 => {
            let offset = instruction::operand_field(cpu.ir.read());
            let addr = cpu.sp.read().wrapping_add(offset) & 0xFFF;
            cpu.mar.write(addr);
            trace.alu_op = Some(ALUOp::ADD);
            trace.active_path = vec![SP, IR, ALU, MAR];
            trace.description =
                format!("STOL: MAR <- SP + {} ({})", offset, addr);
            cpu.mpc = MicroPc::Stol1;
        }
        MicroPc::Stol1 => {
            cpu.mbr.write(cpu.ac.read());
            mem.write(cpu.mar.read(), cpu.mbr.read());
            trace.write_mem = true;
            trace.active_path = vec![AC, MBR, Cache];
            trace.description = format!(
                "STOL: Mem[{}] <- AC ({})",
                cpu.mar.read(),
                cpu.ac.read()
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // ADDL
        MicroPc::Addl0 => {
            let offset = instruction::operand_field(cpu.ir.read());
            let addr = cpu.sp.read().wrapping_add(offset) & 0xFFF;
            cpu.mar.write(addr);
            trace.alu_op = Some(ALUOp::ADD);
            trace.active_path = vec![SP, IR, ALU, MAR];
            trace.description =
                format!("ADDL: MAR <- SP + {} ({})", offset, addr);
            cpu.mpc = MicroPc::Addl1;
        }
        MicroPc::Addl1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("ADDL: MBR <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Addl2;
        }
        MicroPc::Addl2 => {
            let old_ac = cpu.ac.read();
            let res = cpu.alu.add(old_ac, cpu.mbr.read());
            cpu.ac.write(res);
            trace.alu_op = Some(ALUOp::ADD);
            trace.active_path = vec![AC, MBR, ALU, AC];
            trace.description = format!(
                "ADDL: AC <- {} + {} = {}",
                old_ac,
                cpu.mbr.read(),
                res
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // SUBL
        MicroPc::Subl0 => {
            let offset = instruction::operand_field(cpu.ir.read());
            let addr = cpu.sp.read().wrapping_add(offset) & 0xFFF;
            cpu.mar.write(addr);
            trace.alu_op = Some(ALUOp::ADD);
            trace.active_path = vec![SP, IR, ALU, MAR];
            trace.description =
                format!("SUBL: MAR <- SP + {} ({})", offset, addr);
            cpu.mpc = MicroPc::Subl1;
        }
        MicroPc::Subl1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("SUBL: MBR <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Subl2;
        }
        MicroPc::Subl2 => {
            let old_ac = cpu.ac.read();
            let res = cpu.alu.sub(old_ac, cpu.mbr.read());
            cpu.ac.write(res);
            trace.alu_op = Some(ALUOp::SUB);
            trace.active_path = vec![AC, MBR, ALU, AC];
            trace.description = format!(
                "SUBL: AC <- {} - {} = {}",
                old_ac,
                cpu.mbr.read(),
                res
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // CALL
        MicroPc::Call0 => {
            cpu.sp.write(cpu.sp.read().wrapping_sub(1));
            trace.active_path = vec![SP];
            trace.description =
                format!("CALL: SP decremented ({})", cpu.sp.read());
            cpu.mpc = MicroPc::Call1;
        }
        MicroPc::Call1 => {
            cpu.mar.write(cpu.sp.read());
            cpu.mbr.write(cpu.pc.read());
            trace.active_path = vec![SP, MAR, PC, MBR];
            trace.description = format!(
                "CALL: MAR <- SP, MBR <- PC ({})",
                cpu.pc.read()
            );
            cpu.mpc = MicroPc::Call2;
        }
        MicroPc::Call2 => {
            mem.write(cpu.mar.read(), cpu.mbr.read());
            trace.write_mem = true;
            trace.active_path = vec![MBR, Cache];
            trace.description = format!(
                "CALL: return address saved (Mem[{}])",
                cpu.mar.read()
            );
            cpu.mpc = MicroPc::Call3;
        }
        MicroPc::Call3 => {
            let addr = instruction::operand_field(cpu.ir.read());
            cpu.pc.write(addr);
            trace.active_path = vec![IR, PC];
            trace.description =
                format!("CALL: PC <- subroutine address ({})", addr);
            cpu.mpc = MicroPc::Fetch0;
        }

        // Type F: discriminator in the top nibble of the operand field,
        // 8-bit immediate below it (used by INSP/DESP only)
        MicroPc::StackDispatch => {
            let ir = cpu.ir.read();
            let sub = instruction::stack_discriminator(ir);
            let amount = instruction::stack_immediate(ir);

            match StackOp::from_discriminator(sub) {
                Some(StackOp::Pshi) => {
                    cpu.sp.write(cpu.sp.read().wrapping_sub(1));
                    trace.active_path = vec![SP];
                    trace.description = "PSHI: SP decremented".to_string();
                    cpu.mpc = MicroPc::Pshi0;
                }
                Some(StackOp::Popi) => {
                    cpu.mar.write(cpu.sp.read());
                    trace.active_path = vec![SP, MAR];
                    trace.description = "POPI: MAR <- SP".to_string();
                    cpu.mpc = MicroPc::Popi0;
                }
                Some(StackOp::Push) => {
                    cpu.sp.write(cpu.sp.read().wrapping_sub(1));
                    trace.active_path = vec![SP];
                    trace.description = "PUSH: SP decremented".to_string();
                    cpu.mpc = MicroPc::Push0;
                }
                Some(StackOp::Pop) => {
                    cpu.mar.write(cpu.sp.read());
                    trace.active_path = vec![SP, MAR];
                    trace.description = "POP: MAR <- SP".to_string();
                    cpu.mpc = MicroPc::Pop0;
                }
                Some(StackOp::Retn) => {
                    cpu.mar.write(cpu.sp.read());
                    trace.active_path = vec![SP, MAR];
                    trace.description = "RETN: MAR <- SP".to_string();
                    cpu.mpc = MicroPc::Retn0;
                }
                Some(StackOp::Swap) => {
                    let tmp = cpu.ac.read();
                    cpu.ac.write(cpu.sp.read());
                    cpu.sp.write(tmp);
                    trace.active_path = vec![AC, SP];
                    trace.description = "SWAP: AC and SP exchanged".to_string();
                    cpu.mpc = MicroPc::Fetch0;
                }
                Some(StackOp::Insp) => {
                    cpu.sp.write(cpu.sp.read().wrapping_add(amount));
                    trace.active_path = vec![SP, IR, ALU, SP];
                    trace.description =
                        format!("INSP: SP <- SP + {}", amount);
                    cpu.mpc = MicroPc::Fetch0;
                }
                Some(StackOp::Desp) => {
                    cpu.sp.write(cpu.sp.read().wrapping_sub(amount));
                    trace.active_path = vec![SP, IR, ALU, SP];
                    trace.description =
                        format!("DESP: SP <- SP - {}", amount);
                    cpu.mpc = MicroPc::Fetch0;
                }
                None => {
                    trace.description = format!(
                        "Unknown Type-F instruction (discriminator {:X})",
                        sub
                    );
                    cpu.mpc = MicroPc::Fetch0;
                }
            }
        }

        // PUSH
        MicroPc::Push0 => {
            cpu.mar.write(cpu.sp.read());
            cpu.mbr.write(cpu.ac.read());
            trace.active_path = vec![SP, MAR, AC, MBR];
            trace.description = "PUSH: MAR <- SP, MBR <- AC".to_string();
            cpu.mpc = MicroPc::Push1;
        }
        MicroPc::Push1 => {
            mem.write(cpu.mar.read(), cpu.mbr.read());
            trace.write_mem = true;
            trace.description = format!(
                "PUSH: Mem[{}] <- AC ({})",
                cpu.mar.read(),
                cpu.ac.read()
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // POP
        MicroPc::Pop0 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("POP: MBR <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Pop1;
        }
        MicroPc::Pop1 => {
            cpu.ac.write(cpu.mbr.read());
            cpu.sp.write(cpu.sp.read().wrapping_add(1));
            trace.active_path = vec![MBR, AC, SP];
            trace.description =
                "POP: AC <- MBR, SP incremented".to_string();
            cpu.mpc = MicroPc::Fetch0;
        }

        // RETN
        MicroPc::Retn0 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("RETN: MBR <- Mem[{}] ({})", cpu.mar.read(), val);
            cpu.mpc = MicroPc::Retn1;
        }
        MicroPc::Retn1 => {
            cpu.pc.write(cpu.mbr.read());
            cpu.sp.write(cpu.sp.read().wrapping_add(1));
            trace.active_path = vec![MBR, PC, SP];
            trace.description = format!(
                "RETN: PC <- MBR ({}), SP incremented",
                cpu.mbr.read()
            );
            cpu.mpc = MicroPc::Fetch0;
        }

        // PSHI: push Mem[AC] onto the stack (SP already decremented)
        MicroPc::Pshi0 => {
            cpu.mar.write(cpu.ac.read());
            trace.active_path = vec![AC, MAR];
            trace.description = "PSHI: MAR <- AC".to_string();
            cpu.mpc = MicroPc::Pshi1;
        }
        MicroPc::Pshi1 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("PSHI: MBR <- Mem[AC] ({})", val);
            cpu.mpc = MicroPc::Pshi2;
        }
        MicroPc::Pshi2 => {
            cpu.mar.write(cpu.sp.read());
            trace.active_path = vec![SP, MAR];
            trace.description = "PSHI: MAR <- SP".to_string();
            cpu.mpc = MicroPc::Pshi3;
        }
        MicroPc::Pshi3 => {
            mem.write(cpu.mar.read(), cpu.mbr.read());
            trace.write_mem = true;
            trace.active_path = vec![MBR, Cache];
            trace.description =
                format!("PSHI: Mem[SP] <- MBR ({})", cpu.mbr.read());
            cpu.mpc = MicroPc::Fetch0;
        }

        // POPI: pop the top of stack into Mem[AC] (MAR holds SP)
        MicroPc::Popi0 => {
            let val = mem.read(cpu.mar.read());
            cpu.mbr.write(val);
            trace.read_mem = true;
            trace.active_path = vec![Cache, MBR];
            trace.description =
                format!("POPI: MBR <- Mem[SP] ({})", val);
            cpu.mpc = MicroPc::Popi1;
        }
        MicroPc::Popi1 => {
            cpu.mar.write(cpu.ac.read());
            trace.active_path = vec![AC, MAR];
            trace.description = "POPI: MAR <- AC".to_string();
            cpu.mpc = MicroPc::Popi2;
        }
        MicroPc::Popi2 => {
            mem.write(cpu.mar.read(), cpu.mbr.read());
            cpu.sp.write(cpu.sp.read().wrapping_add(1));
            trace.write_mem = true;
            trace.active_path = vec![MBR, Cache, SP];
            trace.description = format!(
                "POPI: Mem[AC] <- MBR ({}), SP incremented",
                cpu.mbr.read()
            );
            cpu.mpc = MicroPc::Fetch0;
        }
    }

    if cpu.mpc == MicroPc::Fetch0 {
        // A routine just terminated: one macro instruction completed
        cpu.update_inst_count(1);
    }

    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPUPolicy;
    use crate::memory::Memory;

    fn machine_with(words: &[u16]) -> (CPUState, Cache) {
        let mut mem = Memory::make();
        for (addr, word) in words.iter().enumerate() {
            mem.write(addr as u16, *word);
        }
        (CPUState::make(CPUPolicy::default()), Cache::make(mem))
    }

    /// Steps until the MPC returns to Fetch0
    fn run_instruction(cpu: &mut CPUState, mem: &mut Cache) -> StepTrace {
        loop {
            let trace = micro_step(cpu, mem);
            if cpu.mpc == MicroPc::Fetch0 {
                return trace;
            }
        }
    }

    #[test]
    fn test_fetch_sequence() {
        let (mut cpu, mut mem) = machine_with(&[0x7005]); // LOCO 5
        let trace = micro_step(&mut cpu, &mut mem);
        assert_eq!(cpu.mar.read(), 0);
        assert_eq!(cpu.mpc, MicroPc::Fetch1);
        assert_eq!(trace.active_path, vec![Component::PC, Component::MAR]);

        let trace = micro_step(&mut cpu, &mut mem);
        assert_eq!(cpu.pc.read(), 1);
        assert_eq!(cpu.mbr.read(), 0x7005);
        assert!(trace.read_mem);
        assert_eq!(cpu.mpc, MicroPc::Fetch2);

        let _ = micro_step(&mut cpu, &mut mem);
        assert_eq!(cpu.ir.read(), 0x7005);
        assert_eq!(cpu.mpc, MicroPc::Loco);
    }

    #[test]
    fn test_loco_sets_ac_and_flags() {
        let (mut cpu, mut mem) = machine_with(&[0x7000]); // LOCO 0
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.ac.read(), 0);
        assert!(cpu.alu.z_flag);
        assert_eq!(cpu.history.inst_count, 1);
    }

    #[test]
    fn test_mpc_addresses() {
        assert_eq!(MicroPc::Fetch0.address(), 0);
        assert_eq!(MicroPc::Lodd0.address(), 10);
        assert_eq!(MicroPc::StackDispatch.address(), 90);
        assert_eq!(MicroPc::Popi2.address(), 107);
    }

    #[test]
    fn test_decode_covers_all_opcodes() {
        assert_eq!(decode(0x0000), MicroPc::Lodd0);
        assert_eq!(decode(0xE000), MicroPc::Call0);
        assert_eq!(decode(0xF400), MicroPc::StackDispatch);
    }

    #[test]
    fn test_unknown_stack_discriminator_restarts_fetch() {
        // Discriminator 0x1 is unassigned
        let (mut cpu, mut mem) = machine_with(&[0xF100]);
        let trace = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.mpc, MicroPc::Fetch0);
        assert!(trace.description.contains("Unknown Type-F"));
        // The instruction was still consumed
        assert_eq!(cpu.pc.read(), 1);
        assert_eq!(cpu.history.inst_count, 1);
    }

    #[test]
    fn test_conditional_jumps_use_alu_flags() {
        // LOCO 1; JPOS 5
        let (mut cpu, mut mem) = machine_with(&[0x7001, 0x4005]);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.pc.read(), 5);

        // LOCO 0; JPOS 5 must fall through (zero is not positive)
        let (mut cpu, mut mem) = machine_with(&[0x7000, 0x4005]);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.pc.read(), 2);

        // LOCO 0; JZER 7
        let (mut cpu, mut mem) = machine_with(&[0x7000, 0x5007]);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.pc.read(), 7);
    }

    #[test]
    fn test_jneg_on_subtraction_result() {
        // LOCO 3; SUBD 4; JNEG 9; word at 4 is data (5)
        let (mut cpu, mut mem) =
            machine_with(&[0x7003, 0x3004, 0xC009, 0x6000, 0x0005]);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.ac.read(), 0xFFFE); // 3 - 5
        assert!(cpu.alu.n_flag);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.pc.read(), 9);
    }

    #[test]
    fn test_swap_exchanges_ac_and_sp() {
        // LOCO 200; SWAP
        let (mut cpu, mut mem) = machine_with(&[0x70C8, 0xFA00]);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.sp.read(), 200);
        assert_eq!(cpu.ac.read(), 0);
    }

    #[test]
    fn test_insp_desp_amounts() {
        // INSP 5; DESP 2
        let (mut cpu, mut mem) = machine_with(&[0xFC05, 0xFE02]);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.sp.read(), 5);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.sp.read(), 3);
    }

    #[test]
    fn test_lodl_addresses_relative_to_sp() {
        // LOCO 100; SWAP; LODL 2; data at 102
        let (mut cpu, mut mem) =
            machine_with(&[0x7064, 0xFA00, 0x8002]);
        mem.memory.write(102, 77);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        let _ = run_instruction(&mut cpu, &mut mem);
        assert_eq!(cpu.ac.read(), 77);
    }

    #[test]
    fn test_pshi_pushes_indirect() {
        // LOCO 100; SWAP (SP=100); LOCO 50; PSHI; Mem[50]=42
        let (mut cpu, mut mem) =
            machine_with(&[0x7064, 0xFA00, 0x7032, 0xF000]);
        mem.memory.write(50, 42);
        for _ in 0..4 {
            let _ = run_instruction(&mut cpu, &mut mem);
        }
        assert_eq!(cpu.sp.read(), 99);
        assert_eq!(mem.memory.read(99), 42);
    }

    #[test]
    fn test_popi_stores_indirect() {
        // LOCO 100; SWAP; LOCO 7; PUSH; LOCO 60; POPI -> Mem[60]=7
        let (mut cpu, mut mem) = machine_with(&[
            0x7064, 0xFA00, 0x7007, 0xF400, 0x703C, 0xF200,
        ]);
        for _ in 0..6 {
            let _ = run_instruction(&mut cpu, &mut mem);
        }
        assert_eq!(mem.memory.read(60), 7);
        assert_eq!(cpu.sp.read(), 100);
    }
}
