//! MIPS32 core: 32 GPRs with `$zero` hard-wired, no branch delay slots.

/// Opcode tables, field extraction, and canonical text.
pub mod decode;

pub use decode::{register_index, register_name, MipsInstruction, MipsOp, OperandShape};

use crate::api::{NamedRegister, RegisterSnapshot};
use crate::machine::{ByteSource, Decoded, ExecContext, ExecuteOutcome, Isa, Machine};
use crate::{Architecture, FaultCode, ProgramCounter, RegisterFile, StepFault};

use decode::{A0, RA, SP, V0};

/// MIPS register file.
pub type MipsRegisters = RegisterFile<32>;

/// MIPS32 instruction set.
#[derive(Debug, Clone, Copy)]
pub struct Mips32;

/// Fetch-decode-execute core for MIPS32.
pub type MipsCore = Machine<Mips32>;

fn write(regs: &mut MipsRegisters, index: u8, value: u32) {
    if index != 0 {
        regs.set_gpr(usize::from(index), value);
    }
}

fn read(regs: &MipsRegisters, index: u8) -> u32 {
    regs.gpr(usize::from(index))
}

const fn branch_target(next_pc: u32, offset: i32) -> u32 {
    next_pc.wrapping_add_signed(offset << 2)
}

impl Isa for Mips32 {
    const ARCH: Architecture = Architecture::Mips32;
    type Registers = MipsRegisters;
    type Instruction = MipsInstruction;

    fn decode(source: &mut dyn ByteSource) -> Result<Decoded<MipsInstruction>, StepFault> {
        let instruction = MipsInstruction::decode(source.word()?)?;
        Ok(Decoded {
            instruction,
            len: 4,
        })
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    fn execute(
        ins: &MipsInstruction,
        cx: &mut ExecContext<'_, MipsRegisters>,
    ) -> Result<ExecuteOutcome, StepFault> {
        let rs = read(cx.regs, ins.rs);
        let rt = read(cx.regs, ins.rt);
        let simm = ins.simm();
        let zimm = u32::from(ins.imm);
        let addr = rs.wrapping_add_signed(simm);

        let (dest, value) = match ins.op {
            MipsOp::Sll => (ins.rd, rt << ins.shamt),
            MipsOp::Srl => (ins.rd, rt >> ins.shamt),
            MipsOp::Sra => (ins.rd, ((rt as i32) >> ins.shamt) as u32),
            MipsOp::Sllv => (ins.rd, rt << (rs & 0x1F)),
            MipsOp::Srlv => (ins.rd, rt >> (rs & 0x1F)),
            MipsOp::Srav => (ins.rd, ((rt as i32) >> (rs & 0x1F)) as u32),
            MipsOp::Add | MipsOp::Addu => (ins.rd, rs.wrapping_add(rt)),
            MipsOp::Sub | MipsOp::Subu => (ins.rd, rs.wrapping_sub(rt)),
            MipsOp::And => (ins.rd, rs & rt),
            MipsOp::Or => (ins.rd, rs | rt),
            MipsOp::Xor => (ins.rd, rs ^ rt),
            MipsOp::Nor => (ins.rd, !(rs | rt)),
            MipsOp::Slt => (ins.rd, u32::from((rs as i32) < (rt as i32))),
            MipsOp::Sltu => (ins.rd, u32::from(rs < rt)),
            MipsOp::Addi | MipsOp::Addiu => (ins.rt, rs.wrapping_add_signed(simm)),
            MipsOp::Slti => (ins.rt, u32::from((rs as i32) < simm)),
            MipsOp::Sltiu => (ins.rt, u32::from(rs < simm as u32)),
            MipsOp::Andi => (ins.rt, rs & zimm),
            MipsOp::Ori => (ins.rt, rs | zimm),
            MipsOp::Xori => (ins.rt, rs ^ zimm),
            MipsOp::Lui => (ins.rt, zimm << 16),
            MipsOp::Lb => (ins.rt, cx.bus.read_byte(addr) as i8 as u32),
            MipsOp::Lbu => (ins.rt, u32::from(cx.bus.read_byte(addr))),
            MipsOp::Lw => (ins.rt, cx.bus.read_word(addr)),
            MipsOp::Sb => {
                cx.bus.write_byte(addr, rt.to_le_bytes()[0]);
                return Ok(ExecuteOutcome::Next);
            }
            MipsOp::Sw => {
                cx.bus.write_word(addr, rt);
                return Ok(ExecuteOutcome::Next);
            }
            MipsOp::Beq => {
                return Ok(if rs == rt {
                    ExecuteOutcome::Jump(branch_target(cx.next_pc, simm))
                } else {
                    ExecuteOutcome::Next
                });
            }
            MipsOp::Bne => {
                return Ok(if rs == rt {
                    ExecuteOutcome::Next
                } else {
                    ExecuteOutcome::Jump(branch_target(cx.next_pc, simm))
                });
            }
            MipsOp::J | MipsOp::Jal => {
                if ins.op == MipsOp::Jal {
                    write(cx.regs, RA, cx.next_pc);
                }
                let target = (cx.next_pc & 0xF000_0000) | (ins.target << 2);
                return Ok(ExecuteOutcome::Jump(target));
            }
            MipsOp::Jr => return Ok(ExecuteOutcome::Jump(rs)),
            MipsOp::Jalr => {
                write(cx.regs, ins.rd, cx.next_pc);
                return Ok(ExecuteOutcome::Jump(rs));
            }
            MipsOp::Syscall => {
                let number = read(cx.regs, V0);
                let arg = read(cx.regs, A0);
                return cx.service(number, arg);
            }
            MipsOp::Break => {
                return Err(StepFault::new(
                    FaultCode::Breakpoint,
                    (ins.encode() >> 6) & 0x000F_FFFF,
                ));
            }
        };
        write(cx.regs, dest, value);
        Ok(ExecuteOutcome::Next)
    }

    fn reset(regs: &mut MipsRegisters, entry: u32, stack_top: u32) {
        regs.set_pc(entry);
        write(regs, SP, stack_top);
    }

    fn snapshot(regs: &MipsRegisters) -> RegisterSnapshot {
        RegisterSnapshot {
            architecture: Self::ARCH,
            pc: regs.pc(),
            general: (0u8..32)
                .map(|index| NamedRegister::new(register_name(index), read(regs, index)))
                .collect(),
            special: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MipsCore, MipsInstruction, MipsOp};
    use crate::api::{Core, StepOutcome, StopHandle};
    use crate::memory::RAM_BASE;
    use crate::{FaultCode, HaltReason, Notification};

    fn program(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    fn loaded(words: &[u32]) -> MipsCore {
        let mut core = MipsCore::default();
        core.load(&program(words), None).expect("valid image");
        core
    }

    #[test]
    fn zero_register_ignores_writes() {
        let mut core = loaded(&[0x2000_0007]);
        core.step();
        assert_eq!(core.registers().get("$zero"), Some(0));
    }

    #[test]
    fn stack_pointer_starts_at_top_of_ram() {
        let core = loaded(&[0]);
        let ram_end = core.memory().ram_end();
        assert_eq!(core.registers().get("$sp"), Some(ram_end));
    }

    #[test]
    fn store_then_load_round_trips_through_ram() {
        let mut core = loaded(&[
            0x3C08_8000, // lui $t0, 0x8000
            0x2009_FFFF, // addi $t1, $zero, -1
            0xAD09_0010, // sw $t1, 16($t0)
            0x810A_0010, // lb $t2, 16($t0)
            0x910B_0010, // lbu $t3, 16($t0)
        ]);
        for _ in 0..5 {
            assert!(matches!(core.step(), StepOutcome::Retired { .. }));
        }
        let regs = core.registers();
        assert_eq!(regs.get("$t2"), Some(0xFFFF_FFFF));
        assert_eq!(regs.get("$t3"), Some(0xFF));
        assert_eq!(core.memory().peek_word(RAM_BASE + 16), 0xFFFF_FFFF);
    }

    #[test]
    fn jal_links_and_jr_returns() {
        let mut core = loaded(&[
            0x0C00_0003, // jal 0x0c
            0x2002_000A, // addi $v0, $zero, 10
            0x0000_000C, // syscall
            0x03E0_0008, // jr $ra
        ]);
        core.step();
        assert_eq!(core.program_counter(), 0x0C);
        assert_eq!(core.registers().get("$ra"), Some(4));
        core.step();
        assert_eq!(core.program_counter(), 4);
        let outcome = core.run(&StopHandle::new()).expect("loaded");
        assert_eq!(outcome.halt, HaltReason::Exit);
    }

    #[test]
    fn shifts_and_set_less_than() {
        let mut core = loaded(&[
            0x2008_FFF0, // addi $t0, $zero, -16
            0x0008_4883, // sra $t1, $t0, 2
            0x0008_5082, // srl $t2, $t0, 2
            0x0100_582A, // slt $t3, $t0, $zero
            0x0100_602B, // sltu $t4, $t0, $zero
        ]);
        for _ in 0..5 {
            core.step();
        }
        let regs = core.registers();
        assert_eq!(regs.get("$t1"), Some(0xFFFF_FFFC));
        assert_eq!(regs.get("$t2"), Some(0x3FFF_FFFC));
        assert_eq!(regs.get("$t3"), Some(1));
        assert_eq!(regs.get("$t4"), Some(0));
    }

    #[test]
    fn print_string_syscall_reads_from_ram() {
        let mut core = loaded(&[
            0x3C04_8000, // lui $a0, 0x8000
            0x2008_0048, // addi $t0, $zero, 'H'
            0xA088_0000, // sb $t0, 0($a0)
            0x2002_0004, // addi $v0, $zero, 4
            0x0000_000C, // syscall
        ]);
        let (channel, receiver) = crate::ChannelSink::pair();
        core.set_sink(Box::new(channel));
        for _ in 0..5 {
            core.step();
        }
        assert_eq!(
            receiver.try_recv(),
            Ok(Notification::ConsoleText("H".to_string()))
        );
        assert_eq!(core.diagnostics().bus_faults(), 0);
    }

    #[test]
    fn break_halts_with_breakpoint_fault() {
        let mut core = loaded(&[0x0000_000D]);
        let StepOutcome::Halted(HaltReason::Fault(record)) = core.step() else {
            panic!("break must halt");
        };
        assert_eq!(record.code, FaultCode::Breakpoint);
    }

    #[test]
    fn unknown_syscall_halts_with_service_fault() {
        let mut core = loaded(&[0x2002_0063, 0x0000_000C]);
        core.step();
        let StepOutcome::Halted(HaltReason::Fault(record)) = core.step() else {
            panic!("syscall 99 must halt");
        };
        assert_eq!(record.code, FaultCode::UnsupportedSyscall);
        assert_eq!(record.pc, 4);
        assert_eq!(record.detail, 99);
        assert_eq!(core.diagnostics().service_faults, 1);
    }

    #[test]
    fn supplied_instruction_executes_on_idle_core() {
        let mut core = MipsCore::default();
        let bytes = MipsInstruction::imm(MipsOp::Addiu, 9, 0, 7).encode().to_le_bytes();
        assert!(matches!(
            core.execute_instruction(&bytes),
            Ok(StepOutcome::Retired { pc: 0, len: 4, .. })
        ));
        assert_eq!(core.registers().get("$t1"), Some(7));
    }
}
