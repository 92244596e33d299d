//! 32-bit x86 subset: register-direct ALU and move forms, immediate loads,
//! `nop`, `hlt`, and `int 0x80`.
//!
//! This is a byte-stream decoder over a handful of single-byte opcodes, not
//! a general x86 decoder. Memory operands (`ModRM.mod != 11`) are rejected.

use std::fmt;

use crate::api::{NamedRegister, RegisterSnapshot};
use crate::machine::{ByteSource, Decoded, ExecContext, ExecuteOutcome, Isa, Machine};
use crate::{Architecture, FaultCode, ProgramCounter, RegisterFile, StepFault};

/// EFLAGS carry.
pub const EFLAGS_CF: u32 = 1 << 0;
/// EFLAGS zero.
pub const EFLAGS_ZF: u32 = 1 << 6;
/// EFLAGS sign.
pub const EFLAGS_SF: u32 = 1 << 7;
/// EFLAGS overflow.
pub const EFLAGS_OF: u32 = 1 << 11;
/// EFLAGS after reset (reserved bit 1 set).
pub const EFLAGS_RESET: u32 = 1 << 1;

/// Interrupt vector routed to the console services.
pub const SERVICE_VECTOR: u8 = 0x80;

/// 32-bit general registers in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Reg32 {
    Eax,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
}

impl Reg32 {
    /// All registers in encoding order.
    pub const ALL: [Self; 8] = [
        Self::Eax,
        Self::Ecx,
        Self::Edx,
        Self::Ebx,
        Self::Esp,
        Self::Ebp,
        Self::Esi,
        Self::Edi,
    ];

    /// Decodes a 3-bit register field.
    #[must_use]
    pub const fn from_u3(bits: u8) -> Self {
        Self::ALL[(bits & 7) as usize]
    }

    /// 3-bit encoding.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Assembler name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eax => "eax",
            Self::Ecx => "ecx",
            Self::Edx => "edx",
            Self::Ebx => "ebx",
            Self::Esp => "esp",
            Self::Ebp => "ebp",
            Self::Esi => "esi",
            Self::Edi => "edi",
        }
    }

    /// Parses an assembler name (case-insensitive, optional `%` prefix).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let bare = name.strip_prefix('%').unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(bare))
    }
}

impl fmt::Display for Reg32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Two-operand ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl AluOp {
    /// Assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }

    /// Opcode of the `r/m32, r32` form.
    #[must_use]
    pub const fn register_opcode(self) -> u8 {
        match self {
            Self::Add => 0x01,
            Self::Or => 0x09,
            Self::And => 0x21,
            Self::Sub => 0x29,
            Self::Xor => 0x31,
        }
    }

    /// `/digit` extension of the `81 r/m32, imm32` group.
    #[must_use]
    pub const fn group_digit(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Or => 1,
            Self::And => 4,
            Self::Sub => 5,
            Self::Xor => 6,
        }
    }
}

/// Register-direct ALU opcodes (`op r/m32, r32`).
pub const REGISTER_FORM_TABLE: &[(u8, AluOp)] = &[
    (0x01, AluOp::Add),
    (0x09, AluOp::Or),
    (0x21, AluOp::And),
    (0x29, AluOp::Sub),
    (0x31, AluOp::Xor),
];

/// `81 /digit` group members in the subset.
pub const GROUP1_TABLE: &[(u8, AluOp)] = &[
    (0, AluOp::Add),
    (1, AluOp::Or),
    (4, AluOp::And),
    (5, AluOp::Sub),
    (6, AluOp::Xor),
];

/// Source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Register.
    Reg(Reg32),
    /// 32-bit immediate.
    Imm(u32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => reg.fmt(f),
            Self::Imm(value) => write!(f, "{value:#x}"),
        }
    }
}

/// Decoded x86 subset instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X86Instruction {
    /// `op dst, src`.
    Alu {
        /// Operation.
        op: AluOp,
        /// Destination register.
        dst: Reg32,
        /// Source operand.
        src: Operand,
    },
    /// `mov dst, src`.
    Mov {
        /// Destination register.
        dst: Reg32,
        /// Source operand.
        src: Operand,
    },
    /// `nop`.
    Nop,
    /// `hlt`; treated as program exit.
    Hlt,
    /// `int vector`.
    Int {
        /// Interrupt vector.
        vector: u8,
    },
}

fn modrm_register_direct(source: &mut dyn ByteSource) -> Result<(u8, Reg32), StepFault> {
    let modrm = source.byte()?;
    if modrm >> 6 != 0b11 {
        return Err(StepFault::function(u32::from(modrm)));
    }
    Ok(((modrm >> 3) & 7, Reg32::from_u3(modrm)))
}

impl X86Instruction {
    /// Decodes one instruction from a byte stream, returning it with its length.
    ///
    /// # Errors
    ///
    /// Faults on opcodes outside the subset, memory-form ModRM bytes, and
    /// truncated encodings.
    pub fn decode(source: &mut dyn ByteSource) -> Result<Decoded<Self>, StepFault> {
        let opcode = source.byte()?;
        let (instruction, len) = match opcode {
            0x90 => (Self::Nop, 1),
            0xF4 => (Self::Hlt, 1),
            0xCD => (
                Self::Int {
                    vector: source.byte()?,
                },
                2,
            ),
            0xB8..=0xBF => (
                Self::Mov {
                    dst: Reg32::from_u3(opcode),
                    src: Operand::Imm(source.word()?),
                },
                5,
            ),
            0x89 => {
                let (reg, rm) = modrm_register_direct(source)?;
                (
                    Self::Mov {
                        dst: rm,
                        src: Operand::Reg(Reg32::from_u3(reg)),
                    },
                    2,
                )
            }
            0x81 => {
                let (digit, rm) = modrm_register_direct(source)?;
                let op = GROUP1_TABLE
                    .iter()
                    .find_map(|(candidate, op)| (*candidate == digit).then_some(*op))
                    .ok_or(StepFault::function(u32::from(digit)))?;
                (
                    Self::Alu {
                        op,
                        dst: rm,
                        src: Operand::Imm(source.word()?),
                    },
                    6,
                )
            }
            _ => {
                let op = REGISTER_FORM_TABLE
                    .iter()
                    .find_map(|(candidate, op)| (*candidate == opcode).then_some(*op))
                    .ok_or(StepFault::opcode(u32::from(opcode)))?;
                let (reg, rm) = modrm_register_direct(source)?;
                (
                    Self::Alu {
                        op,
                        dst: rm,
                        src: Operand::Reg(Reg32::from_u3(reg)),
                    },
                    2,
                )
            }
        };
        Ok(Decoded { instruction, len })
    }

    /// Encodes back into the canonical byte form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        const fn modrm(reg: u8, rm: Reg32) -> u8 {
            0xC0 | (reg << 3) | rm.index()
        }
        match *self {
            Self::Nop => vec![0x90],
            Self::Hlt => vec![0xF4],
            Self::Int { vector } => vec![0xCD, vector],
            Self::Mov {
                dst,
                src: Operand::Imm(value),
            } => {
                let mut bytes = vec![0xB8 + dst.index()];
                bytes.extend_from_slice(&value.to_le_bytes());
                bytes
            }
            Self::Mov {
                dst,
                src: Operand::Reg(src),
            } => vec![0x89, modrm(src.index(), dst)],
            Self::Alu {
                op,
                dst,
                src: Operand::Reg(src),
            } => vec![op.register_opcode(), modrm(src.index(), dst)],
            Self::Alu {
                op,
                dst,
                src: Operand::Imm(value),
            } => {
                let mut bytes = vec![0x81, modrm(op.group_digit(), dst)];
                bytes.extend_from_slice(&value.to_le_bytes());
                bytes
            }
        }
    }
}

impl fmt::Display for X86Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alu { op, dst, src } => write!(f, "{} {dst}, {src}", op.mnemonic()),
            Self::Mov { dst, src } => write!(f, "mov {dst}, {src}"),
            Self::Nop => f.write_str("nop"),
            Self::Hlt => f.write_str("hlt"),
            Self::Int { vector } => write!(f, "int {vector:#x}"),
        }
    }
}

/// x86 register file; the status word is EFLAGS.
pub type X86Registers = RegisterFile<8>;

/// 32-bit x86 subset instruction set.
#[derive(Debug, Clone, Copy)]
pub struct X86;

/// Fetch-decode-execute core for the x86 subset.
pub type X86Core = Machine<X86>;

fn reg(regs: &X86Registers, reg: Reg32) -> u32 {
    regs.gpr(usize::from(reg.index()))
}

fn set_result_flags(regs: &mut X86Registers, result: u32, carry: bool, overflow: bool) {
    regs.set_status_bit(EFLAGS_CF, carry);
    regs.set_status_bit(EFLAGS_OF, overflow);
    regs.set_status_bit(EFLAGS_ZF, result == 0);
    regs.set_status_bit(EFLAGS_SF, result & (1 << 31) != 0);
}

impl Isa for X86 {
    const ARCH: Architecture = Architecture::X86;
    type Registers = X86Registers;
    type Instruction = X86Instruction;

    fn decode(source: &mut dyn ByteSource) -> Result<Decoded<X86Instruction>, StepFault> {
        X86Instruction::decode(source)
    }

    fn execute(
        instruction: &X86Instruction,
        cx: &mut ExecContext<'_, X86Registers>,
    ) -> Result<ExecuteOutcome, StepFault> {
        match *instruction {
            X86Instruction::Nop => {}
            X86Instruction::Hlt => return Ok(ExecuteOutcome::Exit),
            X86Instruction::Int {
                vector: SERVICE_VECTOR,
            } => {
                let number = reg(cx.regs, Reg32::Eax);
                let arg = reg(cx.regs, Reg32::Ebx);
                return cx.service(number, arg);
            }
            X86Instruction::Int { vector } => {
                return Err(StepFault::new(
                    FaultCode::UnsupportedSyscall,
                    u32::from(vector),
                ));
            }
            X86Instruction::Mov { dst, src } => {
                let value = match src {
                    Operand::Reg(src) => reg(cx.regs, src),
                    Operand::Imm(value) => value,
                };
                cx.regs.set_gpr(usize::from(dst.index()), value);
            }
            X86Instruction::Alu { op, dst, src } => {
                let a = reg(cx.regs, dst);
                let b = match src {
                    Operand::Reg(src) => reg(cx.regs, src),
                    Operand::Imm(value) => value,
                };
                let (result, carry, overflow) = match op {
                    AluOp::Add => {
                        let (r, c) = a.overflowing_add(b);
                        (r, c, ((a ^ r) & (b ^ r)) >> 31 != 0)
                    }
                    AluOp::Sub => {
                        let (r, c) = a.overflowing_sub(b);
                        (r, c, ((a ^ b) & (a ^ r)) >> 31 != 0)
                    }
                    AluOp::And => (a & b, false, false),
                    AluOp::Or => (a | b, false, false),
                    AluOp::Xor => (a ^ b, false, false),
                };
                cx.regs.set_gpr(usize::from(dst.index()), result);
                set_result_flags(cx.regs, result, carry, overflow);
            }
        }
        Ok(ExecuteOutcome::Next)
    }

    fn reset(regs: &mut X86Registers, entry: u32, stack_top: u32) {
        regs.set_pc(entry);
        regs.set_gpr(usize::from(Reg32::Esp.index()), stack_top);
        regs.set_status(EFLAGS_RESET);
    }

    fn snapshot(regs: &X86Registers) -> RegisterSnapshot {
        RegisterSnapshot {
            architecture: Self::ARCH,
            pc: regs.pc(),
            general: Reg32::ALL
                .into_iter()
                .map(|r| NamedRegister::new(r.name(), reg(regs, r)))
                .collect(),
            special: vec![
                NamedRegister::new("eip", regs.pc()),
                NamedRegister::new("eflags", regs.status()),
            ],
        }
    }
}
