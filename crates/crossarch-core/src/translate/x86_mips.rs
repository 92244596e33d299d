//! x86 to MIPS32 rules.

use super::{RegisterCorrespondence, RuleTable, TranslatedInstruction};
use crate::isa::mips::decode::{AT, ZERO};
use crate::isa::x86::{AluOp, Operand};
use crate::isa::{MipsInstruction, MipsOp, X86Instruction};
use crate::{Architecture, EmulatorError};

type Emitted = Result<Vec<TranslatedInstruction>, EmulatorError>;

pub(super) fn table() -> RuleTable<X86Instruction> {
    let mut table = RuleTable::<X86Instruction>::new(Architecture::X86, Architecture::Mips32);
    table
        .insert("add", alu)
        .insert("sub", alu)
        .insert("and", alu)
        .insert("or", alu)
        .insert("xor", alu)
        .insert("mov", mov)
        .insert("nop", |_, _| Ok(vec![MipsInstruction::nop().into()]));
    table
}

fn emit(sequence: Vec<MipsInstruction>) -> Emitted {
    Ok(sequence.into_iter().map(Into::into).collect())
}

fn shape_mismatch(ins: &X86Instruction) -> EmulatorError {
    EmulatorError::UnsupportedOperands {
        instruction: ins.to_string(),
        reason: "rule registered for a different instruction shape",
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn halves(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, value as u16)
}

/// Sign-extended 16-bit form of `value`, when one exists.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn as_simm16(value: u32) -> Option<u16> {
    let signed = value as i32;
    if signed >= i16::MIN as i32 && signed <= i16::MAX as i32 {
        Some(value as u16)
    } else {
        None
    }
}

/// `lui`/`ori` pair materialising `value` in `rt`; the `ori` is dropped when
/// the low half is zero.
fn load_constant(rt: u8, value: u32) -> Vec<MipsInstruction> {
    let (upper, lower) = halves(value);
    let mut sequence = vec![MipsInstruction::lui(rt, upper)];
    if lower != 0 {
        sequence.push(MipsInstruction::imm(MipsOp::Ori, rt, rt, lower));
    }
    sequence
}

const fn register_op(op: AluOp) -> MipsOp {
    match op {
        AluOp::Add => MipsOp::Addu,
        AluOp::Sub => MipsOp::Subu,
        AluOp::And => MipsOp::And,
        AluOp::Or => MipsOp::Or,
        AluOp::Xor => MipsOp::Xor,
    }
}

/// Immediate-form opcode and encoded immediate, when `value` fits.
const fn immediate_op(op: AluOp, value: u32) -> Option<(MipsOp, u16)> {
    match op {
        AluOp::Add => match as_simm16(value) {
            Some(imm) => Some((MipsOp::Addiu, imm)),
            None => None,
        },
        AluOp::Sub => match as_simm16(value.wrapping_neg()) {
            Some(imm) => Some((MipsOp::Addiu, imm)),
            None => None,
        },
        AluOp::And | AluOp::Or | AluOp::Xor if value > 0xFFFF => None,
        AluOp::And => Some((MipsOp::Andi, halves(value).1)),
        AluOp::Or => Some((MipsOp::Ori, halves(value).1)),
        AluOp::Xor => Some((MipsOp::Xori, halves(value).1)),
    }
}

fn alu(ins: &X86Instruction, regs: &RegisterCorrespondence) -> Emitted {
    let X86Instruction::Alu { op, dst, src } = *ins else {
        return Err(shape_mismatch(ins));
    };
    let rd = regs.mips_for(dst)?;
    match src {
        Operand::Reg(reg) => {
            let rt = regs.mips_for(reg)?;
            emit(vec![MipsInstruction::reg3(register_op(op), rd, rd, rt)])
        }
        Operand::Imm(value) => match immediate_op(op, value) {
            Some((mips_op, imm)) => emit(vec![MipsInstruction::imm(mips_op, rd, rd, imm)]),
            None => {
                let mut sequence = load_constant(AT, value);
                sequence.push(MipsInstruction::reg3(register_op(op), rd, rd, AT));
                emit(sequence)
            }
        },
    }
}

fn mov(ins: &X86Instruction, regs: &RegisterCorrespondence) -> Emitted {
    let X86Instruction::Mov { dst, src } = *ins else {
        return Err(shape_mismatch(ins));
    };
    let rt = regs.mips_for(dst)?;
    let sequence = match src {
        Operand::Reg(reg) => {
            let rs = regs.mips_for(reg)?;
            vec![MipsInstruction::reg3(MipsOp::Addu, rt, rs, ZERO)]
        }
        Operand::Imm(value) => match as_simm16(value) {
            Some(imm) => vec![MipsInstruction::imm(MipsOp::Addiu, rt, ZERO, imm)],
            None if value <= 0xFFFF => {
                vec![MipsInstruction::imm(MipsOp::Ori, rt, ZERO, halves(value).1)]
            }
            None => load_constant(rt, value),
        },
    };
    emit(sequence)
}
