//! MIPS32 to x86 rules.

use super::{RegisterCorrespondence, RuleTable, TranslatedInstruction};
use crate::isa::x86::{AluOp, Operand, Reg32};
use crate::isa::{MipsInstruction, X86Instruction};
use crate::{Architecture, EmulatorError};

type Emitted = Result<Vec<TranslatedInstruction>, EmulatorError>;

pub(super) fn table() -> RuleTable<MipsInstruction> {
    let mut table = RuleTable::<MipsInstruction>::new(Architecture::Mips32, Architecture::X86);
    table
        .insert("add", |ins, regs| three_register(ins, regs, AluOp::Add))
        .insert("addu", |ins, regs| three_register(ins, regs, AluOp::Add))
        .insert("sub", |ins, regs| three_register(ins, regs, AluOp::Sub))
        .insert("subu", |ins, regs| three_register(ins, regs, AluOp::Sub))
        .insert("and", |ins, regs| three_register(ins, regs, AluOp::And))
        .insert("or", |ins, regs| three_register(ins, regs, AluOp::Or))
        .insert("xor", |ins, regs| three_register(ins, regs, AluOp::Xor))
        .insert("addi", |ins, regs| immediate(ins, regs, AluOp::Add, sign_extended(ins)))
        .insert("addiu", |ins, regs| immediate(ins, regs, AluOp::Add, sign_extended(ins)))
        .insert("andi", |ins, regs| immediate(ins, regs, AluOp::And, u32::from(ins.imm)))
        .insert("ori", |ins, regs| immediate(ins, regs, AluOp::Or, u32::from(ins.imm)))
        .insert("xori", |ins, regs| immediate(ins, regs, AluOp::Xor, u32::from(ins.imm)))
        .insert("lui", upper_immediate)
        .insert("nop", |_, _| Ok(vec![X86Instruction::Nop.into()]));
    table
}

/// Folds `op` when both sources are constants.
const fn fold(op: AluOp, lhs: u32, rhs: u32) -> u32 {
    match op {
        AluOp::Add => lhs.wrapping_add(rhs),
        AluOp::Sub => lhs.wrapping_sub(rhs),
        AluOp::And => lhs & rhs,
        AluOp::Or => lhs | rhs,
        AluOp::Xor => lhs ^ rhs,
    }
}

#[allow(clippy::cast_sign_loss)]
const fn sign_extended(ins: &MipsInstruction) -> u32 {
    ins.simm() as u32
}

const fn commutes(op: AluOp) -> bool {
    !matches!(op, AluOp::Sub)
}

/// Two's-complement negation of `dst` in place.
const fn negate(dst: Reg32) -> [X86Instruction; 2] {
    [
        X86Instruction::Alu {
            op: AluOp::Xor,
            dst,
            src: Operand::Imm(0xFFFF_FFFF),
        },
        X86Instruction::Alu {
            op: AluOp::Add,
            dst,
            src: Operand::Imm(1),
        },
    ]
}

/// `op rd, rs, rt` becomes `mov rd, rs; op rd, rt` with the shortcuts x86's
/// two-operand form allows.
fn three_register(ins: &MipsInstruction, regs: &RegisterCorrespondence, op: AluOp) -> Emitted {
    let dst = regs.x86_for(ins.rd)?;
    let lhs = regs.x86_source(ins.rs)?;
    let rhs = regs.x86_source(ins.rt)?;
    let alu = |src| X86Instruction::Alu { op, dst, src };
    let sequence = match (lhs, rhs) {
        (Operand::Imm(a), Operand::Imm(b)) => vec![X86Instruction::Mov {
            dst,
            src: Operand::Imm(fold(op, a, b)),
        }],
        (Operand::Reg(reg), _) if reg == dst => vec![alu(rhs)],
        (_, Operand::Reg(reg)) if reg == dst && commutes(op) => vec![alu(lhs)],
        // rd = rs - rd is rewritten as rd = -rd + rs.
        (_, Operand::Reg(reg)) if reg == dst => {
            let mut sequence = negate(dst).to_vec();
            if lhs != Operand::Imm(0) {
                sequence.push(X86Instruction::Alu {
                    op: AluOp::Add,
                    dst,
                    src: lhs,
                });
            }
            sequence
        }
        _ => vec![X86Instruction::Mov { dst, src: lhs }, alu(rhs)],
    };
    Ok(sequence.into_iter().map(Into::into).collect())
}

/// `op rt, rs, imm` with the immediate already extended per the MIPS opcode.
fn immediate(
    ins: &MipsInstruction,
    regs: &RegisterCorrespondence,
    op: AluOp,
    value: u32,
) -> Emitted {
    let dst = regs.x86_for(ins.rt)?;
    let sequence = match regs.x86_source(ins.rs)? {
        Operand::Imm(base) => vec![X86Instruction::Mov {
            dst,
            src: Operand::Imm(fold(op, base, value)),
        }],
        Operand::Reg(reg) if reg == dst => vec![X86Instruction::Alu {
            op,
            dst,
            src: Operand::Imm(value),
        }],
        src @ Operand::Reg(_) => vec![
            X86Instruction::Mov { dst, src },
            X86Instruction::Alu {
                op,
                dst,
                src: Operand::Imm(value),
            },
        ],
    };
    Ok(sequence.into_iter().map(Into::into).collect())
}

fn upper_immediate(ins: &MipsInstruction, regs: &RegisterCorrespondence) -> Emitted {
    let dst = regs.x86_for(ins.rt)?;
    Ok(vec![X86Instruction::Mov {
        dst,
        src: Operand::Imm(u32::from(ins.imm) << 16),
    }
    .into()])
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use crate::api::{Core, CoreConfig};
    use crate::isa::x86::{Operand, Reg32};
    use crate::isa::{MipsInstruction, MipsOp, X86Core, X86Instruction};
    use crate::translate::TranslationTables;
    use crate::{Architecture, EmulatorError};

    fn texts(instruction: MipsInstruction) -> Result<Vec<String>, EmulatorError> {
        let bytes = instruction.encode().to_le_bytes();
        TranslationTables::standard()
            .translate(Architecture::Mips32, Architecture::X86, &bytes)
            .map(|translation| {
                translation
                    .instructions
                    .into_iter()
                    .map(|instruction| instruction.text)
                    .collect()
            })
    }

    #[rstest]
    #[case(MipsInstruction::reg3(MipsOp::Add, 8, 8, 9), &["add eax, ecx"])]
    #[case(MipsInstruction::reg3(MipsOp::Addu, 8, 9, 10), &["mov eax, ecx", "add eax, edx"])]
    #[case(MipsInstruction::reg3(MipsOp::Or, 8, 9, 8), &["or eax, ecx"])]
    #[case(MipsInstruction::reg3(MipsOp::Subu, 10, 9, 0), &["mov edx, ecx", "sub edx, 0x0"])]
    #[case(MipsInstruction::reg3(MipsOp::Xor, 8, 0, 0), &["mov eax, 0x0"])]
    #[case(MipsInstruction::imm(MipsOp::Addi, 8, 0, 5), &["mov eax, 0x5"])]
    #[case(MipsInstruction::imm(MipsOp::Addiu, 8, 8, 0xFFFF), &["add eax, 0xffffffff"])]
    #[case(MipsInstruction::imm(MipsOp::Ori, 11, 16, 0x8000), &["mov ebx, esi", "or ebx, 0x8000"])]
    #[case(MipsInstruction::imm(MipsOp::Andi, 9, 9, 0xFF), &["and ecx, 0xff"])]
    #[case(MipsInstruction::lui(17, 0x1234), &["mov edi, 0x12340000"])]
    #[case(MipsInstruction::nop(), &["nop"])]
    fn emits_two_operand_sequences(#[case] source: MipsInstruction, #[case] expected: &[&str]) {
        assert_eq!(texts(source).expect("rule exists"), expected);
    }

    #[rstest]
    #[case(MipsInstruction::reg3(MipsOp::Subu, 8, 0, 8), &["xor eax, 0xffffffff", "add eax, 0x1"])]
    #[case(
        MipsInstruction::reg3(MipsOp::Sub, 9, 8, 9),
        &["xor ecx, 0xffffffff", "add ecx, 0x1", "add ecx, eax"]
    )]
    #[case(MipsInstruction::reg3(MipsOp::Sub, 10, 10, 10), &["sub edx, edx"])]
    fn subtraction_into_its_own_subtrahend_negates_first(
        #[case] source: MipsInstruction,
        #[case] expected: &[&str],
    ) {
        assert_eq!(texts(source).expect("rule exists"), expected);
    }

    #[test]
    fn negated_subtraction_computes_the_difference() {
        let source = MipsInstruction::reg3(MipsOp::Sub, 9, 8, 9);
        let bytes = source.encode().to_le_bytes();
        let translation = TranslationTables::standard()
            .translate(Architecture::Mips32, Architecture::X86, &bytes)
            .expect("rule exists");
        let mut core = X86Core::new(CoreConfig::default());
        let load = |dst, value| {
            X86Instruction::Mov {
                dst,
                src: Operand::Imm(value),
            }
            .encode()
        };
        let setup = [load(Reg32::Eax, 7), load(Reg32::Ecx, 10)];
        let translated = translation
            .instructions
            .iter()
            .map(|instruction| instruction.bytes.clone());
        for bytes in setup.into_iter().chain(translated) {
            core.execute_instruction(&bytes).expect("supported encoding");
        }
        assert_eq!(core.registers().get("ecx"), Some(7u32.wrapping_sub(10)));
    }

    const PAIRED: [u8; 8] = [8, 9, 10, 11, 16, 17, 29, 30];
    const SOURCES: [u8; 9] = [0, 8, 9, 10, 11, 16, 17, 29, 30];

    proptest! {
        #[test]
        fn every_paired_subtraction_translates(
            rd in prop::sample::select(PAIRED.to_vec()),
            rs in prop::sample::select(SOURCES.to_vec()),
            rt in prop::sample::select(SOURCES.to_vec()),
            unsigned in any::<bool>(),
        ) {
            let op = if unsigned { MipsOp::Subu } else { MipsOp::Sub };
            prop_assert!(texts(MipsInstruction::reg3(op, rd, rs, rt)).is_ok());
        }
    }

    #[test]
    fn writes_to_zero_have_no_x86_destination() {
        let source = MipsInstruction::reg3(MipsOp::Add, 0, 8, 9);
        assert!(matches!(
            texts(source),
            Err(EmulatorError::UnmappedRegister { register, target: Architecture::X86 })
                if register == "$zero"
        ));
    }

    #[test]
    fn unpaired_source_register_is_reported() {
        let source = MipsInstruction::reg3(MipsOp::And, 8, 31, 8);
        assert!(matches!(
            texts(source),
            Err(EmulatorError::UnmappedRegister { register, .. }) if register == "$ra"
        ));
    }
}
