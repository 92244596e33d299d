//! MIPS32 opcode tables, field extraction, and canonical text.

use std::fmt;

use crate::StepFault;

/// Conventional register names indexed by register number.
pub const REGISTER_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

/// `$zero`.
pub const ZERO: u8 = 0;
/// `$at`, assembler temporary.
pub const AT: u8 = 1;
/// `$v0`, system-call number.
pub const V0: u8 = 2;
/// `$a0`, first argument.
pub const A0: u8 = 4;
/// `$sp`.
pub const SP: u8 = 29;
/// `$ra`.
pub const RA: u8 = 31;

/// Resolves `$name`, `name`, `$n`, or `n` to a register number.
#[must_use]
pub fn register_index(name: &str) -> Option<u8> {
    let bare = name.strip_prefix('$').unwrap_or(name);
    if let Ok(number) = bare.parse::<u8>() {
        return (number < 32).then_some(number);
    }
    let bare = if bare == "s8" { "fp" } else { bare };
    REGISTER_NAMES
        .iter()
        .position(|candidate| *candidate == bare)
        .and_then(|index| u8::try_from(index).ok())
}

/// Canonical `$name` for a register number.
#[must_use]
pub fn register_name(index: u8) -> &'static str {
    const DOLLAR_NAMES: [&str; 32] = [
        "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3", "$t0", "$t1", "$t2", "$t3",
        "$t4", "$t5", "$t6", "$t7", "$s0", "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7",
        "$t8", "$t9", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra",
    ];
    DOLLAR_NAMES[usize::from(index & 0x1F)]
}

/// Supported MIPS32 operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MipsOp {
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Jr,
    Jalr,
    Syscall,
    Break,
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    J,
    Jal,
    Beq,
    Bne,
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Lui,
    Lb,
    Lw,
    Lbu,
    Sb,
    Sw,
}

/// Operand layout, which drives both field usage and canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    /// `rd, rs, rt`.
    ThreeReg,
    /// `rd, rt, shamt`.
    ShiftImm,
    /// `rd, rt, rs`.
    ShiftVar,
    /// `rs`.
    JumpReg,
    /// `rd, rs`.
    JumpLinkReg,
    /// No operands (code field ignored).
    Bare,
    /// `rt, rs, signed imm`.
    ImmSigned,
    /// `rt, rs, zero-extended imm`.
    ImmUnsigned,
    /// `rt, imm`.
    UpperImm,
    /// `rs, rt, word offset`.
    Branch,
    /// `rt, offset(rs)`.
    Memory,
    /// 26-bit jump target.
    Jump,
}

/// R-type function codes (primary opcode 0).
pub const FUNCT_TABLE: &[(u8, MipsOp)] = &[
    (0x00, MipsOp::Sll),
    (0x02, MipsOp::Srl),
    (0x03, MipsOp::Sra),
    (0x04, MipsOp::Sllv),
    (0x06, MipsOp::Srlv),
    (0x07, MipsOp::Srav),
    (0x08, MipsOp::Jr),
    (0x09, MipsOp::Jalr),
    (0x0C, MipsOp::Syscall),
    (0x0D, MipsOp::Break),
    (0x20, MipsOp::Add),
    (0x21, MipsOp::Addu),
    (0x22, MipsOp::Sub),
    (0x23, MipsOp::Subu),
    (0x24, MipsOp::And),
    (0x25, MipsOp::Or),
    (0x26, MipsOp::Xor),
    (0x27, MipsOp::Nor),
    (0x2A, MipsOp::Slt),
    (0x2B, MipsOp::Sltu),
];

/// Primary opcodes other than the R-type escape.
pub const OPCODE_TABLE: &[(u8, MipsOp)] = &[
    (0x02, MipsOp::J),
    (0x03, MipsOp::Jal),
    (0x04, MipsOp::Beq),
    (0x05, MipsOp::Bne),
    (0x08, MipsOp::Addi),
    (0x09, MipsOp::Addiu),
    (0x0A, MipsOp::Slti),
    (0x0B, MipsOp::Sltiu),
    (0x0C, MipsOp::Andi),
    (0x0D, MipsOp::Ori),
    (0x0E, MipsOp::Xori),
    (0x0F, MipsOp::Lui),
    (0x20, MipsOp::Lb),
    (0x23, MipsOp::Lw),
    (0x24, MipsOp::Lbu),
    (0x28, MipsOp::Sb),
    (0x2B, MipsOp::Sw),
];

const SPECIAL: u8 = 0x00;

fn lookup(table: &[(u8, MipsOp)], code: u8) -> Option<MipsOp> {
    table
        .iter()
        .find_map(|(candidate, op)| (*candidate == code).then_some(*op))
}

fn reverse_lookup(table: &[(u8, MipsOp)], op: MipsOp) -> Option<u8> {
    table
        .iter()
        .find_map(|(code, candidate)| (*candidate == op).then_some(*code))
}

impl MipsOp {
    /// Assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Sll => "sll",
            Self::Srl => "srl",
            Self::Sra => "sra",
            Self::Sllv => "sllv",
            Self::Srlv => "srlv",
            Self::Srav => "srav",
            Self::Jr => "jr",
            Self::Jalr => "jalr",
            Self::Syscall => "syscall",
            Self::Break => "break",
            Self::Add => "add",
            Self::Addu => "addu",
            Self::Sub => "sub",
            Self::Subu => "subu",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Nor => "nor",
            Self::Slt => "slt",
            Self::Sltu => "sltu",
            Self::J => "j",
            Self::Jal => "jal",
            Self::Beq => "beq",
            Self::Bne => "bne",
            Self::Addi => "addi",
            Self::Addiu => "addiu",
            Self::Slti => "slti",
            Self::Sltiu => "sltiu",
            Self::Andi => "andi",
            Self::Ori => "ori",
            Self::Xori => "xori",
            Self::Lui => "lui",
            Self::Lb => "lb",
            Self::Lw => "lw",
            Self::Lbu => "lbu",
            Self::Sb => "sb",
            Self::Sw => "sw",
        }
    }

    /// Operand layout for this operation.
    #[must_use]
    pub const fn shape(self) -> OperandShape {
        match self {
            Self::Sll | Self::Srl | Self::Sra => OperandShape::ShiftImm,
            Self::Sllv | Self::Srlv | Self::Srav => OperandShape::ShiftVar,
            Self::Jr => OperandShape::JumpReg,
            Self::Jalr => OperandShape::JumpLinkReg,
            Self::Syscall | Self::Break => OperandShape::Bare,
            Self::Add
            | Self::Addu
            | Self::Sub
            | Self::Subu
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Nor
            | Self::Slt
            | Self::Sltu => OperandShape::ThreeReg,
            Self::J | Self::Jal => OperandShape::Jump,
            Self::Beq | Self::Bne => OperandShape::Branch,
            Self::Addi | Self::Addiu | Self::Slti | Self::Sltiu => OperandShape::ImmSigned,
            Self::Andi | Self::Ori | Self::Xori => OperandShape::ImmUnsigned,
            Self::Lui => OperandShape::UpperImm,
            Self::Lb | Self::Lw | Self::Lbu | Self::Sb | Self::Sw => OperandShape::Memory,
        }
    }

    /// `(primary opcode, function code)`; the function code is zero for
    /// non-R-type operations.
    #[must_use]
    pub fn codes(self) -> (u8, u8) {
        reverse_lookup(FUNCT_TABLE, self).map_or_else(
            || (reverse_lookup(OPCODE_TABLE, self).unwrap_or(0x3F), 0),
            |funct| (SPECIAL, funct),
        )
    }
}

/// Decoded MIPS32 instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MipsInstruction {
    /// Operation.
    pub op: MipsOp,
    /// `rs` field.
    pub rs: u8,
    /// `rt` field.
    pub rt: u8,
    /// `rd` field.
    pub rd: u8,
    /// Shift amount.
    pub shamt: u8,
    /// Raw 16-bit immediate.
    pub imm: u16,
    /// Raw 26-bit jump target (word index).
    pub target: u32,
}

impl MipsInstruction {
    /// Extracts fields from a 32-bit word and resolves the operation.
    ///
    /// # Errors
    ///
    /// Returns an unsupported opcode or function fault carrying the offending
    /// field value.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(word: u32) -> Result<Self, StepFault> {
        let opcode = (word >> 26) as u8;
        let funct = (word & 0x3F) as u8;
        let op = if opcode == SPECIAL {
            lookup(FUNCT_TABLE, funct).ok_or(StepFault::function(u32::from(funct)))?
        } else {
            lookup(OPCODE_TABLE, opcode).ok_or(StepFault::opcode(u32::from(opcode)))?
        };
        Ok(Self {
            op,
            rs: ((word >> 21) & 0x1F) as u8,
            rt: ((word >> 16) & 0x1F) as u8,
            rd: ((word >> 11) & 0x1F) as u8,
            shamt: ((word >> 6) & 0x1F) as u8,
            imm: (word & 0xFFFF) as u16,
            target: word & 0x03FF_FFFF,
        })
    }

    /// Reassembles the 32-bit word.
    #[must_use]
    pub fn encode(&self) -> u32 {
        let (opcode, funct) = self.op.codes();
        let head = (u32::from(opcode) << 26)
            | (u32::from(self.rs & 0x1F) << 21)
            | (u32::from(self.rt & 0x1F) << 16);
        match self.op.shape() {
            OperandShape::Jump => (u32::from(opcode) << 26) | (self.target & 0x03FF_FFFF),
            OperandShape::ImmSigned
            | OperandShape::ImmUnsigned
            | OperandShape::UpperImm
            | OperandShape::Branch
            | OperandShape::Memory => head | u32::from(self.imm),
            OperandShape::ThreeReg
            | OperandShape::ShiftImm
            | OperandShape::ShiftVar
            | OperandShape::JumpReg
            | OperandShape::JumpLinkReg
            | OperandShape::Bare => {
                head | (u32::from(self.rd & 0x1F) << 11)
                    | (u32::from(self.shamt & 0x1F) << 6)
                    | u32::from(funct)
            }
        }
    }

    const fn blank(op: MipsOp) -> Self {
        Self {
            op,
            rs: 0,
            rt: 0,
            rd: 0,
            shamt: 0,
            imm: 0,
            target: 0,
        }
    }

    /// Three-register form `op rd, rs, rt`.
    #[must_use]
    pub const fn reg3(op: MipsOp, rd: u8, rs: u8, rt: u8) -> Self {
        Self {
            rd,
            rs,
            rt,
            ..Self::blank(op)
        }
    }

    /// Immediate form `op rt, rs, imm`.
    #[must_use]
    pub const fn imm(op: MipsOp, rt: u8, rs: u8, imm: u16) -> Self {
        Self {
            rt,
            rs,
            imm,
            ..Self::blank(op)
        }
    }

    /// `lui rt, imm`.
    #[must_use]
    pub const fn lui(rt: u8, imm: u16) -> Self {
        Self::imm(MipsOp::Lui, rt, 0, imm)
    }

    /// Canonical no-op (`sll $zero, $zero, 0`).
    #[must_use]
    pub const fn nop() -> Self {
        Self::blank(MipsOp::Sll)
    }

    /// Whether this is the all-zero no-op word.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        self.encode() == 0
    }

    /// Immediate sign-extended to 32 bits.
    #[must_use]
    pub const fn simm(&self) -> i32 {
        self.imm as i16 as i32
    }
}

impl fmt::Display for MipsInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nop() {
            return f.write_str("nop");
        }
        let m = self.op.mnemonic();
        let (rs, rt, rd) = (
            register_name(self.rs),
            register_name(self.rt),
            register_name(self.rd),
        );
        match self.op.shape() {
            OperandShape::ThreeReg => write!(f, "{m} {rd}, {rs}, {rt}"),
            OperandShape::ShiftImm => write!(f, "{m} {rd}, {rt}, {}", self.shamt),
            OperandShape::ShiftVar => write!(f, "{m} {rd}, {rt}, {rs}"),
            OperandShape::JumpReg => write!(f, "{m} {rs}"),
            OperandShape::JumpLinkReg => write!(f, "{m} {rd}, {rs}"),
            OperandShape::Bare => f.write_str(m),
            OperandShape::ImmSigned => write!(f, "{m} {rt}, {rs}, {}", self.simm()),
            OperandShape::ImmUnsigned => write!(f, "{m} {rt}, {rs}, {:#x}", self.imm),
            OperandShape::UpperImm => write!(f, "{m} {rt}, {:#x}", self.imm),
            OperandShape::Branch => write!(f, "{m} {rs}, {rt}, {}", self.simm()),
            OperandShape::Memory => write!(f, "{m} {rt}, {}({rs})", self.simm()),
            OperandShape::Jump => write!(f, "{m} {:#010x}", self.target << 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{register_index, MipsInstruction, MipsOp, FUNCT_TABLE, OPCODE_TABLE};
    use crate::FaultCode;

    #[rstest]
    #[case(0x2008_0005, "addi $t0, $zero, 5")]
    #[case(0x0109_5020, "add $t2, $t0, $t1")]
    #[case(0x0000_000C, "syscall")]
    #[case(0x0000_0000, "nop")]
    #[case(0x0008_4080, "sll $t0, $t0, 2")]
    #[case(0x1109_FFFE, "beq $t0, $t1, -2")]
    #[case(0x8FA8_0004, "lw $t0, 4($sp)")]
    #[case(0x3C01_1234, "lui $at, 0x1234")]
    #[case(0x3508_00FF, "ori $t0, $t0, 0xff")]
    #[case(0x0C00_0010, "jal 0x00000040")]
    #[case(0x03E0_0008, "jr $ra")]
    fn decodes_to_canonical_text(#[case] word: u32, #[case] text: &str) {
        let instruction = MipsInstruction::decode(word).expect("supported encoding");
        assert_eq!(instruction.to_string(), text);
        assert_eq!(instruction.encode(), word);
    }

    #[test]
    fn unknown_primary_opcode_reports_opcode() {
        let fault = MipsInstruction::decode(0xFFFF_FFFF).expect_err("opcode 0x3f unsupported");
        assert_eq!(fault.code, FaultCode::UnsupportedOpcode);
        assert_eq!(fault.detail, 0x3F);
    }

    #[test]
    fn unknown_function_code_reports_function() {
        let fault = MipsInstruction::decode(0x0000_0018).expect_err("mult is not in the subset");
        assert_eq!(fault.code, FaultCode::UnsupportedFunction);
        assert_eq!(fault.detail, 0x18);
    }

    #[test]
    fn tables_have_unique_codes() {
        for table in [FUNCT_TABLE, OPCODE_TABLE] {
            for (i, (code, _)) in table.iter().enumerate() {
                assert!(table[i + 1..].iter().all(|(other, _)| other != code));
            }
        }
    }

    #[test]
    fn every_operation_reencodes_through_its_table() {
        for (_, op) in FUNCT_TABLE.iter().chain(OPCODE_TABLE) {
            let instruction = MipsInstruction::reg3(*op, 8, 9, 10);
            let decoded = MipsInstruction::decode(instruction.encode()).expect("table entry");
            assert_eq!(decoded.op, *op);
        }
    }

    #[rstest]
    #[case("$t0", Some(8))]
    #[case("sp", Some(29))]
    #[case("$31", Some(31))]
    #[case("$s8", Some(30))]
    #[case("$32", None)]
    #[case("eax", None)]
    fn register_names_resolve(#[case] name: &str, #[case] expected: Option<u8>) {
        assert_eq!(register_index(name), expected);
    }

    #[test]
    fn helper_constructors_encode_expected_words() {
        assert_eq!(MipsInstruction::nop().encode(), 0);
        assert_eq!(MipsInstruction::lui(1, 0x1234).encode(), 0x3C01_1234);
        assert_eq!(
            MipsInstruction::imm(MipsOp::Addi, 8, 0, 5).encode(),
            0x2008_0005
        );
    }
}
