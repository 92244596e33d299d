//! ARMv4 A32 instruction classification and field extraction.
//!
//! Classification follows the bit-27..24 family masks: data processing
//! (`00x`), single data transfer (`01x`), branch (`101`), software interrupt
//! (`1111`). `bx` is matched first because it lives inside the data-processing
//! space.

use std::fmt;

use crate::StepFault;

/// Register names indexed by register number.
pub const REGISTER_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr",
    "pc",
];

/// Stack pointer.
pub const SP: u8 = 13;
/// Link register.
pub const LR: u8 = 14;
/// Program counter.
pub const PC: u8 = 15;

const BX_MASK: u32 = 0x0FFF_FFF0;
const BX_PATTERN: u32 = 0x012F_FF10;

/// Condition field (bits 31..28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Condition {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Condition {
    /// Decodes a 4-bit condition field; `0b1111` has no ARMv4 meaning.
    #[must_use]
    pub const fn from_u4(bits: u32) -> Option<Self> {
        Some(match bits {
            0x0 => Self::Eq,
            0x1 => Self::Ne,
            0x2 => Self::Cs,
            0x3 => Self::Cc,
            0x4 => Self::Mi,
            0x5 => Self::Pl,
            0x6 => Self::Vs,
            0x7 => Self::Vc,
            0x8 => Self::Hi,
            0x9 => Self::Ls,
            0xA => Self::Ge,
            0xB => Self::Lt,
            0xC => Self::Gt,
            0xD => Self::Le,
            0xE => Self::Al,
            _ => return None,
        })
    }

    /// Assembler suffix; empty for `al`.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Cs => "cs",
            Self::Cc => "cc",
            Self::Mi => "mi",
            Self::Pl => "pl",
            Self::Vs => "vs",
            Self::Vc => "vc",
            Self::Hi => "hi",
            Self::Ls => "ls",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
            Self::Al => "",
        }
    }
}

/// Data-processing opcode (bits 24..21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DpOp {
    And,
    Eor,
    Sub,
    Rsb,
    Add,
    Adc,
    Sbc,
    Rsc,
    Tst,
    Teq,
    Cmp,
    Cmn,
    Orr,
    Mov,
    Bic,
    Mvn,
}

/// Data-processing opcodes in encoding order.
pub const DP_OPCODE_TABLE: [DpOp; 16] = [
    DpOp::And,
    DpOp::Eor,
    DpOp::Sub,
    DpOp::Rsb,
    DpOp::Add,
    DpOp::Adc,
    DpOp::Sbc,
    DpOp::Rsc,
    DpOp::Tst,
    DpOp::Teq,
    DpOp::Cmp,
    DpOp::Cmn,
    DpOp::Orr,
    DpOp::Mov,
    DpOp::Bic,
    DpOp::Mvn,
];

impl DpOp {
    /// Assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Eor => "eor",
            Self::Sub => "sub",
            Self::Rsb => "rsb",
            Self::Add => "add",
            Self::Adc => "adc",
            Self::Sbc => "sbc",
            Self::Rsc => "rsc",
            Self::Tst => "tst",
            Self::Teq => "teq",
            Self::Cmp => "cmp",
            Self::Cmn => "cmn",
            Self::Orr => "orr",
            Self::Mov => "mov",
            Self::Bic => "bic",
            Self::Mvn => "mvn",
        }
    }

    /// Compare/test forms: flags only, no destination.
    #[must_use]
    pub const fn is_test(self) -> bool {
        matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }

    /// Move forms: no first operand register.
    #[must_use]
    pub const fn is_move(self) -> bool {
        matches!(self, Self::Mov | Self::Mvn)
    }
}

/// Barrel-shifter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    const fn from_u2(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }

    const fn mnemonic(self) -> &'static str {
        match self {
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Ror => "ror",
        }
    }
}

/// Flexible second operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand2 {
    /// 8-bit immediate rotated right by twice `rotate`.
    Immediate {
        /// Unrotated 8-bit value.
        imm8: u8,
        /// Rotation field (0..=15).
        rotate: u8,
    },
    /// Register shifted by an immediate amount.
    Register {
        /// Source register.
        rm: u8,
        /// Shift operation.
        shift: ShiftKind,
        /// Raw 5-bit amount (0 has per-shift special meaning).
        amount: u8,
    },
}

impl Operand2 {
    /// Rotated immediate value, if this is an immediate operand.
    #[must_use]
    pub const fn immediate_value(self) -> Option<u32> {
        match self {
            Self::Immediate { imm8, rotate } => {
                Some((imm8 as u32).rotate_right(rotate as u32 * 2))
            }
            Self::Register { .. } => None,
        }
    }
}

/// Decoded A32 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmInstruction {
    /// Data-processing family.
    DataProcessing {
        /// Condition.
        cond: Condition,
        /// Operation.
        op: DpOp,
        /// S bit.
        set_flags: bool,
        /// Destination.
        rd: u8,
        /// First operand.
        rn: u8,
        /// Second operand.
        operand2: Operand2,
    },
    /// `ldr/str/ldrb/strb` with a 12-bit immediate offset.
    Transfer {
        /// Condition.
        cond: Condition,
        /// L bit.
        load: bool,
        /// B bit.
        byte: bool,
        /// P bit: offset applied before the access.
        pre_index: bool,
        /// U bit: offset added rather than subtracted.
        up: bool,
        /// W bit.
        writeback: bool,
        /// Base register.
        rn: u8,
        /// Transfer register.
        rd: u8,
        /// 12-bit offset.
        offset: u16,
    },
    /// `b` / `bl`.
    Branch {
        /// Condition.
        cond: Condition,
        /// L bit.
        link: bool,
        /// Sign-extended 24-bit word offset.
        offset: i32,
    },
    /// `bx rm`.
    BranchExchange {
        /// Condition.
        cond: Condition,
        /// Target register.
        rm: u8,
    },
    /// `swi #comment`.
    SoftwareInterrupt {
        /// Condition.
        cond: Condition,
        /// 24-bit comment field.
        comment: u32,
    },
}

#[allow(clippy::cast_possible_truncation)]
const fn field(word: u32, shift: u32, mask: u32) -> u8 {
    ((word >> shift) & mask) as u8
}

/// Sign-extends the 24-bit branch field.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend_24(imm24: u32) -> i32 {
    ((imm24 << 8) as i32) >> 8
}

impl ArmInstruction {
    /// Classifies and decodes one instruction word.
    ///
    /// # Errors
    ///
    /// Unsupported families fault with the bits 27..20 opcode byte; supported
    /// families with unsupported sub-forms fault with an unsupported function.
    pub fn decode(word: u32) -> Result<Self, StepFault> {
        let family = (word >> 20) & 0xFF;
        let Some(cond) = Condition::from_u4(word >> 28) else {
            return Err(StepFault::opcode(family));
        };

        if word & BX_MASK == BX_PATTERN {
            return Ok(Self::BranchExchange {
                cond,
                rm: field(word, 0, 0xF),
            });
        }

        match (word >> 24) & 0xF {
            0x0..=0x3 => Self::decode_data_processing(word, cond),
            0x4..=0x7 => Self::decode_transfer(word, cond),
            0xA | 0xB => Ok(Self::Branch {
                cond,
                link: word & (1 << 24) != 0,
                offset: sign_extend_24(word & 0x00FF_FFFF),
            }),
            0xF => Ok(Self::SoftwareInterrupt {
                cond,
                comment: word & 0x00FF_FFFF,
            }),
            _ => Err(StepFault::opcode(family)),
        }
    }

    fn decode_data_processing(word: u32, cond: Condition) -> Result<Self, StepFault> {
        let immediate = word & (1 << 25) != 0;
        let set_flags = word & (1 << 20) != 0;
        let op = DP_OPCODE_TABLE[((word >> 21) & 0xF) as usize];

        // Multiplies, halfword transfers, and register-specified shifts.
        if !immediate && word & (1 << 4) != 0 {
            return Err(StepFault::function((word >> 4) & 0xF));
        }
        // Compare opcodes without S encode PSR transfers.
        if op.is_test() && !set_flags {
            return Err(StepFault::function((word >> 21) & 0xF));
        }

        let operand2 = if immediate {
            Operand2::Immediate {
                imm8: field(word, 0, 0xFF),
                rotate: field(word, 8, 0xF),
            }
        } else {
            Operand2::Register {
                rm: field(word, 0, 0xF),
                shift: ShiftKind::from_u2(word >> 5),
                amount: field(word, 7, 0x1F),
            }
        };

        Ok(Self::DataProcessing {
            cond,
            op,
            set_flags,
            rd: field(word, 12, 0xF),
            rn: field(word, 16, 0xF),
            operand2,
        })
    }

    fn decode_transfer(word: u32, cond: Condition) -> Result<Self, StepFault> {
        if word & (1 << 25) != 0 {
            return Err(StepFault::function((word >> 4) & 0xF));
        }
        Ok(Self::Transfer {
            cond,
            load: word & (1 << 20) != 0,
            byte: word & (1 << 22) != 0,
            pre_index: word & (1 << 24) != 0,
            up: word & (1 << 23) != 0,
            writeback: word & (1 << 21) != 0,
            rn: field(word, 16, 0xF),
            rd: field(word, 12, 0xF),
            offset: (word & 0xFFF) as u16,
        })
    }

    /// Condition guarding this instruction.
    #[must_use]
    pub const fn condition(&self) -> Condition {
        match *self {
            Self::DataProcessing { cond, .. }
            | Self::Transfer { cond, .. }
            | Self::Branch { cond, .. }
            | Self::BranchExchange { cond, .. }
            | Self::SoftwareInterrupt { cond, .. } => cond,
        }
    }
}

fn reg(index: u8) -> &'static str {
    REGISTER_NAMES[usize::from(index & 0xF)]
}

impl fmt::Display for Operand2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Immediate { .. } => {
                write!(f, "#{}", self.immediate_value().unwrap_or_default())
            }
            Self::Register {
                rm,
                shift: ShiftKind::Lsl,
                amount: 0,
            } => f.write_str(reg(rm)),
            Self::Register {
                rm,
                shift: ShiftKind::Ror,
                amount: 0,
            } => write!(f, "{}, rrx", reg(rm)),
            Self::Register { rm, shift, amount } => {
                let amount = if amount == 0 { 32 } else { amount };
                write!(f, "{}, {} #{amount}", reg(rm), shift.mnemonic())
            }
        }
    }
}

impl fmt::Display for ArmInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DataProcessing {
                cond,
                op,
                set_flags,
                rd,
                rn,
                operand2,
            } => {
                let c = cond.suffix();
                let m = op.mnemonic();
                if op.is_test() {
                    write!(f, "{m}{c} {}, {operand2}", reg(rn))
                } else {
                    let s = if set_flags { "s" } else { "" };
                    if op.is_move() {
                        write!(f, "{m}{c}{s} {}, {operand2}", reg(rd))
                    } else {
                        write!(f, "{m}{c}{s} {}, {}, {operand2}", reg(rd), reg(rn))
                    }
                }
            }
            Self::Transfer {
                cond,
                load,
                byte,
                pre_index,
                up,
                writeback,
                rn,
                rd,
                offset,
            } => {
                let m = if load { "ldr" } else { "str" };
                let b = if byte { "b" } else { "" };
                let sign = if up { "" } else { "-" };
                write!(f, "{m}{}{b} {}, [{}", cond.suffix(), reg(rd), reg(rn))?;
                match (pre_index, offset) {
                    (true, 0) => f.write_str("]")?,
                    (true, _) => write!(f, ", #{sign}{offset}]")?,
                    (false, _) => write!(f, "], #{sign}{offset}")?,
                }
                if pre_index && writeback {
                    f.write_str("!")?;
                }
                Ok(())
            }
            Self::Branch { cond, link, offset } => {
                let l = if link { "l" } else { "" };
                let displacement = i64::from(offset) * 4 + 8;
                let sign = if displacement < 0 { "-" } else { "+" };
                write!(
                    f,
                    "b{l}{} .{sign}{}",
                    cond.suffix(),
                    displacement.unsigned_abs()
                )
            }
            Self::BranchExchange { cond, rm } => write!(f, "bx{} {}", cond.suffix(), reg(rm)),
            Self::SoftwareInterrupt { cond, comment } => {
                write!(f, "swi{} #{comment:#x}", cond.suffix())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{sign_extend_24, ArmInstruction, Condition, DpOp, Operand2};
    use crate::FaultCode;

    #[rstest]
    #[case(0xE3A0_0005, "mov r0, #5")]
    #[case(0xE081_0002, "add r0, r1, r2")]
    #[case(0xE250_0001, "subs r0, r0, #1")]
    #[case(0xE350_000A, "cmp r0, #10")]
    #[case(0xE1A0_0101, "mov r0, r1, lsl #2")]
    #[case(0xE3A0_04FF, "mov r0, #4278190080")]
    #[case(0xE591_0004, "ldr r0, [r1, #4]")]
    #[case(0xE5A1_0004, "str r0, [r1, #4]!")]
    #[case(0xE4D1_0001, "ldrb r0, [r1], #1")]
    #[case(0xE511_0004, "ldr r0, [r1, #-4]")]
    #[case(0xEB00_0002, "bl .+16")]
    #[case(0x1AFF_FFFE, "bne .+0")]
    #[case(0xEAFF_FFFD, "b .-4")]
    #[case(0xE12F_FF1E, "bx lr")]
    #[case(0xEF00_0000, "swi #0x0")]
    fn decodes_to_canonical_text(#[case] word: u32, #[case] text: &str) {
        let instruction = ArmInstruction::decode(word).expect("supported encoding");
        assert_eq!(instruction.to_string(), text);
    }

    #[test]
    fn branch_offset_sign_extends_from_bit_23() {
        assert_eq!(sign_extend_24(0x00_0001), 1);
        assert_eq!(sign_extend_24(0x7F_FFFF), 0x7F_FFFF);
        assert_eq!(sign_extend_24(0x80_0000), -0x80_0000);
        assert_eq!(sign_extend_24(0xFF_FFFF), -1);
    }

    #[test]
    fn immediate_operand_rotates_right_by_twice_field() {
        let ArmInstruction::DataProcessing { op, operand2, .. } =
            ArmInstruction::decode(0xE3A0_04FF).expect("mov")
        else {
            panic!("expected data processing");
        };
        assert_eq!(op, DpOp::Mov);
        assert_eq!(
            operand2,
            Operand2::Immediate {
                imm8: 0xFF,
                rotate: 4
            }
        );
        assert_eq!(operand2.immediate_value(), Some(0xFF00_0000));
    }

    #[rstest]
    #[case(0xE000_0291, FaultCode::UnsupportedFunction)] // mul
    #[case(0xE10F_0000, FaultCode::UnsupportedFunction)] // mrs
    #[case(0xE791_0002, FaultCode::UnsupportedFunction)] // ldr with register offset
    #[case(0xE891_0003, FaultCode::UnsupportedOpcode)] // ldm
    #[case(0xEE00_0000, FaultCode::UnsupportedOpcode)] // coprocessor
    #[case(0xF3A0_0005, FaultCode::UnsupportedOpcode)] // nv condition
    fn unsupported_encodings_fault(#[case] word: u32, #[case] code: FaultCode) {
        let fault = ArmInstruction::decode(word).expect_err("outside the subset");
        assert_eq!(fault.code, code);
    }

    #[test]
    fn condition_is_exposed() {
        let instruction = ArmInstruction::decode(0x1AFF_FFFE).expect("bne");
        assert_eq!(instruction.condition(), Condition::Ne);
    }
}
