//! 32-bit PowerPC bootstrap subset.
//!
//! The primary-opcode table documents a wider slice of the ISA than is
//! executable; only the forms needed to run a synthetic bootloader decode.
//! Instruction words are stored in bus (little-endian) order.

use std::fmt;

use crate::api::{NamedRegister, RegisterSnapshot};
use crate::machine::{ByteSource, Decoded, ExecContext, ExecuteOutcome, Isa, Machine};
use crate::{Architecture, ProgramCounter, RegisterFile, StepFault};

/// Link register SPR number.
pub const SPR_LR: u16 = 8;
/// Count register SPR number.
pub const SPR_CTR: u16 = 9;

/// Branch-always BO field.
pub const BO_ALWAYS: u8 = 20;

/// Stack pointer by ABI convention.
pub const R1: u8 = 1;
/// First argument / service argument register.
pub const R3: u8 = 3;

const XO_BCLR: u16 = 16;
const XO_MFSPR: u16 = 339;
const XO_MTSPR: u16 = 467;

/// `(primary opcode, mnemonic, executable)` for the documented opcode slice.
pub const PRIMARY_OPCODE_TABLE: &[(u8, &str, bool)] = &[
    (7, "mulli", false),
    (8, "subfic", false),
    (10, "cmpli", false),
    (11, "cmpi", false),
    (14, "addi", true),
    (15, "addis", true),
    (16, "bc", false),
    (17, "sc", true),
    (18, "b", true),
    (19, "bclr", true),
    (20, "rlwimi", false),
    (21, "rlwinm", false),
    (24, "ori", true),
    (25, "oris", true),
    (26, "xori", false),
    (28, "andi.", false),
    (31, "mtspr/mfspr", true),
    (32, "lwz", true),
    (34, "lbz", false),
    (36, "stw", true),
    (38, "stb", false),
];

/// Looks up a primary opcode in the documented table.
#[must_use]
pub fn primary_opcode(opcode: u8) -> Option<(&'static str, bool)> {
    PRIMARY_OPCODE_TABLE
        .iter()
        .find_map(|(code, name, executable)| (*code == opcode).then_some((*name, *executable)))
}

/// Decoded PowerPC subset instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PpcInstruction {
    /// `addi rt, ra, simm` (`ra == 0` reads as zero).
    Addi {
        /// Target.
        rt: u8,
        /// Base.
        ra: u8,
        /// Signed immediate.
        simm: i16,
    },
    /// `addis rt, ra, simm`.
    Addis {
        /// Target.
        rt: u8,
        /// Base.
        ra: u8,
        /// Signed immediate, shifted left 16.
        simm: i16,
    },
    /// `ori ra, rs, uimm`.
    Ori {
        /// Target.
        ra: u8,
        /// Source.
        rs: u8,
        /// Unsigned immediate.
        uimm: u16,
    },
    /// `oris ra, rs, uimm`.
    Oris {
        /// Target.
        ra: u8,
        /// Source.
        rs: u8,
        /// Unsigned immediate, shifted left 16.
        uimm: u16,
    },
    /// `lwz rt, d(ra)`.
    Lwz {
        /// Target.
        rt: u8,
        /// Base.
        ra: u8,
        /// Displacement.
        d: i16,
    },
    /// `stw rs, d(ra)`.
    Stw {
        /// Source.
        rs: u8,
        /// Base.
        ra: u8,
        /// Displacement.
        d: i16,
    },
    /// `b`, `ba`, `bl`, `bla`.
    Branch {
        /// Byte displacement (or absolute target when `absolute`).
        offset: i32,
        /// AA bit.
        absolute: bool,
        /// LK bit.
        link: bool,
    },
    /// `blr` / `blrl` (branch-always form only).
    BranchToLink {
        /// LK bit.
        link: bool,
    },
    /// `mtspr spr, rs` for LR and CTR.
    Mtspr {
        /// Special register number.
        spr: u16,
        /// Source.
        rs: u8,
    },
    /// `mfspr rt, spr` for LR and CTR.
    Mfspr {
        /// Target.
        rt: u8,
        /// Special register number.
        spr: u16,
    },
    /// `sc`.
    Sc,
}

#[allow(clippy::cast_possible_truncation)]
const fn reg_field(word: u32, shift: u32) -> u8 {
    ((word >> shift) & 0x1F) as u8
}

#[allow(clippy::cast_possible_truncation)]
const fn low16(word: u32) -> u16 {
    (word & 0xFFFF) as u16
}

/// SPR numbers are encoded with their two 5-bit halves swapped.
const fn swap_spr_halves(field: u16) -> u16 {
    ((field & 0x1F) << 5) | ((field >> 5) & 0x1F)
}

const fn spr_name(spr: u16) -> Option<&'static str> {
    match spr {
        SPR_LR => Some("lr"),
        SPR_CTR => Some("ctr"),
        _ => None,
    }
}

impl PpcInstruction {
    /// Decodes one instruction word.
    ///
    /// # Errors
    ///
    /// Opcodes absent from the table or documented as non-executable fault
    /// with the primary opcode; unsupported extended opcodes, SPRs, and BO
    /// values fault with an unsupported function.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn decode(word: u32) -> Result<Self, StepFault> {
        let opcode = (word >> 26) as u8;
        match primary_opcode(opcode) {
            Some((_, true)) => {}
            Some((_, false)) | None => return Err(StepFault::opcode(u32::from(opcode))),
        }
        let d = low16(word) as i16;
        let xo = ((word >> 1) & 0x3FF) as u16;
        Ok(match opcode {
            14 => Self::Addi {
                rt: reg_field(word, 21),
                ra: reg_field(word, 16),
                simm: d,
            },
            15 => Self::Addis {
                rt: reg_field(word, 21),
                ra: reg_field(word, 16),
                simm: d,
            },
            17 if word & 0x03FF_FFFF == 2 => Self::Sc,
            18 => Self::Branch {
                offset: (((word & 0x03FF_FFFC) << 6) as i32) >> 6,
                absolute: word & 2 != 0,
                link: word & 1 != 0,
            },
            19 if xo == XO_BCLR => {
                let bo = reg_field(word, 21);
                if bo != BO_ALWAYS {
                    return Err(StepFault::function(u32::from(bo)));
                }
                Self::BranchToLink {
                    link: word & 1 != 0,
                }
            }
            24 => Self::Ori {
                ra: reg_field(word, 16),
                rs: reg_field(word, 21),
                uimm: low16(word),
            },
            25 => Self::Oris {
                ra: reg_field(word, 16),
                rs: reg_field(word, 21),
                uimm: low16(word),
            },
            31 if xo == XO_MTSPR || xo == XO_MFSPR => {
                let spr = swap_spr_halves(((word >> 11) & 0x3FF) as u16);
                if spr_name(spr).is_none() {
                    return Err(StepFault::function(u32::from(spr)));
                }
                let reg = reg_field(word, 21);
                if xo == XO_MTSPR {
                    Self::Mtspr { spr, rs: reg }
                } else {
                    Self::Mfspr { rt: reg, spr }
                }
            }
            32 => Self::Lwz {
                rt: reg_field(word, 21),
                ra: reg_field(word, 16),
                d,
            },
            36 => Self::Stw {
                rs: reg_field(word, 21),
                ra: reg_field(word, 16),
                d,
            },
            _ => return Err(StepFault::function(u32::from(xo))),
        })
    }

    /// Encodes back into a 32-bit word.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn encode(&self) -> u32 {
        const fn d_form(op: u32, hi: u8, lo: u8, imm: u16) -> u32 {
            (op << 26) | ((hi as u32 & 0x1F) << 21) | ((lo as u32 & 0x1F) << 16) | imm as u32
        }
        const fn spr_form(xo: u16, reg: u8, spr: u16) -> u32 {
            (31 << 26)
                | ((reg as u32 & 0x1F) << 21)
                | ((swap_spr_halves(spr) as u32) << 11)
                | ((xo as u32) << 1)
        }
        match *self {
            Self::Addi { rt, ra, simm } => d_form(14, rt, ra, simm as u16),
            Self::Addis { rt, ra, simm } => d_form(15, rt, ra, simm as u16),
            Self::Ori { ra, rs, uimm } => d_form(24, rs, ra, uimm),
            Self::Oris { ra, rs, uimm } => d_form(25, rs, ra, uimm),
            Self::Lwz { rt, ra, d } => d_form(32, rt, ra, d as u16),
            Self::Stw { rs, ra, d } => d_form(36, rs, ra, d as u16),
            Self::Branch {
                offset,
                absolute,
                link,
            } => (18 << 26) | (offset as u32 & 0x03FF_FFFC) | ((absolute as u32) << 1) | link as u32,
            Self::BranchToLink { link } => {
                (19 << 26) | ((BO_ALWAYS as u32) << 21) | ((XO_BCLR as u32) << 1) | link as u32
            }
            Self::Mtspr { spr, rs } => spr_form(XO_MTSPR, rs, spr),
            Self::Mfspr { rt, spr } => spr_form(XO_MFSPR, rt, spr),
            Self::Sc => (17 << 26) | 2,
        }
    }

    /// `li rt, simm`.
    #[must_use]
    pub const fn li(rt: u8, simm: i16) -> Self {
        Self::Addi { rt, ra: 0, simm }
    }

    /// `lis rt, upper` (upper halfword of a 32-bit constant).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn lis(rt: u8, upper: u16) -> Self {
        Self::Addis {
            rt,
            ra: 0,
            simm: upper as i16,
        }
    }

    /// `mtlr rs`.
    #[must_use]
    pub const fn mtlr(rs: u8) -> Self {
        Self::Mtspr { spr: SPR_LR, rs }
    }

    /// `blr`.
    #[must_use]
    pub const fn blr() -> Self {
        Self::BranchToLink { link: false }
    }

    /// Two-instruction `lis`/`ori` sequence loading a 32-bit constant.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn load_constant(rt: u8, value: u32) -> [Self; 2] {
        [
            Self::lis(rt, (value >> 16) as u16),
            Self::Ori {
                ra: rt,
                rs: rt,
                uimm: (value & 0xFFFF) as u16,
            },
        ]
    }
}

impl fmt::Display for PpcInstruction {
    #[allow(clippy::cast_sign_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Addi { rt, ra, simm } => write!(f, "addi r{rt}, r{ra}, {simm}"),
            Self::Addis { rt, ra, simm } => write!(f, "addis r{rt}, r{ra}, {:#x}", simm as u16),
            Self::Ori {
                ra: 0,
                rs: 0,
                uimm: 0,
            } => f.write_str("nop"),
            Self::Ori { ra, rs, uimm } => write!(f, "ori r{ra}, r{rs}, {uimm:#x}"),
            Self::Oris { ra, rs, uimm } => write!(f, "oris r{ra}, r{rs}, {uimm:#x}"),
            Self::Lwz { rt, ra, d } => write!(f, "lwz r{rt}, {d}(r{ra})"),
            Self::Stw { rs, ra, d } => write!(f, "stw r{rs}, {d}(r{ra})"),
            Self::Branch {
                offset,
                absolute,
                link,
            } => {
                let l = if link { "l" } else { "" };
                if absolute {
                    write!(f, "b{l}a {:#010x}", offset as u32)
                } else {
                    let sign = if offset < 0 { "-" } else { "+" };
                    write!(f, "b{l} .{sign}{}", offset.unsigned_abs())
                }
            }
            Self::BranchToLink { link } => f.write_str(if link { "blrl" } else { "blr" }),
            Self::Mtspr { spr, rs } => write!(f, "mt{} r{rs}", spr_name(spr).unwrap_or("spr")),
            Self::Mfspr { rt, spr } => write!(f, "mf{} r{rt}", spr_name(spr).unwrap_or("spr")),
            Self::Sc => f.write_str("sc"),
        }
    }
}

/// PowerPC registers: 32 GPRs plus LR and CTR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpcRegisters {
    /// General registers and PC.
    pub file: RegisterFile<32>,
    /// Link register.
    pub lr: u32,
    /// Count register.
    pub ctr: u32,
}

impl PpcRegisters {
    fn gpr_or_zero(&self, index: u8) -> u32 {
        if index == 0 {
            0
        } else {
            self.file.gpr(usize::from(index))
        }
    }

    fn gpr(&self, index: u8) -> u32 {
        self.file.gpr(usize::from(index))
    }

    fn set(&mut self, index: u8, value: u32) {
        self.file.set_gpr(usize::from(index), value);
    }
}

impl ProgramCounter for PpcRegisters {
    fn pc(&self) -> u32 {
        self.file.pc()
    }

    fn set_pc(&mut self, value: u32) {
        self.file.set_pc(value);
    }
}

/// PowerPC bootstrap-subset instruction set.
#[derive(Debug, Clone, Copy)]
pub struct PowerPc;

/// Fetch-decode-execute core for the PowerPC subset.
pub type PowerPcCore = Machine<PowerPc>;

impl Isa for PowerPc {
    const ARCH: Architecture = Architecture::PowerPc;
    type Registers = PpcRegisters;
    type Instruction = PpcInstruction;

    fn decode(source: &mut dyn ByteSource) -> Result<Decoded<PpcInstruction>, StepFault> {
        let instruction = PpcInstruction::decode(source.word()?)?;
        Ok(Decoded {
            instruction,
            len: 4,
        })
    }

    #[allow(clippy::cast_sign_loss)]
    fn execute(
        instruction: &PpcInstruction,
        cx: &mut ExecContext<'_, PpcRegisters>,
    ) -> Result<ExecuteOutcome, StepFault> {
        let regs = &mut *cx.regs;
        match *instruction {
            PpcInstruction::Addi { rt, ra, simm } => {
                let value = regs.gpr_or_zero(ra).wrapping_add_signed(i32::from(simm));
                regs.set(rt, value);
            }
            PpcInstruction::Addis { rt, ra, simm } => {
                let value = regs
                    .gpr_or_zero(ra)
                    .wrapping_add((simm as u16 as u32) << 16);
                regs.set(rt, value);
            }
            PpcInstruction::Ori { ra, rs, uimm } => {
                let value = regs.gpr(rs) | u32::from(uimm);
                regs.set(ra, value);
            }
            PpcInstruction::Oris { ra, rs, uimm } => {
                let value = regs.gpr(rs) | (u32::from(uimm) << 16);
                regs.set(ra, value);
            }
            PpcInstruction::Lwz { rt, ra, d } => {
                let addr = regs.gpr_or_zero(ra).wrapping_add_signed(i32::from(d));
                let value = cx.bus.read_word(addr);
                cx.regs.set(rt, value);
            }
            PpcInstruction::Stw { rs, ra, d } => {
                let addr = regs.gpr_or_zero(ra).wrapping_add_signed(i32::from(d));
                let value = regs.gpr(rs);
                cx.bus.write_word(addr, value);
            }
            PpcInstruction::Branch {
                offset,
                absolute,
                link,
            } => {
                if link {
                    regs.lr = cx.pc.wrapping_add(4);
                }
                let target = if absolute {
                    offset as u32
                } else {
                    cx.pc.wrapping_add_signed(offset)
                };
                return Ok(ExecuteOutcome::Jump(target));
            }
            PpcInstruction::BranchToLink { link } => {
                let target = regs.lr & !3;
                if link {
                    regs.lr = cx.pc.wrapping_add(4);
                }
                return Ok(ExecuteOutcome::Jump(target));
            }
            PpcInstruction::Mtspr { spr, rs } => {
                let value = regs.gpr(rs);
                if spr == SPR_LR {
                    regs.lr = value;
                } else {
                    regs.ctr = value;
                }
            }
            PpcInstruction::Mfspr { rt, spr } => {
                let value = if spr == SPR_LR { regs.lr } else { regs.ctr };
                regs.set(rt, value);
            }
            PpcInstruction::Sc => {
                let number = regs.gpr(0);
                let arg = regs.gpr(R3);
                return cx.service(number, arg);
            }
        }
        Ok(ExecuteOutcome::Next)
    }

    fn reset(regs: &mut PpcRegisters, entry: u32, stack_top: u32) {
        regs.set_pc(entry);
        regs.set(R1, stack_top);
    }

    fn snapshot(regs: &PpcRegisters) -> RegisterSnapshot {
        RegisterSnapshot {
            architecture: Self::ARCH,
            pc: regs.pc(),
            general: (0u8..32)
                .map(|index| NamedRegister::new(&format!("r{index}"), regs.gpr(index)))
                .collect(),
            special: vec![
                NamedRegister::new("lr", regs.lr),
                NamedRegister::new("ctr", regs.ctr),
            ],
        }
    }
}
