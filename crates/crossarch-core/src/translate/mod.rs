//! Table-driven cross-ISA instruction translation.
//!
//! Each direction owns a [`RuleTable`] keyed by the mnemonic at the head of
//! the decoded instruction's canonical text. Rules map operand structure, not
//! full semantics: flags and traps are not reproduced, and composite
//! addressing modes are out of reach. A missing mnemonic is always an error.

mod mips_x86;
mod registers;
mod x86_mips;

use std::collections::HashMap;
use std::fmt;

pub use registers::RegisterCorrespondence;

use crate::isa::{Mips32, MipsInstruction, X86Instruction, X86};
use crate::machine::{decode_bytes, Isa};
use crate::{Architecture, EmulatorError};

/// One emitted target instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TranslatedInstruction {
    /// Canonical target text.
    pub text: String,
    /// Target encoding in bus order.
    pub bytes: Vec<u8>,
}

impl From<MipsInstruction> for TranslatedInstruction {
    fn from(instruction: MipsInstruction) -> Self {
        Self {
            text: instruction.to_string(),
            bytes: instruction.encode().to_le_bytes().to_vec(),
        }
    }
}

impl From<X86Instruction> for TranslatedInstruction {
    fn from(instruction: X86Instruction) -> Self {
        Self {
            text: instruction.to_string(),
            bytes: instruction.encode(),
        }
    }
}

/// Result of translating one source instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Translation {
    /// Source architecture.
    pub from: Architecture,
    /// Target architecture.
    pub to: Architecture,
    /// Canonical text of the source instruction.
    pub source_text: String,
    /// Lookup key used.
    pub mnemonic: String,
    /// Emitted target sequence, in execution order.
    pub instructions: Vec<TranslatedInstruction>,
}

impl Translation {
    /// Concatenated target encoding.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.instructions
            .iter()
            .flat_map(|instruction| instruction.bytes.iter().copied())
            .collect()
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {}):", self.source_text, self.from, self.to)?;
        for instruction in &self.instructions {
            write!(f, " {};", instruction.text)?;
        }
        Ok(())
    }
}

/// Emission function for one source mnemonic.
pub type Rule<S> =
    fn(&S, &RegisterCorrespondence) -> Result<Vec<TranslatedInstruction>, EmulatorError>;

/// Mnemonic-keyed rules for one translation direction.
#[derive(Debug, Clone)]
pub struct RuleTable<S> {
    from: Architecture,
    to: Architecture,
    rules: HashMap<&'static str, Rule<S>>,
}

impl<S: fmt::Display> RuleTable<S> {
    /// Creates an empty table for `from -> to`.
    #[must_use]
    pub fn new(from: Architecture, to: Architecture) -> Self {
        Self {
            from,
            to,
            rules: HashMap::new(),
        }
    }

    /// Registers (or replaces) the rule for `mnemonic`.
    pub fn insert(&mut self, mnemonic: &'static str, rule: Rule<S>) -> &mut Self {
        self.rules.insert(mnemonic, rule);
        self
    }

    /// Supported mnemonics, sorted.
    #[must_use]
    pub fn mnemonics(&self) -> Vec<&'static str> {
        let mut mnemonics: Vec<_> = self.rules.keys().copied().collect();
        mnemonics.sort_unstable();
        mnemonics
    }

    /// Translates one decoded instruction.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnsupportedTranslation`] when no rule matches
    /// the mnemonic, or the rule's own register/operand failure.
    pub fn apply(
        &self,
        instruction: &S,
        registers: &RegisterCorrespondence,
    ) -> Result<Translation, EmulatorError> {
        let source_text = instruction.to_string();
        let mnemonic = source_text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let Some(rule) = self.rules.get(mnemonic.as_str()) else {
            tracing::debug!(from = %self.from, to = %self.to, %mnemonic, "no translation rule");
            return Err(EmulatorError::UnsupportedTranslation {
                mnemonic,
                from: self.from,
                to: self.to,
            });
        };
        let instructions = rule(instruction, registers)?;
        tracing::debug!(
            from = %self.from,
            to = %self.to,
            source = %source_text,
            emitted = instructions.len(),
            "translated"
        );
        Ok(Translation {
            from: self.from,
            to: self.to,
            source_text,
            mnemonic,
            instructions,
        })
    }
}

/// The translation configuration: register pairing plus per-direction tables.
///
/// Built once and shared by reference; concurrent sessions never observe
/// each other's tables.
#[derive(Debug, Clone)]
pub struct TranslationTables {
    registers: RegisterCorrespondence,
    mips_to_x86: RuleTable<MipsInstruction>,
    x86_to_mips: RuleTable<X86Instruction>,
}

impl Default for TranslationTables {
    fn default() -> Self {
        Self::standard()
    }
}

impl TranslationTables {
    /// Standard MIPS <-> x86 tables with the default register pairing.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_registers(RegisterCorrespondence::default())
    }

    /// Standard tables with a custom register pairing.
    #[must_use]
    pub fn with_registers(registers: RegisterCorrespondence) -> Self {
        Self {
            registers,
            mips_to_x86: mips_x86::table(),
            x86_to_mips: x86_mips::table(),
        }
    }

    /// Register pairing in use.
    #[must_use]
    pub const fn registers(&self) -> &RegisterCorrespondence {
        &self.registers
    }

    /// MIPS to x86 rules.
    #[must_use]
    pub const fn mips_to_x86(&self) -> &RuleTable<MipsInstruction> {
        &self.mips_to_x86
    }

    /// x86 to MIPS rules.
    #[must_use]
    pub const fn x86_to_mips(&self) -> &RuleTable<X86Instruction> {
        &self.x86_to_mips
    }

    /// Whether a table exists for `from -> to`.
    #[must_use]
    pub const fn supports(from: Architecture, to: Architecture) -> bool {
        matches!(
            (from, to),
            (Architecture::Mips32, Architecture::X86) | (Architecture::X86, Architecture::Mips32)
        )
    }

    /// Decodes `bytes` as one `from` instruction and translates it to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NoTranslationTable`] for unsupported
    /// directions, [`EmulatorError::Decode`] when the bytes do not decode,
    /// and any rule failure.
    pub fn translate(
        &self,
        from: Architecture,
        to: Architecture,
        bytes: &[u8],
    ) -> Result<Translation, EmulatorError> {
        match (from, to) {
            (Architecture::Mips32, Architecture::X86) => {
                apply_decoded::<Mips32>(&self.mips_to_x86, &self.registers, bytes)
            }
            (Architecture::X86, Architecture::Mips32) => {
                apply_decoded::<X86>(&self.x86_to_mips, &self.registers, bytes)
            }
            _ => Err(EmulatorError::NoTranslationTable { from, to }),
        }
    }
}

fn apply_decoded<I: Isa>(
    table: &RuleTable<I::Instruction>,
    registers: &RegisterCorrespondence,
    bytes: &[u8],
) -> Result<Translation, EmulatorError> {
    let decoded = decode_bytes::<I>(bytes, 0)?;
    table.apply(&decoded.instruction, registers)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::TranslationTables;
    use crate::isa::x86::{AluOp, Operand, Reg32};
    use crate::isa::{MipsInstruction, MipsOp, X86Instruction};
    use crate::{Architecture, EmulatorError, FaultCode};

    fn mips(instruction: MipsInstruction) -> Vec<u8> {
        instruction.encode().to_le_bytes().to_vec()
    }

    #[test]
    fn mnemonic_is_first_token_of_canonical_text() {
        let tables = TranslationTables::standard();
        let translation = tables
            .translate(
                Architecture::Mips32,
                Architecture::X86,
                &mips(MipsInstruction::reg3(MipsOp::Add, 8, 8, 9)),
            )
            .expect("add has a rule");
        assert_eq!(translation.mnemonic, "add");
        assert_eq!(translation.source_text, "add $t0, $t0, $t1");
        assert_eq!(translation.to_string(), "add $t0, $t0, $t1 (MIPS32 -> x86): add eax, ecx;");
    }

    #[test]
    fn missing_mnemonic_fails_explicitly() {
        let tables = TranslationTables::standard();
        let result = tables.translate(
            Architecture::Mips32,
            Architecture::X86,
            &mips(MipsInstruction::imm(MipsOp::Lw, 8, 29, 4)),
        );
        assert_eq!(
            result,
            Err(EmulatorError::UnsupportedTranslation {
                mnemonic: "lw".to_string(),
                from: Architecture::Mips32,
                to: Architecture::X86,
            })
        );
    }

    #[rstest]
    #[case(Architecture::Arm, Architecture::X86)]
    #[case(Architecture::Mips32, Architecture::PowerPc)]
    #[case(Architecture::PowerPc, Architecture::Arm)]
    fn unsupported_direction_has_no_table(#[case] from: Architecture, #[case] to: Architecture) {
        let tables = TranslationTables::standard();
        assert!(!TranslationTables::supports(from, to));
        assert_eq!(
            tables.translate(from, to, &[0; 4]),
            Err(EmulatorError::NoTranslationTable { from, to })
        );
    }

    #[test]
    fn undecodable_source_reports_decode_fault() {
        let tables = TranslationTables::standard();
        let Err(EmulatorError::Decode(record)) =
            tables.translate(Architecture::X86, Architecture::Mips32, &[0x0F, 0x05])
        else {
            panic!("0f 05 is outside the x86 subset");
        };
        assert_eq!(record.code, FaultCode::UnsupportedOpcode);
    }

    #[test]
    fn tables_list_their_mnemonics() {
        let tables = TranslationTables::standard();
        assert_eq!(
            tables.x86_to_mips().mnemonics(),
            ["add", "and", "mov", "nop", "or", "sub", "xor"]
        );
        assert_eq!(tables.mips_to_x86().mnemonics().len(), 14);
    }

    #[test]
    fn translated_bytes_concatenate_in_order() {
        let tables = TranslationTables::standard();
        let source = X86Instruction::Alu {
            op: AluOp::Add,
            dst: Reg32::Eax,
            src: Operand::Imm(0x0012_3456),
        };
        let translation = tables
            .translate(Architecture::X86, Architecture::Mips32, &source.encode())
            .expect("add imm has a rule");
        assert_eq!(translation.instructions.len(), 3);
        assert_eq!(translation.bytes().len(), 12);
    }
}
