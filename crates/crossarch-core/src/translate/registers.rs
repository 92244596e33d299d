//! Register correspondence between the MIPS and x86 register models.

use crate::isa::mips::register_name;
use crate::isa::x86::{Operand, Reg32};
use crate::{Architecture, EmulatorError};

/// `$zero`.
const MIPS_ZERO: u8 = 0;

/// Bidirectional x86 / MIPS register pairing.
///
/// `$zero` never appears in the pairing; it may only be read, and reads
/// translate to the immediate `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterCorrespondence {
    pairs: Vec<(Reg32, u8)>,
}

impl Default for RegisterCorrespondence {
    fn default() -> Self {
        Self::new(vec![
            (Reg32::Eax, 8),  // $t0
            (Reg32::Ecx, 9),  // $t1
            (Reg32::Edx, 10), // $t2
            (Reg32::Ebx, 11), // $t3
            (Reg32::Esp, 29), // $sp
            (Reg32::Ebp, 30), // $fp
            (Reg32::Esi, 16), // $s0
            (Reg32::Edi, 17), // $s1
        ])
    }
}

impl RegisterCorrespondence {
    /// Builds a pairing; later duplicates of either side are ignored on lookup.
    #[must_use]
    pub const fn new(pairs: Vec<(Reg32, u8)>) -> Self {
        Self { pairs }
    }

    /// Configured pairs in insertion order.
    #[must_use]
    pub fn pairs(&self) -> &[(Reg32, u8)] {
        &self.pairs
    }

    /// MIPS register number paired with `reg`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnmappedRegister`] when `reg` is unpaired.
    pub fn mips_for(&self, reg: Reg32) -> Result<u8, EmulatorError> {
        self.pairs
            .iter()
            .find_map(|(x86, mips)| (*x86 == reg).then_some(*mips))
            .ok_or_else(|| EmulatorError::UnmappedRegister {
                register: reg.name().to_string(),
                target: Architecture::Mips32,
            })
    }

    /// x86 register paired with MIPS register `index`, as a destination.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnmappedRegister`] for unpaired registers,
    /// including `$zero`.
    pub fn x86_for(&self, index: u8) -> Result<Reg32, EmulatorError> {
        self.pairs
            .iter()
            .find_map(|(x86, mips)| (*mips == index).then_some(*x86))
            .ok_or_else(|| EmulatorError::UnmappedRegister {
                register: register_name(index).to_string(),
                target: Architecture::X86,
            })
    }

    /// x86 operand for MIPS register `index` read as a source.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnmappedRegister`] for unpaired registers
    /// other than `$zero`.
    pub fn x86_source(&self, index: u8) -> Result<Operand, EmulatorError> {
        if index == MIPS_ZERO {
            return Ok(Operand::Imm(0));
        }
        self.x86_for(index).map(Operand::Reg)
    }
}

#[cfg(test)]
mod tests {
    use super::RegisterCorrespondence;
    use crate::isa::x86::{Operand, Reg32};
    use crate::{Architecture, EmulatorError};

    #[test]
    fn default_pairing_is_bidirectional() {
        let registers = RegisterCorrespondence::default();
        for (x86, mips) in registers.pairs() {
            assert_eq!(registers.mips_for(*x86), Ok(*mips));
            assert_eq!(registers.x86_for(*mips), Ok(*x86));
        }
    }

    #[test]
    fn zero_is_a_source_only() {
        let registers = RegisterCorrespondence::default();
        assert_eq!(registers.x86_source(0), Ok(Operand::Imm(0)));
        assert_eq!(
            registers.x86_for(0),
            Err(EmulatorError::UnmappedRegister {
                register: "$zero".to_string(),
                target: Architecture::X86,
            })
        );
    }

    #[test]
    fn unpaired_registers_are_reported_by_name() {
        let registers = RegisterCorrespondence::new(vec![(Reg32::Eax, 8)]);
        assert!(matches!(
            registers.mips_for(Reg32::Edi),
            Err(EmulatorError::UnmappedRegister { register, .. }) if register == "edi"
        ));
        assert!(matches!(
            registers.x86_source(31),
            Err(EmulatorError::UnmappedRegister { register, .. }) if register == "$ra"
        ));
    }
}
