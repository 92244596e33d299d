//! Architecture tags accepted at the host boundary.

use std::fmt;
use std::str::FromStr;

use crate::EmulatorError;

/// Enumerated instruction-set architectures with an emulation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Architecture {
    /// 32-bit MIPS (little-endian, no delay slots).
    Mips32,
    /// 32-bit ARM (A32 encoding).
    Arm,
    /// 32-bit x86 register subset.
    X86,
    /// 32-bit PowerPC bootstrap subset.
    PowerPc,
}

impl Architecture {
    /// Every architecture in canonical order.
    pub const ALL: [Self; 4] = [Self::Mips32, Self::Arm, Self::X86, Self::PowerPc];

    /// Canonical tag string for this architecture.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Mips32 => "MIPS32",
            Self::Arm => "ARM",
            Self::X86 => "x86",
            Self::PowerPc => "PowerPC",
        }
    }

    /// Number of general-purpose registers in the core's register file.
    #[must_use]
    pub const fn register_count(self) -> usize {
        match self {
            Self::Mips32 | Self::PowerPc => 32,
            Self::Arm => 16,
            Self::X86 => 8,
        }
    }

    /// Fixed instruction width in bytes, or `None` for byte-stream encodings.
    #[must_use]
    pub const fn instruction_width(self) -> Option<u32> {
        match self {
            Self::Mips32 | Self::Arm | Self::PowerPc => Some(4),
            Self::X86 => None,
        }
    }

    /// Default load address used when the host does not supply one.
    #[must_use]
    pub const fn reset_vector(self) -> u32 {
        match self {
            Self::Mips32 | Self::Arm | Self::X86 | Self::PowerPc => 0x0000_0000,
        }
    }

    /// Parses an architecture tag, accepting common aliases case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnknownArchitecture`] for tags outside the
    /// enumerated set.
    pub fn from_tag(tag: &str) -> Result<Self, EmulatorError> {
        let normalized = tag.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "mips32" | "mips" | "mipsel" | "mips32el" => Ok(Self::Mips32),
            "arm" | "arm32" | "armv4" | "a32" => Ok(Self::Arm),
            "x86" | "i386" | "x86-32" | "ia32" | "x86-64" | "x86_64" | "amd64" => Ok(Self::X86),
            "powerpc" | "ppc" | "ppc32" | "powerpc32" => Ok(Self::PowerPc),
            _ => Err(EmulatorError::UnknownArchitecture(tag.to_string())),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Architecture {
    type Err = EmulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}
