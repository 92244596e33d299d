use std::fmt;

use thiserror::Error;

use crate::{Architecture, HaltReason, ImageError};

/// Fault classes used for diagnostics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder found no handler for the instruction encoding.
    Decode,
    /// System-service request the core does not provide.
    Service,
}

/// Stable fault taxonomy for faults raised inside a single instruction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultCode {
    /// Primary opcode has no handler.
    #[error("unsupported opcode")]
    UnsupportedOpcode = 0x01,
    /// Secondary function/extended opcode field has no handler.
    #[error("unsupported function code")]
    UnsupportedFunction = 0x02,
    /// System-call service number has no handler.
    #[error("unsupported system service")]
    UnsupportedSyscall = 0x03,
    /// Instruction bytes ended before the encoding was complete.
    #[error("truncated instruction encoding")]
    TruncatedInstruction = 0x04,
    /// Breakpoint instruction executed.
    #[error("breakpoint")]
    Breakpoint = 0x05,
}

impl FaultCode {
    /// Converts a fault code to its stable numeric value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable numeric value back into a fault code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::UnsupportedOpcode),
            0x02 => Some(Self::UnsupportedFunction),
            0x03 => Some(Self::UnsupportedSyscall),
            0x04 => Some(Self::TruncatedInstruction),
            0x05 => Some(Self::Breakpoint),
            _ => None,
        }
    }

    /// Returns the diagnostics class for this fault code.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::UnsupportedOpcode
            | Self::UnsupportedFunction
            | Self::TruncatedInstruction
            | Self::Breakpoint => FaultClass::Decode,
            Self::UnsupportedSyscall => FaultClass::Service,
        }
    }
}

/// Fault raised by a decode or execute handler, before the cycle loop attaches
/// the program counter and raw instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepFault {
    /// Fault taxonomy entry.
    pub code: FaultCode,
    /// Offending opcode, function code, or service number.
    pub detail: u32,
}

impl StepFault {
    /// Creates a step fault.
    #[must_use]
    pub const fn new(code: FaultCode, detail: u32) -> Self {
        Self { code, detail }
    }

    /// Unsupported primary opcode.
    #[must_use]
    pub const fn opcode(detail: u32) -> Self {
        Self::new(FaultCode::UnsupportedOpcode, detail)
    }

    /// Unsupported function/extended opcode.
    #[must_use]
    pub const fn function(detail: u32) -> Self {
        Self::new(FaultCode::UnsupportedFunction, detail)
    }

    /// Attaches the faulting program counter and raw instruction word.
    #[must_use]
    pub const fn at(self, pc: u32, raw: u32) -> FaultRecord {
        FaultRecord {
            code: self.code,
            pc,
            raw,
            detail: self.detail,
        }
    }
}

/// Recorded cause of a core halt: what failed, where, and on which encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{code} at pc={pc:#010x} (raw {raw:#010x}, detail {detail:#x})")]
pub struct FaultRecord {
    /// Fault taxonomy entry.
    pub code: FaultCode,
    /// Program counter of the faulting instruction.
    pub pc: u32,
    /// Raw instruction word (first four bytes, little-endian).
    pub raw: u32,
    /// Offending opcode, function code, or service number.
    pub detail: u32,
}

/// Boundary failures surfaced to the caller as explicit results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    /// Image rejected before any core started.
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    /// Architecture tag outside the enumerated set.
    #[error("unknown architecture tag `{0}`")]
    UnknownArchitecture(String),
    /// The translation table for this direction has no rule for the mnemonic.
    #[error("no {from} -> {to} translation rule for `{mnemonic}`")]
    UnsupportedTranslation {
        /// Mnemonic extracted from the source instruction.
        mnemonic: String,
        /// Source architecture.
        from: Architecture,
        /// Target architecture.
        to: Architecture,
    },
    /// No translation table exists for this direction.
    #[error("no translation table for {from} -> {to}")]
    NoTranslationTable {
        /// Source architecture.
        from: Architecture,
        /// Target architecture.
        to: Architecture,
    },
    /// A source register has no counterpart in the target register model.
    #[error("register {register} has no {target} counterpart")]
    UnmappedRegister {
        /// Source register name.
        register: String,
        /// Target architecture.
        target: Architecture,
    },
    /// The rule exists but cannot express this operand shape.
    #[error("`{instruction}` cannot be translated: {reason}")]
    UnsupportedOperands {
        /// Canonical source instruction text.
        instruction: String,
        /// Which operand shape is not expressible.
        reason: &'static str,
    },
    /// Instruction bytes handed to the dispatcher or translator failed to decode.
    #[error("decode failed: {0}")]
    Decode(FaultRecord),
    /// The core has already halted and no longer accepts instructions.
    #[error("core halted: {0}")]
    CoreHalted(HaltReason),
    /// Run requested on a core with no image loaded.
    #[error("no image loaded")]
    NotLoaded,
    /// Worker thread panicked before reporting an outcome.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decode => "decode",
            Self::Service => "service",
        })
    }
}
