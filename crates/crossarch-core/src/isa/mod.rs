//! Per-architecture instruction sets.

/// ARM A32 subset.
pub mod arm;
/// MIPS32 integer subset.
pub mod mips;
/// PowerPC bootstrap subset.
pub mod powerpc;
/// x86 32-bit register/immediate subset.
pub mod x86;

pub use arm::{Arm, ArmCore, ArmInstruction};
pub use mips::{Mips32, MipsCore, MipsInstruction, MipsOp};
pub use powerpc::{PowerPc, PowerPcCore, PpcInstruction, PpcRegisters};
pub use x86::{X86Core, X86Instruction, X86};
