//! Multi-architecture instruction-set emulation core.
//!
//! Per-architecture fetch-decode-execute cores (MIPS32, ARM, x86, PowerPC)
//! share one address-space model and one execution contract. A dispatcher
//! routes single instructions either to a same-architecture core or through
//! a table-driven translator to another ISA.

/// Architecture tags.
pub mod arch;
pub use arch::Architecture;

/// Fault taxonomy and boundary errors.
pub mod fault;
pub use fault::{EmulatorError, FaultClass, FaultCode, FaultRecord, StepFault};

/// Bus and fault counters.
pub mod diag;
pub use diag::Diagnostics;

/// Image limits and the firmware-descriptor contract.
pub mod image;
pub use image::{ArchitectureDetector, FirmwareDescriptor, ImageError, MAX_IMAGE_BYTES};

/// Host-facing notifications and sinks.
pub mod notify;
pub use notify::{
    console_text, ChannelSink, Notification, NotificationSink, NullSink, RecordingSink,
};

/// Address space, region map, and MMIO peripherals.
pub mod memory;
pub use memory::{AddressSpace, IO_BASE, RAM_BASE, ROM_BASE, UNMAPPED_READ_SENTINEL};

/// Register files and lifecycle state.
pub mod state;
pub use state::{HaltReason, ProgramCounter, RegisterFile, RunState};

/// Execution contract shared by every core.
pub mod api;
pub use api::{
    Core, CoreConfig, MemorySnapshot, NamedRegister, RegisterSnapshot, RunOutcome, StepOutcome,
    StopHandle, DEFAULT_STOP_CHECK_INTERVAL,
};

/// Shared cycle loop and the per-ISA seam.
pub mod machine;
pub use machine::{Isa, Machine};

/// MIPS32, ARM, x86, and PowerPC instruction sets.
pub mod isa;
pub use isa::{ArmCore, MipsCore, PowerPcCore, X86Core};

/// Tagged-variant core selection.
pub mod cores;
pub use cores::AnyCore;

/// Cross-ISA translation tables.
pub mod translate;
pub use translate::{
    RegisterCorrespondence, RuleTable, TranslatedInstruction, Translation, TranslationTables,
};

/// Native-or-translated instruction routing.
pub mod dispatch;
pub use dispatch::{DispatchOutcome, Dispatcher};

/// Synthetic PowerPC boot sequence.
pub mod boot;
pub use boot::{BootImage, BootMonitor, BootReport, BootStage, BootloaderBuilder, BOOT_SIGNATURE};

/// Linear-sweep disassembly.
pub mod disasm;
pub use disasm::{disassemble, DisassemblyRow};

/// Cores on worker threads.
pub mod worker;
pub use worker::{spawn, WorkerHandle, WorkerReport};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
