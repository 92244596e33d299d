//! Register files and the core lifecycle state machine.

/// Generic register-file storage.
pub mod registers;
/// Lifecycle states and halt reasons.
pub mod run_state;

pub use registers::{ProgramCounter, RegisterFile};
pub use run_state::{HaltReason, RunState};
