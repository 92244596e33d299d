//! Execution contract shared by every per-architecture core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::memory::{AddressSpace, DEFAULT_RAM_BYTES, DEFAULT_ROM_BYTES, RAM_BASE, ROM_BASE};
use crate::{
    Architecture, Diagnostics, EmulatorError, HaltReason, ImageError, NotificationSink, RunState,
    MAX_IMAGE_BYTES,
};

/// Default number of instructions between cancellation checks.
pub const DEFAULT_STOP_CHECK_INTERVAL: u32 = 64;

/// Per-core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoreConfig {
    /// Load address override; `None` uses the architecture reset vector.
    pub load_address: Option<u32>,
    /// Minimum ROM buffer size in bytes.
    pub rom_bytes: usize,
    /// RAM buffer size in bytes.
    pub ram_bytes: usize,
    /// Halts with [`HaltReason::BudgetExhausted`] after this many instructions.
    pub max_instructions: Option<u64>,
    /// Instructions retired between stop-flag checks (treated as at least 1).
    pub stop_check_interval: u32,
    /// Emits a `trace!` event per retired instruction.
    pub trace_instructions: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            load_address: None,
            rom_bytes: DEFAULT_ROM_BYTES,
            ram_bytes: DEFAULT_RAM_BYTES,
            max_instructions: None,
            stop_check_interval: DEFAULT_STOP_CHECK_INTERVAL,
            trace_instructions: false,
        }
    }
}

impl CoreConfig {
    /// Rejects region sizes larger than [`MAX_IMAGE_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::RegionTooLarge`] naming the first oversized region.
    pub const fn validate(&self) -> Result<(), ImageError> {
        if self.rom_bytes > MAX_IMAGE_BYTES {
            return Err(ImageError::RegionTooLarge {
                region: "rom",
                len: self.rom_bytes,
                limit: MAX_IMAGE_BYTES,
            });
        }
        if self.ram_bytes > MAX_IMAGE_BYTES {
            return Err(ImageError::RegionTooLarge {
                region: "ram",
                len: self.ram_bytes,
                limit: MAX_IMAGE_BYTES,
            });
        }
        Ok(())
    }
}

/// Shared cooperative stop flag.
///
/// Clones observe the same flag. A stop takes effect at the next checked
/// cycle boundary, never mid-instruction.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Creates a cleared stop flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the owning run loop stop.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether a stop was requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StepOutcome {
    /// One instruction retired.
    Retired {
        /// Address of the retired instruction.
        pc: u32,
        /// First four instruction bytes, little-endian.
        raw: u32,
        /// Encoded length in bytes.
        len: u32,
    },
    /// Core is (now) halted.
    Halted(HaltReason),
    /// No image loaded; nothing executed.
    Idle,
}

/// Result of a run-until-halted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunOutcome {
    /// Instructions retired during this call.
    pub steps: u64,
    /// Why the loop ended.
    pub halt: HaltReason,
}

/// One named register value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NamedRegister {
    /// Conventional assembler name.
    pub name: String,
    /// Current value.
    pub value: u32,
}

impl NamedRegister {
    /// Creates a named register entry.
    #[must_use]
    pub fn new(name: &str, value: u32) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// Read-only register view.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterSnapshot {
    /// Architecture the registers belong to.
    pub architecture: Architecture,
    /// Program counter.
    pub pc: u32,
    /// General-purpose registers in index order.
    pub general: Vec<NamedRegister>,
    /// Special registers (status, link, counter).
    pub special: Vec<NamedRegister>,
}

impl RegisterSnapshot {
    /// Looks a register up by name in both banks.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u32> {
        if name.eq_ignore_ascii_case("pc") {
            return Some(self.pc);
        }
        self.general
            .iter()
            .chain(&self.special)
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.value)
    }
}

/// Read-only copy of the backing memory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemorySnapshot {
    /// Base of the ROM region.
    pub rom_base: u32,
    /// ROM contents.
    pub rom: Vec<u8>,
    /// Base of the RAM region.
    pub ram_base: u32,
    /// RAM contents.
    pub ram: Vec<u8>,
}

impl MemorySnapshot {
    /// Copies ROM and RAM out of an address space.
    #[must_use]
    pub fn capture(space: &AddressSpace) -> Self {
        Self {
            rom_base: ROM_BASE,
            rom: space.rom().to_vec(),
            ram_base: RAM_BASE,
            ram: space.ram().to_vec(),
        }
    }
}

/// Capability set every core implements: load, step, run, introspect.
pub trait Core: Send {
    /// Architecture this core emulates.
    fn architecture(&self) -> Architecture;

    /// Loads an image into a fresh address space and resets registers.
    ///
    /// `load_address` overrides the configured address, which in turn
    /// overrides the architecture reset vector.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::InvalidImage`] before touching core state when
    /// the image is rejected.
    fn load(&mut self, image: &[u8], load_address: Option<u32>) -> Result<(), EmulatorError>;

    /// Executes one instruction at the current PC.
    fn step(&mut self) -> StepOutcome;

    /// Steps until halted, checking `stop` at cycle boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::NotLoaded`] when no image was loaded.
    fn run(&mut self, stop: &StopHandle) -> Result<RunOutcome, EmulatorError>;

    /// Decodes and executes one instruction from `bytes` at the current PC.
    ///
    /// An idle core is given a blank address space first.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Decode`] when `bytes` do not decode and
    /// [`EmulatorError::CoreHalted`] when the core is already halted.
    fn execute_instruction(&mut self, bytes: &[u8]) -> Result<StepOutcome, EmulatorError>;

    /// Moves the core to `Halted(Requested)` unless already halted.
    fn request_halt(&mut self);

    /// Current lifecycle state.
    fn run_state(&self) -> RunState;

    /// Current program counter.
    fn program_counter(&self) -> u32;

    /// Instructions retired since load.
    fn instruction_count(&self) -> u64;

    /// First four bytes at the current PC, little-endian.
    fn current_instruction(&self) -> u32;

    /// Named register view.
    fn registers(&self) -> RegisterSnapshot;

    /// Borrowed address space.
    fn memory(&self) -> &AddressSpace;

    /// Copy of ROM and RAM.
    fn memory_snapshot(&self) -> MemorySnapshot {
        MemorySnapshot::capture(self.memory())
    }

    /// Bus and fault counters.
    fn diagnostics(&self) -> Diagnostics {
        *self.memory().diagnostics()
    }

    /// Replaces the notification sink.
    fn set_sink(&mut self, sink: Box<dyn NotificationSink + Send>);
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{CoreConfig, NamedRegister, RegisterSnapshot, StopHandle};
    use crate::{Architecture, ImageError, MAX_IMAGE_BYTES};

    #[test]
    fn stop_handle_clones_share_flag() {
        let stop = StopHandle::new();
        let observer = stop.clone();
        assert!(!observer.is_stop_requested());
        stop.request_stop();
        assert!(observer.is_stop_requested());
    }

    #[test]
    fn default_config_uses_reset_vector_and_default_buffers() {
        let config = CoreConfig::default();
        assert_eq!(config.load_address, None);
        assert_eq!(config.rom_bytes, 64 * 1024);
        assert_eq!(config.ram_bytes, 1024 * 1024);
        assert!(config.stop_check_interval >= 1);
    }

    #[rstest]
    #[case(MAX_IMAGE_BYTES + 1, 1024, "rom")]
    #[case(1024, MAX_IMAGE_BYTES + 1, "ram")]
    #[case(usize::MAX, usize::MAX, "rom")]
    fn oversized_regions_are_rejected(
        #[case] rom_bytes: usize,
        #[case] ram_bytes: usize,
        #[case] expected: &str,
    ) {
        let config = CoreConfig {
            rom_bytes,
            ram_bytes,
            ..CoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ImageError::RegionTooLarge { region, limit, .. })
                if region == expected && limit == MAX_IMAGE_BYTES
        ));
    }

    #[test]
    fn regions_at_the_ceiling_are_accepted() {
        let config = CoreConfig {
            rom_bytes: MAX_IMAGE_BYTES,
            ram_bytes: MAX_IMAGE_BYTES,
            ..CoreConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn snapshot_lookup_is_case_insensitive_across_banks() {
        let snapshot = RegisterSnapshot {
            architecture: Architecture::Arm,
            pc: 0x40,
            general: vec![NamedRegister::new("r0", 7)],
            special: vec![NamedRegister::new("cpsr", 0x6000_0000)],
        };
        assert_eq!(snapshot.get("R0"), Some(7));
        assert_eq!(snapshot.get("CPSR"), Some(0x6000_0000));
        assert_eq!(snapshot.get("pc"), Some(0x40));
        assert_eq!(snapshot.get("r9"), None);
    }
}
