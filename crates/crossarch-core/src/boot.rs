//! Synthetic PowerPC boot sequence.
//!
//! [`BootloaderBuilder`] emits a fixed boot program: set up the stack, store
//! a signature word to RAM, load the payload entry point into LR, and branch
//! to it. [`BootMonitor`] tracks progress from retired PCs alone, so a boot
//! run is reproducible step for step.

use std::fmt;

use crate::api::{Core, StepOutcome};
use crate::isa::powerpc::{PpcInstruction, R1};
use crate::memory::{DEFAULT_RAM_BYTES, RAM_BASE, ROM_BASE};
use crate::{HaltReason, ImageError, Notification, NotificationSink};

/// Word stored at the signature address once the stack is ready (`"BOOT"`).
pub const BOOT_SIGNATURE: u32 = 0x424F_4F54;

/// Default payload entry point.
pub const DEFAULT_ENTRY: u32 = 0x100;

const SIGNATURE_BASE_REG: u8 = 4;
const SIGNATURE_VALUE_REG: u8 = 5;
const ENTRY_REG: u8 = 3;

/// Boot progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BootStage {
    /// Core reset; nothing executed yet.
    Reset,
    /// Stack pointer holds the stack top.
    StackSetup,
    /// Boot signature stored to RAM.
    SignatureWritten,
    /// Payload entry point loaded into a register.
    EntryLoaded,
    /// Control transferred to the payload.
    HandedOff,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reset => "reset",
            Self::StackSetup => "stack-setup",
            Self::SignatureWritten => "signature-written",
            Self::EntryLoaded => "entry-loaded",
            Self::HandedOff => "handed-off",
        })
    }
}

/// Builder for the boot program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderBuilder {
    base: u32,
    entry: u32,
    stack_top: u32,
    signature_address: u32,
}

impl Default for BootloaderBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY)
    }
}

impl BootloaderBuilder {
    /// Boot program at ROM base handing off to `entry`, with the stack at the
    /// top of a default-sized RAM and the signature at the start of RAM.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(entry: u32) -> Self {
        Self {
            base: ROM_BASE,
            entry,
            stack_top: RAM_BASE.wrapping_add(DEFAULT_RAM_BYTES as u32),
            signature_address: RAM_BASE,
        }
    }

    /// Address the boot program itself is placed at.
    #[must_use]
    pub const fn base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    /// Initial stack pointer.
    #[must_use]
    pub const fn stack_top(mut self, stack_top: u32) -> Self {
        self.stack_top = stack_top;
        self
    }

    /// Address the boot signature is stored at.
    #[must_use]
    pub const fn signature_address(mut self, address: u32) -> Self {
        self.signature_address = address;
        self
    }

    /// Emits the boot program.
    #[must_use]
    pub fn build(&self) -> BootImage {
        let mut program = Vec::with_capacity(11);
        let mut marks = Vec::with_capacity(4);
        let mut mark = |program: &[PpcInstruction], stage| {
            let last = program.len().saturating_sub(1);
            marks.push((self.address_of(last), stage));
        };

        program.extend(PpcInstruction::load_constant(R1, self.stack_top));
        mark(&program, BootStage::StackSetup);

        program.extend(PpcInstruction::load_constant(
            SIGNATURE_BASE_REG,
            self.signature_address,
        ));
        program.extend(PpcInstruction::load_constant(
            SIGNATURE_VALUE_REG,
            BOOT_SIGNATURE,
        ));
        program.push(PpcInstruction::Stw {
            rs: SIGNATURE_VALUE_REG,
            ra: SIGNATURE_BASE_REG,
            d: 0,
        });
        mark(&program, BootStage::SignatureWritten);

        program.extend(PpcInstruction::load_constant(ENTRY_REG, self.entry));
        mark(&program, BootStage::EntryLoaded);

        program.push(PpcInstruction::mtlr(ENTRY_REG));
        program.push(PpcInstruction::blr());
        mark(&program, BootStage::HandedOff);

        BootImage {
            program,
            base: self.base,
            entry: self.entry,
            stack_top: self.stack_top,
            signature_address: self.signature_address,
            marks,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn address_of(&self, index: usize) -> u32 {
        self.base.wrapping_add((index as u32) * 4)
    }
}

/// Emitted boot program plus the PCs at which each stage completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImage {
    program: Vec<PpcInstruction>,
    base: u32,
    entry: u32,
    stack_top: u32,
    signature_address: u32,
    marks: Vec<(u32, BootStage)>,
}

impl BootImage {
    /// Boot instructions in order.
    #[must_use]
    pub fn program(&self) -> &[PpcInstruction] {
        &self.program
    }

    /// Encoded instruction words.
    #[must_use]
    pub fn words(&self) -> Vec<u32> {
        self.program.iter().map(PpcInstruction::encode).collect()
    }

    /// Boot program bytes in bus order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words()
            .into_iter()
            .flat_map(u32::to_le_bytes)
            .collect()
    }

    /// Load address of the boot program.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Payload entry point.
    #[must_use]
    pub const fn entry(&self) -> u32 {
        self.entry
    }

    /// Stack pointer value set during boot.
    #[must_use]
    pub const fn stack_top(&self) -> u32 {
        self.stack_top
    }

    /// Where the signature is stored.
    #[must_use]
    pub const fn signature_address(&self) -> u32 {
        self.signature_address
    }

    /// `(pc, stage)` pairs: retiring the instruction at `pc` completes `stage`.
    #[must_use]
    pub fn stage_marks(&self) -> &[(u32, BootStage)] {
        &self.marks
    }

    /// First address past the boot program.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn end(&self) -> u32 {
        self.base.wrapping_add((self.program.len() as u32) * 4)
    }

    /// Boot program followed by `payload` at the entry point, zero-padded
    /// between them, as one image loadable at [`BootImage::base`].
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::PayloadOverlap`] when the entry point lies
    /// before the end of the boot program.
    pub fn with_payload(&self, payload: &[u8]) -> Result<Vec<u8>, ImageError> {
        let boot_end = self.end();
        if self.entry < boot_end {
            return Err(ImageError::PayloadOverlap {
                entry: self.entry,
                boot_end,
            });
        }
        let mut image = self.to_bytes();
        image.resize((self.entry - self.base) as usize, 0);
        image.extend_from_slice(payload);
        Ok(image)
    }
}

/// Tracks boot progress from retired PCs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootMonitor {
    marks: Vec<(u32, BootStage)>,
    entry: u32,
    stage: BootStage,
}

impl BootMonitor {
    /// Monitor for `image`, starting at [`BootStage::Reset`].
    #[must_use]
    pub fn new(image: &BootImage) -> Self {
        Self {
            marks: image.marks.clone(),
            entry: image.entry,
            stage: BootStage::Reset,
        }
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> BootStage {
        self.stage
    }

    /// Whether control reached the payload.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == BootStage::HandedOff
    }

    /// Feeds one retired instruction; returns the stage it completed, if any.
    ///
    /// Stages advance strictly in order. Hand-off also requires the next PC
    /// to be the payload entry point.
    pub fn observe(&mut self, retired_pc: u32, next_pc: u32) -> Option<BootStage> {
        let &(pc, stage) = self.marks.iter().find(|(_, stage)| *stage > self.stage)?;
        if pc != retired_pc || (stage == BootStage::HandedOff && next_pc != self.entry) {
            return None;
        }
        self.stage = stage;
        Some(stage)
    }
}

/// Outcome of [`BootMonitor::drive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    /// Last stage reached.
    pub stage: BootStage,
    /// Instructions retired while driving.
    pub steps: u64,
    /// `(stage, instruction count)` at each transition after reset.
    pub transitions: Vec<(BootStage, u64)>,
    /// Halt reason if the core stopped before hand-off.
    pub halt: Option<HaltReason>,
}

impl BootReport {
    /// Whether the payload was reached.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.stage == BootStage::HandedOff
    }
}

impl BootMonitor {
    /// Steps `core` until hand-off, halt, or `max_steps` retired instructions,
    /// reporting each stage to `sink`.
    pub fn drive(
        &mut self,
        core: &mut dyn Core,
        max_steps: u64,
        sink: &mut dyn NotificationSink,
    ) -> BootReport {
        if self.stage == BootStage::Reset {
            sink.notify(Notification::BootStage(BootStage::Reset));
        }
        let mut steps = 0;
        let mut transitions = Vec::new();
        let mut halt = None;
        while !self.is_complete() && steps < max_steps {
            match core.step() {
                StepOutcome::Retired { pc, .. } => {
                    steps += 1;
                    if let Some(stage) = self.observe(pc, core.program_counter()) {
                        tracing::info!(%stage, pc = format_args!("{pc:#010x}"), steps, "boot stage");
                        transitions.push((stage, core.instruction_count()));
                        sink.notify(Notification::BootStage(stage));
                    }
                }
                StepOutcome::Halted(reason) => {
                    halt = Some(reason);
                    break;
                }
                StepOutcome::Idle => break,
            }
        }
        if !self.is_complete() {
            tracing::warn!(stage = %self.stage, steps, ?halt, "boot did not reach hand-off");
        }
        BootReport {
            stage: self.stage,
            steps,
            transitions,
            halt,
        }
    }
}
