//! Single-instruction routing between native execution and translation.

use std::collections::HashMap;

use crate::api::{Core, CoreConfig, StepOutcome};
use crate::cores::AnyCore;
use crate::translate::{Translation, TranslationTables};
use crate::{Architecture, EmulatorError};

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Source and target matched; the instruction ran natively.
    Executed {
        /// Core that ran it.
        architecture: Architecture,
        /// Step result.
        step: StepOutcome,
    },
    /// The instruction was translated and the sequence ran on the target core.
    Translated {
        /// Emitted target sequence.
        translation: Translation,
        /// One outcome per executed target instruction; stops early on halt.
        steps: Vec<StepOutcome>,
    },
}

/// Routes instructions to per-architecture cores, translating when the
/// source and target architectures differ.
///
/// Holds no translation logic of its own; the tables are borrowed.
#[derive(Debug)]
pub struct Dispatcher<'t> {
    tables: &'t TranslationTables,
    config: CoreConfig,
    cores: HashMap<Architecture, AnyCore>,
}

impl<'t> Dispatcher<'t> {
    /// Creates a dispatcher; cores are built on first use with `config`.
    #[must_use]
    pub fn new(tables: &'t TranslationTables, config: CoreConfig) -> Self {
        Self {
            tables,
            config,
            cores: HashMap::new(),
        }
    }

    /// The core for `architecture`, if one has been built.
    #[must_use]
    pub fn core(&self, architecture: Architecture) -> Option<&AnyCore> {
        self.cores.get(&architecture)
    }

    /// The core for `architecture`, building it when absent.
    pub fn core_mut(&mut self, architecture: Architecture) -> &mut AnyCore {
        let config = &self.config;
        self.cores
            .entry(architecture)
            .or_insert_with(|| AnyCore::new(architecture, config.clone()))
    }

    /// Parses both tags, then routes as [`Dispatcher::dispatch_arch`].
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnknownArchitecture`] for either tag, plus
    /// every failure of [`Dispatcher::dispatch_arch`].
    pub fn dispatch(
        &mut self,
        bytes: &[u8],
        source: &str,
        target: &str,
    ) -> Result<DispatchOutcome, EmulatorError> {
        let from = Architecture::from_tag(source)?;
        let to = Architecture::from_tag(target)?;
        self.dispatch_arch(bytes, from, to)
    }

    /// Executes `bytes` natively when `from == to`; otherwise translates and
    /// executes the emitted sequence on the `to` core.
    ///
    /// # Errors
    ///
    /// Returns decode, translation, and halted-core errors; nothing is
    /// executed when translation fails.
    pub fn dispatch_arch(
        &mut self,
        bytes: &[u8],
        from: Architecture,
        to: Architecture,
    ) -> Result<DispatchOutcome, EmulatorError> {
        if from == to {
            tracing::debug!(arch = %from, bytes = bytes.len(), "native dispatch");
            let step = self.core_mut(from).execute_instruction(bytes)?;
            return Ok(DispatchOutcome::Executed {
                architecture: from,
                step,
            });
        }

        let translation = self.tables.translate(from, to, bytes)?;
        tracing::debug!(%from, %to, source = %translation.source_text, "translated dispatch");
        let core = self.core_mut(to);
        let mut steps = Vec::with_capacity(translation.instructions.len());
        for instruction in &translation.instructions {
            let step = core.execute_instruction(&instruction.bytes)?;
            steps.push(step);
            if matches!(step, StepOutcome::Halted(_)) {
                break;
            }
        }
        Ok(DispatchOutcome::Translated { translation, steps })
    }
}
