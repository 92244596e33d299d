//! Architecture tag to concrete core selection.

use crate::api::{Core, CoreConfig, RegisterSnapshot, RunOutcome, StepOutcome, StopHandle};
use crate::isa::{ArmCore, MipsCore, PowerPcCore, X86Core};
use crate::memory::AddressSpace;
use crate::image::check_image_len;
use crate::{
    Architecture, ArchitectureDetector, EmulatorError, FirmwareDescriptor, NotificationSink,
    RunState,
};

/// One core of any supported architecture.
#[derive(Debug)]
pub enum AnyCore {
    /// MIPS32 core.
    Mips(MipsCore),
    /// ARM core.
    Arm(ArmCore),
    /// x86 subset core.
    X86(X86Core),
    /// PowerPC subset core.
    PowerPc(PowerPcCore),
}

macro_rules! delegate {
    ($self:expr, $core:ident => $body:expr) => {
        match $self {
            AnyCore::Mips($core) => $body,
            AnyCore::Arm($core) => $body,
            AnyCore::X86($core) => $body,
            AnyCore::PowerPc($core) => $body,
        }
    };
}

impl AnyCore {
    /// Builds an idle core for `architecture`.
    #[must_use]
    pub fn new(architecture: Architecture, config: CoreConfig) -> Self {
        match architecture {
            Architecture::Mips32 => Self::Mips(MipsCore::new(config)),
            Architecture::Arm => Self::Arm(ArmCore::new(config)),
            Architecture::X86 => Self::X86(X86Core::new(config)),
            Architecture::PowerPc => Self::PowerPc(PowerPcCore::new(config)),
        }
    }

    /// Builds an idle core from an architecture tag.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnknownArchitecture`] for an unrecognised tag.
    pub fn from_tag(tag: &str, config: CoreConfig) -> Result<Self, EmulatorError> {
        Ok(Self::new(Architecture::from_tag(tag)?, config))
    }

    /// Validates a loader descriptor, then builds and loads the matching core.
    ///
    /// # Errors
    ///
    /// Propagates descriptor validation and image load failures; no core is
    /// returned in either case.
    pub fn from_descriptor(
        descriptor: &FirmwareDescriptor,
        config: CoreConfig,
    ) -> Result<Self, EmulatorError> {
        let architecture = descriptor.validate()?;
        let mut core = Self::new(architecture, config);
        core.load(&descriptor.data, Some(descriptor.estimated_entry_point))?;
        Ok(core)
    }

    /// Classifies `image` with `detector`, then builds and loads that core
    /// at the configured load address or reset vector.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::InvalidImage`] before consulting the detector
    /// for empty or oversized images, and
    /// [`EmulatorError::UnknownArchitecture`] when the detector has no answer.
    pub fn from_detected(
        image: &[u8],
        detector: &dyn ArchitectureDetector,
        config: CoreConfig,
    ) -> Result<Self, EmulatorError> {
        check_image_len(image.len())?;
        let architecture = detector
            .detect(image)
            .ok_or_else(|| EmulatorError::UnknownArchitecture("<undetected>".to_string()))?;
        tracing::debug!(arch = %architecture, bytes = image.len(), "architecture detected");
        let mut core = Self::new(architecture, config);
        core.load(image, None)?;
        Ok(core)
    }
}

impl Core for AnyCore {
    fn architecture(&self) -> Architecture {
        delegate!(self, core => core.architecture())
    }

    fn load(&mut self, image: &[u8], load_address: Option<u32>) -> Result<(), EmulatorError> {
        delegate!(self, core => core.load(image, load_address))
    }

    fn step(&mut self) -> StepOutcome {
        delegate!(self, core => core.step())
    }

    fn run(&mut self, stop: &StopHandle) -> Result<RunOutcome, EmulatorError> {
        delegate!(self, core => core.run(stop))
    }

    fn execute_instruction(&mut self, bytes: &[u8]) -> Result<StepOutcome, EmulatorError> {
        delegate!(self, core => core.execute_instruction(bytes))
    }

    fn request_halt(&mut self) {
        delegate!(self, core => core.request_halt());
    }

    fn run_state(&self) -> RunState {
        delegate!(self, core => core.run_state())
    }

    fn program_counter(&self) -> u32 {
        delegate!(self, core => core.program_counter())
    }

    fn instruction_count(&self) -> u64 {
        delegate!(self, core => core.instruction_count())
    }

    fn current_instruction(&self) -> u32 {
        delegate!(self, core => core.current_instruction())
    }

    fn registers(&self) -> RegisterSnapshot {
        delegate!(self, core => core.registers())
    }

    fn memory(&self) -> &AddressSpace {
        delegate!(self, core => core.memory())
    }

    fn set_sink(&mut self, sink: Box<dyn NotificationSink + Send>) {
        delegate!(self, core => core.set_sink(sink));
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::AnyCore;
    use crate::api::{Core, CoreConfig};
    use crate::{
        Architecture, ArchitectureDetector, EmulatorError, FirmwareDescriptor, ImageError,
        RunState,
    };

    /// Treats a leading `0x7F 'E'` pair as ARM and anything else as unknown.
    struct MagicDetector;

    impl ArchitectureDetector for MagicDetector {
        fn detect(&self, image: &[u8]) -> Option<Architecture> {
            image.starts_with(&[0x7F, b'E']).then_some(Architecture::Arm)
        }
    }

    #[rstest]
    #[case("mips", Architecture::Mips32)]
    #[case("ARM", Architecture::Arm)]
    #[case("x86", Architecture::X86)]
    #[case("powerpc", Architecture::PowerPc)]
    fn tag_selects_matching_core(#[case] tag: &str, #[case] expected: Architecture) {
        let core = AnyCore::from_tag(tag, CoreConfig::default()).expect("known tag");
        assert_eq!(core.architecture(), expected);
        assert_eq!(core.run_state(), RunState::Idle);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            AnyCore::from_tag("z80", CoreConfig::default()),
            Err(EmulatorError::UnknownArchitecture(tag)) if tag == "z80"
        ));
    }

    #[test]
    fn descriptor_entry_point_becomes_load_address() {
        let descriptor = FirmwareDescriptor {
            data: vec![0; 8],
            format: "raw".to_string(),
            architecture: "mips".to_string(),
            estimated_entry_point: 0x100,
            is_valid: true,
        };
        let core = AnyCore::from_descriptor(&descriptor, CoreConfig::default()).expect("valid");
        assert_eq!(core.program_counter(), 0x100);
        assert_eq!(core.run_state(), RunState::Loaded);
    }

    #[test]
    fn invalid_descriptor_builds_nothing() {
        let descriptor = FirmwareDescriptor {
            data: Vec::new(),
            format: "raw".to_string(),
            architecture: "arm".to_string(),
            estimated_entry_point: 0,
            is_valid: true,
        };
        assert!(matches!(
            AnyCore::from_descriptor(&descriptor, CoreConfig::default()),
            Err(EmulatorError::InvalidImage(ImageError::Empty))
        ));
    }

    #[test]
    fn detector_picks_the_core() {
        let image = [0x7F, b'E', 0, 0];
        let core =
            AnyCore::from_detected(&image, &MagicDetector, CoreConfig::default()).expect("detected");
        assert_eq!(core.architecture(), Architecture::Arm);
        assert_eq!(core.run_state(), RunState::Loaded);
    }

    #[test]
    fn undetected_image_is_rejected() {
        assert!(matches!(
            AnyCore::from_detected(&[0; 4], &MagicDetector, CoreConfig::default()),
            Err(EmulatorError::UnknownArchitecture(_))
        ));
        assert!(matches!(
            AnyCore::from_detected(&[], &MagicDetector, CoreConfig::default()),
            Err(EmulatorError::InvalidImage(ImageError::Empty))
        ));
    }
}
