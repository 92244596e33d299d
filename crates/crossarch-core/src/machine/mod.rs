//! Shared fetch-decode-execute loop parameterised by an instruction set.
//!
//! Each ISA supplies decode and execute handlers through [`Isa`]; the
//! [`Machine`] owns the lifecycle, budget, cancellation, fault capture, and
//! notification plumbing once for all of them.

/// Console services shared by every ISA.
pub mod console;

use std::fmt;
use std::marker::PhantomData;

use crate::api::{Core, CoreConfig, RegisterSnapshot, RunOutcome, StepOutcome, StopHandle};
use crate::memory::AddressSpace;
use crate::{
    Architecture, EmulatorError, FaultCode, FaultRecord, HaltReason, Notification,
    NotificationSink, NullSink, ProgramCounter, RunState, StepFault,
};

pub use console::ServiceOutcome;

/// Byte stream an instruction is decoded from.
pub trait ByteSource {
    /// Next instruction byte, or `None` when the stream is exhausted.
    fn next_byte(&mut self) -> Option<u8>;

    /// Next byte, faulting with [`FaultCode::TruncatedInstruction`] when missing.
    ///
    /// # Errors
    ///
    /// Returns a truncation fault when the stream ended.
    fn byte(&mut self) -> Result<u8, StepFault> {
        self.next_byte()
            .ok_or(StepFault::new(FaultCode::TruncatedInstruction, 0))
    }

    /// Next four bytes as a little-endian word.
    ///
    /// # Errors
    ///
    /// Returns a truncation fault when fewer than four bytes remain.
    fn word(&mut self) -> Result<u32, StepFault> {
        let mut bytes = [0u8; 4];
        for byte in &mut bytes {
            *byte = self.byte()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Fetches instruction bytes from an address space.
#[derive(Debug)]
pub struct BusFetch<'a> {
    bus: &'a mut AddressSpace,
    addr: u32,
}

impl<'a> BusFetch<'a> {
    /// Starts fetching at `addr`.
    pub fn new(bus: &'a mut AddressSpace, addr: u32) -> Self {
        Self { bus, addr }
    }
}

impl ByteSource for BusFetch<'_> {
    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bus.read_byte(self.addr);
        self.addr = self.addr.wrapping_add(1);
        Some(byte)
    }
}

/// Fetches instruction bytes from a slice.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Starts at the first byte of `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(byte)
    }
}

/// A decoded instruction with its encoded length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<T> {
    /// Decoded form.
    pub instruction: T,
    /// Encoded length in bytes.
    pub len: u32,
}

/// How the cycle loop moves on after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Fall through to the next sequential instruction.
    Next,
    /// Continue at the given address.
    Jump(u32),
    /// Program requested exit.
    Exit,
}

impl From<ServiceOutcome> for ExecuteOutcome {
    fn from(outcome: ServiceOutcome) -> Self {
        match outcome {
            ServiceOutcome::Continue => Self::Next,
            ServiceOutcome::Exit => Self::Exit,
        }
    }
}

/// Mutable view handed to an execute handler for one instruction.
#[derive(Debug)]
pub struct ExecContext<'a, R> {
    /// Register file of the executing core.
    pub regs: &'a mut R,
    /// Address space of the executing core.
    pub bus: &'a mut AddressSpace,
    /// Address of the executing instruction.
    pub pc: u32,
    /// Address of the sequentially next instruction.
    pub next_pc: u32,
}

impl<R> ExecContext<'_, R> {
    /// Runs a console service and maps its outcome.
    ///
    /// # Errors
    ///
    /// Propagates the unsupported-service fault.
    pub fn service(&mut self, number: u32, arg: u32) -> Result<ExecuteOutcome, StepFault> {
        console::perform(self.bus, number, arg).map(ExecuteOutcome::from)
    }
}

/// One instruction set: register model plus decode and execute handlers.
pub trait Isa: Send + 'static {
    /// Architecture tag.
    const ARCH: Architecture;
    /// Register file.
    type Registers: ProgramCounter + Default + Clone + fmt::Debug + Send;
    /// Decoded instruction form; `Display` yields canonical assembler text.
    type Instruction: Copy + fmt::Debug + fmt::Display;

    /// Decodes one instruction.
    ///
    /// # Errors
    ///
    /// Returns a decode-class fault for unsupported or truncated encodings.
    fn decode(source: &mut dyn ByteSource) -> Result<Decoded<Self::Instruction>, StepFault>;

    /// Executes one decoded instruction.
    ///
    /// # Errors
    ///
    /// Returns a step fault the cycle loop converts into a halt.
    fn execute(
        instruction: &Self::Instruction,
        cx: &mut ExecContext<'_, Self::Registers>,
    ) -> Result<ExecuteOutcome, StepFault>;

    /// Applies reset state: PC at `entry`, stack pointer at `stack_top`.
    fn reset(regs: &mut Self::Registers, entry: u32, stack_top: u32);

    /// Named register view.
    fn snapshot(regs: &Self::Registers) -> RegisterSnapshot;
}

/// Decodes one instruction from a byte slice.
///
/// # Errors
///
/// Returns [`EmulatorError::Decode`] with `pc` attached.
pub fn decode_bytes<I: Isa>(
    bytes: &[u8],
    pc: u32,
) -> Result<Decoded<I::Instruction>, EmulatorError> {
    I::decode(&mut SliceSource::new(bytes))
        .map_err(|fault| EmulatorError::Decode(fault.at(pc, raw_prefix(bytes))))
}

/// First four bytes of `bytes` as a little-endian word, zero-padded.
#[must_use]
pub fn raw_prefix(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    for (dst, src) in word.iter_mut().zip(bytes) {
        *dst = *src;
    }
    u32::from_le_bytes(word)
}

/// Fetch-decode-execute core for instruction set `I`.
pub struct Machine<I: Isa> {
    config: CoreConfig,
    regs: I::Registers,
    bus: AddressSpace,
    state: RunState,
    instruction_count: u64,
    sink: Box<dyn NotificationSink + Send>,
    isa: PhantomData<fn() -> I>,
}

impl<I: Isa> fmt::Debug for Machine<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("architecture", &I::ARCH)
            .field("state", &self.state)
            .field("pc", &self.regs.pc())
            .field("instruction_count", &self.instruction_count)
            .finish_non_exhaustive()
    }
}

impl<I: Isa> Default for Machine<I> {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl<I: Isa> Machine<I> {
    /// Creates an idle core with an empty address space.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            regs: I::Registers::default(),
            bus: AddressSpace::new(0, 0),
            state: RunState::Idle,
            instruction_count: 0,
            sink: Box::new(NullSink),
            isa: PhantomData,
            config,
        }
    }

    /// Creates an idle core that reports into `sink`.
    #[must_use]
    pub fn with_sink(config: CoreConfig, sink: Box<dyn NotificationSink + Send>) -> Self {
        Self {
            sink,
            ..Self::new(config)
        }
    }

    /// Configuration this core was built with.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Architectural registers.
    #[must_use]
    pub const fn regs(&self) -> &I::Registers {
        &self.regs
    }

    /// Mutable architectural registers, for host setup before running.
    pub const fn regs_mut(&mut self) -> &mut I::Registers {
        &mut self.regs
    }

    /// Mutable address space, for host setup before running.
    pub const fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.bus
    }

    fn install(&mut self, bus: AddressSpace, entry: u32) {
        self.bus = bus;
        self.regs = I::Registers::default();
        let stack_top = self.bus.ram_end();
        I::reset(&mut self.regs, entry, stack_top);
        self.state = RunState::Loaded;
        self.instruction_count = 0;
    }

    fn flush(&mut self) {
        self.bus.drain_notifications(self.sink.as_mut());
    }

    fn halt(&mut self, reason: HaltReason) -> StepOutcome {
        self.flush();
        self.state = RunState::Halted(reason);
        tracing::info!(
            arch = %I::ARCH,
            pc = format_args!("{:#010x}", self.regs.pc()),
            instructions = self.instruction_count,
            %reason,
            "core halted"
        );
        self.sink.notify(Notification::Halted(reason));
        StepOutcome::Halted(reason)
    }

    fn fault(&mut self, record: FaultRecord) -> StepOutcome {
        tracing::warn!(arch = %I::ARCH, %record, "step fault");
        self.bus.diagnostics_mut().record_fault(record);
        self.halt(HaltReason::Fault(record))
    }

    fn budget_exhausted(&self) -> bool {
        self.config
            .max_instructions
            .is_some_and(|limit| self.instruction_count >= limit)
    }

    fn retire(&mut self, pc: u32, raw: u32, decoded: Decoded<I::Instruction>) -> StepOutcome {
        let next_pc = pc.wrapping_add(decoded.len);
        let mut cx = ExecContext {
            regs: &mut self.regs,
            bus: &mut self.bus,
            pc,
            next_pc,
        };
        let outcome = match I::execute(&decoded.instruction, &mut cx) {
            Ok(outcome) => outcome,
            Err(fault) => return self.fault(fault.at(pc, raw)),
        };

        self.instruction_count += 1;
        self.bus.diagnostics_mut().record_retired();
        self.bus.tick();
        if self.config.trace_instructions {
            tracing::trace!(
                arch = %I::ARCH,
                pc = format_args!("{pc:#010x}"),
                raw = format_args!("{raw:#010x}"),
                instruction = %decoded.instruction,
                "retired"
            );
        }

        match outcome {
            ExecuteOutcome::Next => self.regs.set_pc(next_pc),
            ExecuteOutcome::Jump(target) => self.regs.set_pc(target),
            ExecuteOutcome::Exit => {
                self.regs.set_pc(next_pc);
                return self.halt(HaltReason::Exit);
            }
        }
        self.flush();
        StepOutcome::Retired {
            pc,
            raw,
            len: decoded.len,
        }
    }

    fn step_runnable(&mut self) -> StepOutcome {
        if self.budget_exhausted() {
            return self.halt(HaltReason::BudgetExhausted);
        }
        self.state = RunState::Running;

        let pc = self.regs.pc();
        let raw = self.bus.peek_word(pc);
        let decoded = I::decode(&mut BusFetch::new(&mut self.bus, pc));
        match decoded {
            Ok(decoded) => self.retire(pc, raw, decoded),
            Err(fault) => self.fault(fault.at(pc, raw)),
        }
    }
}

impl<I: Isa> Core for Machine<I> {
    fn architecture(&self) -> Architecture {
        I::ARCH
    }

    fn load(&mut self, image: &[u8], load_address: Option<u32>) -> Result<(), EmulatorError> {
        let entry = load_address
            .or(self.config.load_address)
            .unwrap_or_else(|| I::ARCH.reset_vector());
        self.config.validate()?;
        let bus =
            AddressSpace::with_image(self.config.rom_bytes, self.config.ram_bytes, image, entry)?;
        self.install(bus, entry);
        tracing::info!(
            arch = %I::ARCH,
            bytes = image.len(),
            entry = format_args!("{entry:#010x}"),
            "image loaded"
        );
        Ok(())
    }

    fn step(&mut self) -> StepOutcome {
        match self.state {
            RunState::Idle => StepOutcome::Idle,
            RunState::Halted(reason) => StepOutcome::Halted(reason),
            RunState::Loaded | RunState::Running => self.step_runnable(),
        }
    }

    fn run(&mut self, stop: &StopHandle) -> Result<RunOutcome, EmulatorError> {
        let interval = u64::from(self.config.stop_check_interval.max(1));
        let start = self.instruction_count;
        loop {
            let steps = self.instruction_count - start;
            match self.state {
                RunState::Idle => return Err(EmulatorError::NotLoaded),
                RunState::Halted(halt) => return Ok(RunOutcome { steps, halt }),
                RunState::Loaded | RunState::Running => {}
            }
            if steps % interval == 0 && stop.is_stop_requested() {
                let halt = HaltReason::Cancelled;
                self.halt(halt);
                return Ok(RunOutcome { steps, halt });
            }
            self.step_runnable();
        }
    }

    fn execute_instruction(&mut self, bytes: &[u8]) -> Result<StepOutcome, EmulatorError> {
        match self.state {
            RunState::Halted(reason) => return Err(EmulatorError::CoreHalted(reason)),
            RunState::Idle => {
                let entry = self
                    .config
                    .load_address
                    .unwrap_or_else(|| I::ARCH.reset_vector());
                self.config.validate()?;
                let bus = AddressSpace::new(self.config.rom_bytes, self.config.ram_bytes);
                self.install(bus, entry);
            }
            RunState::Loaded | RunState::Running => {}
        }
        if self.budget_exhausted() {
            return Ok(self.halt(HaltReason::BudgetExhausted));
        }

        let pc = self.regs.pc();
        let decoded = decode_bytes::<I>(bytes, pc)?;
        self.state = RunState::Running;
        tracing::debug!(arch = %I::ARCH, instruction = %decoded.instruction, "executing supplied instruction");
        Ok(self.retire(pc, raw_prefix(bytes), decoded))
    }

    fn request_halt(&mut self) {
        if !matches!(self.state, RunState::Halted(_)) {
            self.halt(HaltReason::Requested);
        }
    }

    fn run_state(&self) -> RunState {
        self.state
    }

    fn program_counter(&self) -> u32 {
        self.regs.pc()
    }

    fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    fn current_instruction(&self) -> u32 {
        self.bus.peek_word(self.regs.pc())
    }

    fn registers(&self) -> RegisterSnapshot {
        I::snapshot(&self.regs)
    }

    fn memory(&self) -> &AddressSpace {
        &self.bus
    }

    fn set_sink(&mut self, sink: Box<dyn NotificationSink + Send>) {
        self.sink = sink;
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::{ByteSource, Decoded, ExecContext, ExecuteOutcome, Isa, Machine};
    use crate::api::{Core, CoreConfig, NamedRegister, RegisterSnapshot, StepOutcome, StopHandle};
    use crate::{
        Architecture, EmulatorError, FaultCode, HaltReason, ImageError, Notification,
        RecordingSink, RegisterFile, RunState, StepFault,
    };

    /// One-byte toy encoding: 0 nop, 1 jump to 0, 2 print r0, 3 exit.
    #[derive(Debug, Clone, Copy)]
    struct Toy(u8);

    impl fmt::Display for Toy {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "toy {}", self.0)
        }
    }

    struct ToyIsa;

    impl Isa for ToyIsa {
        const ARCH: Architecture = Architecture::Mips32;
        type Registers = RegisterFile<1>;
        type Instruction = Toy;

        fn decode(source: &mut dyn ByteSource) -> Result<Decoded<Toy>, StepFault> {
            match source.byte()? {
                op @ 0..=3 => Ok(Decoded {
                    instruction: Toy(op),
                    len: 1,
                }),
                other => Err(StepFault::opcode(u32::from(other))),
            }
        }

        fn execute(
            instruction: &Toy,
            cx: &mut ExecContext<'_, RegisterFile<1>>,
        ) -> Result<ExecuteOutcome, StepFault> {
            match instruction.0 {
                1 => Ok(ExecuteOutcome::Jump(0)),
                2 => {
                    let value = cx.regs.gpr(0);
                    cx.service(1, value)
                }
                3 => cx.service(10, 0),
                _ => Ok(ExecuteOutcome::Next),
            }
        }

        fn reset(regs: &mut RegisterFile<1>, entry: u32, _stack_top: u32) {
            use crate::ProgramCounter;
            regs.set_pc(entry);
        }

        fn snapshot(regs: &RegisterFile<1>) -> RegisterSnapshot {
            use crate::ProgramCounter;
            RegisterSnapshot {
                architecture: Self::ARCH,
                pc: regs.pc(),
                general: vec![NamedRegister::new("r0", regs.gpr(0))],
                special: Vec::new(),
            }
        }
    }

    #[test]
    fn idle_core_refuses_to_run() {
        let mut core = Machine::<ToyIsa>::default();
        assert_eq!(core.step(), StepOutcome::Idle);
        assert_eq!(
            core.run(&StopHandle::new()),
            Err(EmulatorError::NotLoaded)
        );
    }

    #[test]
    fn invalid_image_leaves_core_idle() {
        let mut core = Machine::<ToyIsa>::default();
        assert_eq!(
            core.load(&[], None),
            Err(EmulatorError::InvalidImage(ImageError::Empty))
        );
        assert_eq!(core.run_state(), RunState::Idle);
    }

    #[test]
    fn oversized_ram_config_is_rejected_on_both_paths() {
        let config = CoreConfig {
            ram_bytes: usize::MAX,
            ..CoreConfig::default()
        };
        let mut core = Machine::<ToyIsa>::new(config);
        assert!(matches!(
            core.load(&[0, 3], None),
            Err(EmulatorError::InvalidImage(ImageError::RegionTooLarge { region: "ram", .. }))
        ));
        assert!(matches!(
            core.execute_instruction(&[0]),
            Err(EmulatorError::InvalidImage(ImageError::RegionTooLarge { .. }))
        ));
        assert_eq!(core.run_state(), RunState::Idle);
    }

    #[test]
    fn run_until_exit_counts_retired_instructions() {
        let mut core = Machine::<ToyIsa>::default();
        core.load(&[0, 0, 3], None).expect("valid image");
        assert_eq!(core.run_state(), RunState::Loaded);

        let outcome = core.run(&StopHandle::new()).expect("loaded core");
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.halt, HaltReason::Exit);
        assert_eq!(core.instruction_count(), 3);
        assert_eq!(core.program_counter(), 3);
    }

    #[test]
    fn unsupported_opcode_halts_with_recorded_fault() {
        let mut core = Machine::<ToyIsa>::default();
        core.load(&[0, 0x7F], None).expect("valid image");
        assert!(matches!(core.step(), StepOutcome::Retired { pc: 0, len: 1, .. }));

        let StepOutcome::Halted(HaltReason::Fault(record)) = core.step() else {
            panic!("expected fault halt");
        };
        assert_eq!(record.code, FaultCode::UnsupportedOpcode);
        assert_eq!(record.pc, 1);
        assert_eq!(record.detail, 0x7F);
        assert_eq!(core.diagnostics().decode_faults, 1);
        assert_eq!(core.diagnostics().last_fault, Some(record));
        assert_eq!(core.step(), StepOutcome::Halted(HaltReason::Fault(record)));
    }

    #[test]
    fn budget_exhaustion_halts_infinite_loop() {
        let config = CoreConfig {
            max_instructions: Some(10),
            ..CoreConfig::default()
        };
        let mut core = Machine::<ToyIsa>::new(config);
        core.load(&[1], None).expect("valid image");
        let outcome = core.run(&StopHandle::new()).expect("loaded core");
        assert_eq!(outcome.steps, 10);
        assert_eq!(outcome.halt, HaltReason::BudgetExhausted);
    }

    #[test]
    fn pre_set_stop_flag_cancels_before_first_instruction() {
        let mut core = Machine::<ToyIsa>::default();
        core.load(&[1], None).expect("valid image");
        let stop = StopHandle::new();
        stop.request_stop();
        let outcome = core.run(&stop).expect("loaded core");
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.halt, HaltReason::Cancelled);
        assert_eq!(core.instruction_count(), 0);
    }

    #[test]
    fn console_output_and_halt_reach_the_sink_in_order() {
        let mut core = Machine::<ToyIsa>::default();
        let (sink, receiver) = crate::ChannelSink::pair();
        core.set_sink(Box::new(sink));
        core.load(&[2, 3], None).expect("valid image");
        core.regs_mut().set_gpr(0, 42);
        core.run(&StopHandle::new()).expect("loaded core");

        let received: Vec<Notification> = receiver.try_iter().collect();
        assert_eq!(
            received,
            vec![
                Notification::ConsoleInteger(42),
                Notification::Halted(HaltReason::Exit)
            ]
        );
    }

    #[test]
    fn supplied_instruction_runs_on_idle_core() {
        let mut core = Machine::<ToyIsa>::with_sink(
            CoreConfig::default(),
            Box::new(RecordingSink::default()),
        );
        assert_eq!(
            core.execute_instruction(&[0]),
            Ok(StepOutcome::Retired {
                pc: 0,
                raw: 0,
                len: 1
            })
        );
        assert_eq!(core.program_counter(), 1);
        assert!(matches!(
            core.execute_instruction(&[0x80]),
            Err(EmulatorError::Decode(_))
        ));
        assert_eq!(core.run_state(), RunState::Running);

        core.request_halt();
        assert_eq!(
            core.execute_instruction(&[0]),
            Err(EmulatorError::CoreHalted(HaltReason::Requested))
        );
    }
}
