//! ARM (ARMv4 A32) core: 16 GPRs plus CPSR, conditional execution, and the
//! architectural pipeline offset (`r15` reads as `pc + 8`).

/// Instruction classification and canonical text.
pub mod decode;

pub use decode::{ArmInstruction, Condition, DpOp, Operand2, ShiftKind};

use crate::api::{NamedRegister, RegisterSnapshot};
use crate::machine::{ByteSource, Decoded, ExecContext, ExecuteOutcome, Isa, Machine};
use crate::{Architecture, ProgramCounter, RegisterFile, StepFault};

use decode::{LR, PC, REGISTER_NAMES, SP};

/// CPSR negative flag.
pub const CPSR_N: u32 = 1 << 31;
/// CPSR zero flag.
pub const CPSR_Z: u32 = 1 << 30;
/// CPSR carry flag.
pub const CPSR_C: u32 = 1 << 29;
/// CPSR overflow flag.
pub const CPSR_V: u32 = 1 << 28;
/// CPSR after reset: supervisor mode, IRQ and FIQ masked.
pub const CPSR_RESET: u32 = 0x0000_00D3;

/// Register used as the service number by `swi`.
pub const SERVICE_NUMBER_REGISTER: u8 = 7;
/// Register used as the service argument by `swi`.
pub const SERVICE_ARGUMENT_REGISTER: u8 = 0;

/// ARM register file; the status word is the CPSR.
pub type ArmRegisters = RegisterFile<16>;

/// ARMv4 A32 instruction set.
#[derive(Debug, Clone, Copy)]
pub struct Arm;

/// Fetch-decode-execute core for ARM.
pub type ArmCore = Machine<Arm>;

fn read(cx: &ExecContext<'_, ArmRegisters>, index: u8) -> u32 {
    if index == PC {
        cx.pc.wrapping_add(8)
    } else {
        cx.regs.gpr(usize::from(index))
    }
}

fn condition_passed(cond: Condition, cpsr: u32) -> bool {
    let n = cpsr & CPSR_N != 0;
    let z = cpsr & CPSR_Z != 0;
    let c = cpsr & CPSR_C != 0;
    let v = cpsr & CPSR_V != 0;
    match cond {
        Condition::Eq => z,
        Condition::Ne => !z,
        Condition::Cs => c,
        Condition::Cc => !c,
        Condition::Mi => n,
        Condition::Pl => !n,
        Condition::Vs => v,
        Condition::Vc => !v,
        Condition::Hi => c && !z,
        Condition::Ls => !c || z,
        Condition::Ge => n == v,
        Condition::Lt => n != v,
        Condition::Gt => !z && n == v,
        Condition::Le => z || n != v,
        Condition::Al => true,
    }
}

/// Evaluates the barrel shifter, returning `(value, carry_out)`.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn shift_operand(value: u32, shift: ShiftKind, amount: u8, carry_in: bool) -> (u32, bool) {
    let amount = u32::from(amount);
    match (shift, amount) {
        (ShiftKind::Lsl, 0) => (value, carry_in),
        (ShiftKind::Lsl, n) => (value << n, (value >> (32 - n)) & 1 != 0),
        (ShiftKind::Lsr, 0) => (0, value & (1 << 31) != 0),
        (ShiftKind::Lsr, n) => (value >> n, (value >> (n - 1)) & 1 != 0),
        (ShiftKind::Asr, 0) => {
            let negative = value & (1 << 31) != 0;
            (if negative { u32::MAX } else { 0 }, negative)
        }
        (ShiftKind::Asr, n) => (
            ((value as i32) >> n) as u32,
            (value >> (n - 1)) & 1 != 0,
        ),
        (ShiftKind::Ror, 0) => (
            (u32::from(carry_in) << 31) | (value >> 1),
            value & 1 != 0,
        ),
        (ShiftKind::Ror, n) => {
            let result = value.rotate_right(n);
            (result, result & (1 << 31) != 0)
        }
    }
}

fn operand2(cx: &ExecContext<'_, ArmRegisters>, operand: Operand2, carry_in: bool) -> (u32, bool) {
    match operand {
        Operand2::Immediate { rotate, .. } => {
            let value = operand.immediate_value().unwrap_or_default();
            let carry = if rotate == 0 {
                carry_in
            } else {
                value & (1 << 31) != 0
            };
            (value, carry)
        }
        Operand2::Register { rm, shift, amount } => {
            shift_operand(read(cx, rm), shift, amount, carry_in)
        }
    }
}

/// `a + b + carry` with carry-out and signed overflow.
const fn add_with_carry(a: u32, b: u32, carry: bool) -> (u32, bool, bool) {
    let wide = a as u64 + b as u64 + carry as u64;
    let result = wide as u32;
    let overflow = ((a ^ result) & (b ^ result)) & (1 << 31) != 0;
    (result, wide > u32::MAX as u64, overflow)
}

fn data_processing(
    cx: &mut ExecContext<'_, ArmRegisters>,
    op: DpOp,
    set_flags: bool,
    rd: u8,
    rn: u8,
    operand: Operand2,
) -> ExecuteOutcome {
    let cpsr = cx.regs.status();
    let carry_in = cpsr & CPSR_C != 0;
    let (b, shifter_carry) = operand2(cx, operand, carry_in);
    let a = read(cx, rn);

    // Logical ops take C from the shifter and leave V alone.
    let (result, carry, overflow) = match op {
        DpOp::And | DpOp::Tst => (a & b, shifter_carry, None),
        DpOp::Eor | DpOp::Teq => (a ^ b, shifter_carry, None),
        DpOp::Orr => (a | b, shifter_carry, None),
        DpOp::Mov => (b, shifter_carry, None),
        DpOp::Bic => (a & !b, shifter_carry, None),
        DpOp::Mvn => (!b, shifter_carry, None),
        DpOp::Sub | DpOp::Cmp => {
            let (r, c, v) = add_with_carry(a, !b, true);
            (r, c, Some(v))
        }
        DpOp::Rsb => {
            let (r, c, v) = add_with_carry(b, !a, true);
            (r, c, Some(v))
        }
        DpOp::Add | DpOp::Cmn => {
            let (r, c, v) = add_with_carry(a, b, false);
            (r, c, Some(v))
        }
        DpOp::Adc => {
            let (r, c, v) = add_with_carry(a, b, carry_in);
            (r, c, Some(v))
        }
        DpOp::Sbc => {
            let (r, c, v) = add_with_carry(a, !b, carry_in);
            (r, c, Some(v))
        }
        DpOp::Rsc => {
            let (r, c, v) = add_with_carry(b, !a, carry_in);
            (r, c, Some(v))
        }
    };

    if set_flags && rd != PC {
        let regs = &mut *cx.regs;
        regs.set_status_bit(CPSR_N, result & (1 << 31) != 0);
        regs.set_status_bit(CPSR_Z, result == 0);
        regs.set_status_bit(CPSR_C, carry);
        if let Some(overflow) = overflow {
            regs.set_status_bit(CPSR_V, overflow);
        }
    }

    if op.is_test() {
        return ExecuteOutcome::Next;
    }
    if rd == PC {
        return ExecuteOutcome::Jump(result & !3);
    }
    cx.regs.set_gpr(usize::from(rd), result);
    ExecuteOutcome::Next
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn transfer(
    cx: &mut ExecContext<'_, ArmRegisters>,
    load: bool,
    byte: bool,
    pre_index: bool,
    up: bool,
    writeback: bool,
    rn: u8,
    rd: u8,
    offset: u16,
) -> ExecuteOutcome {
    let base = read(cx, rn);
    let offset = u32::from(offset);
    let offset_addr = if up {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    };
    let addr = if pre_index { offset_addr } else { base };

    if !pre_index || writeback {
        cx.regs.set_gpr(usize::from(rn), offset_addr);
    }

    if load {
        let value = if byte {
            u32::from(cx.bus.read_byte(addr))
        } else {
            cx.bus.read_word(addr)
        };
        if rd == PC {
            return ExecuteOutcome::Jump(value & !3);
        }
        cx.regs.set_gpr(usize::from(rd), value);
    } else {
        let value = read(cx, rd);
        if byte {
            cx.bus.write_byte(addr, value.to_le_bytes()[0]);
        } else {
            cx.bus.write_word(addr, value);
        }
    }
    ExecuteOutcome::Next
}

impl Isa for Arm {
    const ARCH: Architecture = Architecture::Arm;
    type Registers = ArmRegisters;
    type Instruction = ArmInstruction;

    fn decode(source: &mut dyn ByteSource) -> Result<Decoded<ArmInstruction>, StepFault> {
        let instruction = ArmInstruction::decode(source.word()?)?;
        Ok(Decoded {
            instruction,
            len: 4,
        })
    }

    fn execute(
        instruction: &ArmInstruction,
        cx: &mut ExecContext<'_, ArmRegisters>,
    ) -> Result<ExecuteOutcome, StepFault> {
        if !condition_passed(instruction.condition(), cx.regs.status()) {
            return Ok(ExecuteOutcome::Next);
        }
        let outcome = match *instruction {
            ArmInstruction::DataProcessing {
                op,
                set_flags,
                rd,
                rn,
                operand2,
                ..
            } => data_processing(cx, op, set_flags, rd, rn, operand2),
            ArmInstruction::Transfer {
                load,
                byte,
                pre_index,
                up,
                writeback,
                rn,
                rd,
                offset,
                ..
            } => transfer(cx, load, byte, pre_index, up, writeback, rn, rd, offset),
            ArmInstruction::Branch { link, offset, .. } => {
                if link {
                    cx.regs.set_gpr(usize::from(LR), cx.pc.wrapping_add(4));
                }
                ExecuteOutcome::Jump(cx.pc.wrapping_add(8).wrapping_add_signed(offset << 2))
            }
            ArmInstruction::BranchExchange { rm, .. } => {
                let target = read(cx, rm);
                if target & 1 != 0 {
                    // Thumb state is not modelled.
                    return Err(StepFault::function(target));
                }
                ExecuteOutcome::Jump(target & !3)
            }
            ArmInstruction::SoftwareInterrupt { .. } => {
                let number = read(cx, SERVICE_NUMBER_REGISTER);
                let arg = read(cx, SERVICE_ARGUMENT_REGISTER);
                return cx.service(number, arg);
            }
        };
        Ok(outcome)
    }

    fn reset(regs: &mut ArmRegisters, entry: u32, stack_top: u32) {
        regs.set_pc(entry);
        regs.set_gpr(usize::from(SP), stack_top);
        regs.set_status(CPSR_RESET);
    }

    fn snapshot(regs: &ArmRegisters) -> RegisterSnapshot {
        RegisterSnapshot {
            architecture: Self::ARCH,
            pc: regs.pc(),
            general: REGISTER_NAMES[..15]
                .iter()
                .enumerate()
                .map(|(index, name)| NamedRegister::new(name, regs.gpr(index)))
                .collect(),
            special: vec![NamedRegister::new("cpsr", regs.status())],
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{shift_operand, ArmCore, ShiftKind, CPSR_C, CPSR_N, CPSR_V, CPSR_Z};
    use crate::api::{Core, StepOutcome, StopHandle};
    use crate::{FaultCode, HaltReason, Notification, RecordingSink};

    fn loaded(words: &[u32]) -> ArmCore {
        let image: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        let mut core = ArmCore::default();
        core.load(&image, None).expect("valid image");
        core
    }

    #[test]
    fn bl_sets_link_register_and_branches_past_pipeline() {
        let mut core = loaded(&[0xE1A0_0000, 0xEB00_0002]);
        core.step();
        core.step();
        let regs = core.registers();
        assert_eq!(regs.get("lr"), Some(0x4 + 4));
        assert_eq!(core.program_counter(), 0x4 + 8 + (2 << 2));
    }

    #[test]
    fn backward_branch_loops_until_budget() {
        let mut core = loaded(&[0xEAFF_FFFE]);
        assert!(matches!(core.step(), StepOutcome::Retired { pc: 0, .. }));
        assert_eq!(core.program_counter(), 0);
    }

    #[test]
    fn countdown_loop_uses_flags_and_conditional_branch() {
        let mut core = loaded(&[
            0xE3A0_0003, // mov r0, #3
            0xE3A0_1000, // mov r1, #0
            0xE281_1002, // add r1, r1, #2
            0xE250_0001, // subs r0, r0, #1
            0x1AFF_FFFC, // bne .-8
            0xE3A0_700A, // mov r7, #10
            0xEF00_0000, // swi #0
        ]);
        let outcome = core.run(&StopHandle::new()).expect("loaded");
        assert_eq!(outcome.halt, HaltReason::Exit);
        let regs = core.registers();
        assert_eq!(regs.get("r1"), Some(6));
        assert_eq!(regs.get("r0"), Some(0));
        assert_ne!(regs.get("cpsr").unwrap_or_default() & CPSR_Z, 0);
    }

    #[test]
    fn pc_reads_include_pipeline_offset() {
        let mut core = loaded(&[0xE1A0_000F]); // mov r0, pc
        core.step();
        assert_eq!(core.registers().get("r0"), Some(8));
    }

    #[test]
    fn compare_sets_carry_and_overflow() {
        let mut core = loaded(&[
            0xE3E0_0000, // mvn r0, #0
            0xE370_0001, // cmn r0, #1
        ]);
        core.step();
        core.step();
        let cpsr = core.registers().get("cpsr").unwrap_or_default();
        assert_ne!(cpsr & CPSR_Z, 0);
        assert_ne!(cpsr & CPSR_C, 0);
        assert_eq!(cpsr & CPSR_V, 0);
        assert_eq!(cpsr & CPSR_N, 0);
    }

    #[test]
    fn pre_and_post_indexed_transfers_write_back() {
        let mut core = loaded(&[
            0xE3A0_1102, // mov r1, #0x80000000
            0xE3A0_0041, // mov r0, #'A'
            0xE5A1_0004, // str r0, [r1, #4]!
            0xE4D1_2001, // ldrb r2, [r1], #1
        ]);
        for _ in 0..4 {
            core.step();
        }
        let regs = core.registers();
        assert_eq!(regs.get("r2"), Some(0x41));
        assert_eq!(regs.get("r1"), Some(0x8000_0005));
    }

    #[test]
    fn swi_print_char_uses_r7_and_r0() {
        let mut core = loaded(&[
            0xE3A0_700B, // mov r7, #11
            0xE3A0_0041, // mov r0, #'A'
            0xEF00_0000, // swi #0
        ]);
        let (sink, receiver) = crate::ChannelSink::pair();
        core.set_sink(Box::new(sink));
        for _ in 0..3 {
            core.step();
        }
        assert_eq!(receiver.try_recv(), Ok(Notification::ConsoleChar(b'A')));
    }

    #[test]
    fn bx_to_thumb_target_faults() {
        let mut core = loaded(&[
            0xE3A0_0001, // mov r0, #1
            0xE12F_FF10, // bx r0
        ]);
        core.set_sink(Box::new(RecordingSink::default()));
        core.step();
        let StepOutcome::Halted(HaltReason::Fault(record)) = core.step() else {
            panic!("thumb interworking is not modelled");
        };
        assert_eq!(record.code, FaultCode::UnsupportedFunction);
        assert_eq!(record.pc, 4);
    }

    #[test]
    fn failed_condition_skips_instruction() {
        let mut core = loaded(&[0x03A0_0005]); // moveq r0, #5 with Z clear
        core.step();
        assert_eq!(core.registers().get("r0"), Some(0));
        assert_eq!(core.program_counter(), 4);
    }

    #[rstest]
    #[case(ShiftKind::Lsl, 0, 0x8000_0001, true, 0x8000_0001, true)]
    #[case(ShiftKind::Lsl, 1, 0x8000_0001, false, 0x0000_0002, true)]
    #[case(ShiftKind::Lsr, 0, 0x8000_0000, false, 0, true)]
    #[case(ShiftKind::Asr, 4, 0x8000_0000, false, 0xF800_0000, false)]
    #[case(ShiftKind::Ror, 0, 0x0000_0003, true, 0x8000_0001, true)]
    #[case(ShiftKind::Ror, 8, 0x0000_00FF, false, 0xFF00_0000, true)]
    fn barrel_shifter_cases(
        #[case] shift: ShiftKind,
        #[case] amount: u8,
        #[case] value: u32,
        #[case] carry_in: bool,
        #[case] expected: u32,
        #[case] carry_out: bool,
    ) {
        assert_eq!(
            shift_operand(value, shift, amount, carry_in),
            (expected, carry_out)
        );
    }
}
