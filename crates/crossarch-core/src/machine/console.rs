//! Console services reachable from every ISA's system-call instruction.

use crate::memory::AddressSpace;
use crate::{FaultCode, Notification, StepFault};

/// Print the argument as a signed integer.
pub const PRINT_INTEGER: u32 = 1;
/// Print the NUL-terminated string at the argument address.
pub const PRINT_STRING: u32 = 4;
/// Terminate the program.
pub const EXIT: u32 = 10;
/// Print the low byte of the argument as a character.
pub const PRINT_CHAR: u32 = 11;

/// Longest string printed by [`PRINT_STRING`] before truncation.
pub const MAX_STRING_BYTES: usize = 4096;

/// Control-flow effect of a service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Continue with the next instruction.
    Continue,
    /// Halt with [`crate::HaltReason::Exit`].
    Exit,
}

/// Performs console service `number` with argument `arg`.
///
/// Output is queued on the address space so it stays ordered with any bus
/// faults raised while reading a string.
///
/// # Errors
///
/// Returns an [`FaultCode::UnsupportedSyscall`] fault for unknown services.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub fn perform(bus: &mut AddressSpace, number: u32, arg: u32) -> Result<ServiceOutcome, StepFault> {
    match number {
        PRINT_INTEGER => bus.notify(Notification::ConsoleInteger(arg as i32)),
        PRINT_STRING => {
            let text = read_c_string(bus, arg);
            bus.notify(Notification::ConsoleText(text));
        }
        EXIT => return Ok(ServiceOutcome::Exit),
        PRINT_CHAR => bus.notify(Notification::ConsoleChar(arg as u8)),
        _ => return Err(StepFault::new(FaultCode::UnsupportedSyscall, number)),
    }
    Ok(ServiceOutcome::Continue)
}

fn read_c_string(bus: &mut AddressSpace, addr: u32) -> String {
    let mut bytes = Vec::new();
    let mut cursor = addr;
    while bytes.len() < MAX_STRING_BYTES {
        let byte = bus.read_byte(cursor);
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        cursor = cursor.wrapping_add(1);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::{perform, ServiceOutcome, EXIT, MAX_STRING_BYTES, PRINT_CHAR, PRINT_INTEGER, PRINT_STRING};
    use crate::memory::{AddressSpace, RAM_BASE};
    use crate::{FaultCode, Notification, RecordingSink};

    fn drained(bus: &mut AddressSpace) -> Vec<Notification> {
        let mut sink = RecordingSink::default();
        bus.drain_notifications(&mut sink);
        sink.notifications
    }

    #[test]
    fn print_integer_is_signed() {
        let mut bus = AddressSpace::new(16, 16);
        assert_eq!(
            perform(&mut bus, PRINT_INTEGER, u32::MAX),
            Ok(ServiceOutcome::Continue)
        );
        assert_eq!(drained(&mut bus), vec![Notification::ConsoleInteger(-1)]);
    }

    #[test]
    fn print_string_stops_at_nul() {
        let mut bus = AddressSpace::new(16, 64);
        for (i, byte) in (0u32..).zip(b"hi\0there") {
            bus.write_byte(RAM_BASE + i, *byte);
        }
        perform(&mut bus, PRINT_STRING, RAM_BASE).expect("service 4");
        assert_eq!(
            drained(&mut bus),
            vec![Notification::ConsoleText("hi".to_string())]
        );
    }

    #[test]
    fn print_string_is_bounded() {
        let mut bus = AddressSpace::new(16, MAX_STRING_BYTES * 2);
        for i in 0..u32::try_from(MAX_STRING_BYTES * 2).expect("fits") {
            bus.write_byte(RAM_BASE + i, b'a');
        }
        perform(&mut bus, PRINT_STRING, RAM_BASE).expect("service 4");
        match drained(&mut bus).as_slice() {
            [Notification::ConsoleText(text)] => assert_eq!(text.len(), MAX_STRING_BYTES),
            other => panic!("unexpected notifications: {other:?}"),
        }
    }

    #[test]
    fn exit_and_char_services() {
        let mut bus = AddressSpace::new(16, 16);
        assert_eq!(perform(&mut bus, EXIT, 0), Ok(ServiceOutcome::Exit));
        assert_eq!(
            perform(&mut bus, PRINT_CHAR, 0x141),
            Ok(ServiceOutcome::Continue)
        );
        assert_eq!(drained(&mut bus), vec![Notification::ConsoleChar(b'A')]);
    }

    #[test]
    fn unknown_service_faults_with_number() {
        let mut bus = AddressSpace::new(16, 16);
        let fault = perform(&mut bus, 99, 0).expect_err("service 99 is not provided");
        assert_eq!(fault.code, FaultCode::UnsupportedSyscall);
        assert_eq!(fault.detail, 99);
    }
}
