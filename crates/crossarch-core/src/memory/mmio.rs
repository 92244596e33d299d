//! Minimal memory-mapped peripheral stand-ins behind `IO_BASE`.
//!
//! Every register is four bytes wide and little-endian; byte accesses select a
//! lane inside the register. Offsets are relative to `IO_BASE`.

use crate::Notification;

/// UART transmit data register.
pub const UART_DATA: u32 = 0x0000;
/// UART status register (read-only).
pub const UART_STATUS: u32 = 0x0004;
/// UART control register.
pub const UART_CONTROL: u32 = 0x0008;
/// Timer control register (bit 0 enables counting).
pub const TIMER_CONTROL: u32 = 0x1000;
/// Timer counter register.
pub const TIMER_VALUE: u32 = 0x1004;
/// Interrupt-controller mask register.
pub const INTC_MASK: u32 = 0x2000;
/// Interrupt-controller pending register (write-1-to-clear).
pub const INTC_PENDING: u32 = 0x2004;
/// GPIO data register.
pub const GPIO_DATA: u32 = 0x3000;
/// GPIO direction register.
pub const GPIO_DIRECTION: u32 = 0x3004;
/// First offset of the reserved network-controller window.
pub const NETWORK_STUB_START: u32 = 0x4000;
/// Last offset of the reserved network-controller window.
pub const NETWORK_STUB_END: u32 = 0x4FFF;
/// First offset of the reserved video-controller window.
pub const VIDEO_STUB_START: u32 = 0x5000;
/// Last offset of the reserved video-controller window.
pub const VIDEO_STUB_END: u32 = 0x5FFF;

/// UART status bit reporting the transmitter ready.
pub const UART_STATUS_TX_READY: u32 = 0x1;
/// Timer control bit enabling the counter.
pub const TIMER_ENABLE: u32 = 0x1;
/// Pending-register bit raised on timer overflow.
pub const TIMER_IRQ: u32 = 0x1;

/// Result of a byte write into the IO window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoWrite {
    /// Register updated silently.
    Stored,
    /// Register updated and produced a host notification.
    Notify(Notification),
    /// Reserved stub range; write logged and discarded.
    Discarded,
    /// Read-only register or unassigned offset; nothing changed.
    Rejected,
}

/// Register state for the UART, timer, interrupt controller, and GPIO block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Peripherals {
    uart_control: u32,
    timer_control: u32,
    timer_value: u32,
    intc_mask: u32,
    intc_pending: u32,
    gpio_data: u32,
    gpio_direction: u32,
}

const fn lane_shift(offset: u32) -> u32 {
    (offset & 3) * 8
}

const fn replace_lane(word: u32, offset: u32, value: u8) -> u32 {
    let shift = lane_shift(offset);
    (word & !(0xFF << shift)) | ((value as u32) << shift)
}

const fn is_stub(register: u32) -> bool {
    matches!(
        register,
        NETWORK_STUB_START..=NETWORK_STUB_END | VIDEO_STUB_START..=VIDEO_STUB_END
    )
}

impl Peripherals {
    /// Reads one byte lane, or `None` when the offset is not assigned.
    #[must_use]
    pub fn read_byte(&self, offset: u32) -> Option<u8> {
        let register = offset & !3;
        if is_stub(register) {
            return Some(0);
        }
        let word = self.read_register(register)?;
        Some((word >> lane_shift(offset)) as u8)
    }

    /// Returns the full value of an assigned register.
    #[must_use]
    pub const fn read_register(&self, register: u32) -> Option<u32> {
        let value = match register {
            UART_DATA => 0,
            UART_STATUS => UART_STATUS_TX_READY,
            UART_CONTROL => self.uart_control,
            TIMER_CONTROL => self.timer_control,
            TIMER_VALUE => self.timer_value,
            INTC_MASK => self.intc_mask,
            INTC_PENDING => self.intc_pending,
            GPIO_DATA => self.gpio_data,
            GPIO_DIRECTION => self.gpio_direction,
            _ => return None,
        };
        Some(value)
    }

    /// Writes one byte lane and reports the side effect.
    pub fn write_byte(&mut self, offset: u32, value: u8) -> IoWrite {
        let register = offset & !3;
        if is_stub(register) {
            tracing::debug!(offset, value, "write to reserved peripheral stub discarded");
            return IoWrite::Discarded;
        }
        match register {
            UART_DATA => {
                if offset == UART_DATA {
                    IoWrite::Notify(Notification::UartOutput(value))
                } else {
                    IoWrite::Stored
                }
            }
            UART_CONTROL => {
                self.uart_control = replace_lane(self.uart_control, offset, value);
                IoWrite::Stored
            }
            TIMER_CONTROL => {
                self.timer_control = replace_lane(self.timer_control, offset, value);
                IoWrite::Stored
            }
            TIMER_VALUE => {
                self.timer_value = replace_lane(self.timer_value, offset, value);
                IoWrite::Stored
            }
            INTC_MASK => {
                self.intc_mask = replace_lane(self.intc_mask, offset, value);
                IoWrite::Stored
            }
            INTC_PENDING => {
                self.intc_pending &= !(u32::from(value) << lane_shift(offset));
                IoWrite::Stored
            }
            GPIO_DATA => {
                let previous = self.gpio_data;
                self.gpio_data = replace_lane(previous, offset, value);
                if self.gpio_data == previous {
                    IoWrite::Stored
                } else {
                    IoWrite::Notify(Notification::GpioChanged(self.gpio_data))
                }
            }
            GPIO_DIRECTION => {
                self.gpio_direction = replace_lane(self.gpio_direction, offset, value);
                IoWrite::Stored
            }
            _ => IoWrite::Rejected,
        }
    }

    /// Advances the timer by one count when enabled; overflow raises the
    /// timer interrupt bit.
    pub const fn tick(&mut self) {
        if self.timer_control & TIMER_ENABLE == 0 {
            return;
        }
        let (next, overflowed) = self.timer_value.overflowing_add(1);
        self.timer_value = next;
        if overflowed {
            self.intc_pending |= TIMER_IRQ;
        }
    }

    /// Pending interrupt lines not masked off.
    #[must_use]
    pub const fn pending_unmasked(&self) -> u32 {
        self.intc_pending & !self.intc_mask
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        IoWrite, Peripherals, GPIO_DATA, INTC_PENDING, TIMER_CONTROL, TIMER_IRQ, TIMER_VALUE,
        UART_CONTROL, UART_DATA, UART_STATUS, UART_STATUS_TX_READY,
    };
    use crate::Notification;

    fn write_word(io: &mut Peripherals, register: u32, value: u32) {
        for (lane, byte) in value.to_le_bytes().into_iter().enumerate() {
            let _ = io.write_byte(register + lane as u32, byte);
        }
    }

    #[test]
    fn uart_status_reports_ready_and_rejects_writes() {
        let mut io = Peripherals::default();
        assert_eq!(io.read_byte(UART_STATUS), Some(UART_STATUS_TX_READY as u8));
        assert_eq!(io.write_byte(UART_STATUS, 0), IoWrite::Rejected);
        assert_eq!(io.read_byte(UART_STATUS), Some(1));
    }

    #[test]
    fn uart_data_low_lane_emits_character() {
        let mut io = Peripherals::default();
        assert_eq!(
            io.write_byte(UART_DATA, b'A'),
            IoWrite::Notify(Notification::UartOutput(b'A'))
        );
        assert_eq!(io.write_byte(UART_DATA + 1, b'B'), IoWrite::Stored);
        assert_eq!(io.read_byte(UART_DATA), Some(0));
    }

    #[test]
    fn control_register_lanes_compose_little_endian() {
        let mut io = Peripherals::default();
        write_word(&mut io, UART_CONTROL, 0x1122_3344);
        assert_eq!(io.read_register(UART_CONTROL), Some(0x1122_3344));
        assert_eq!(io.read_byte(UART_CONTROL), Some(0x44));
        assert_eq!(io.read_byte(UART_CONTROL + 3), Some(0x11));
    }

    #[test]
    fn gpio_change_notifies_only_when_value_moves() {
        let mut io = Peripherals::default();
        assert_eq!(
            io.write_byte(GPIO_DATA, 0x5A),
            IoWrite::Notify(Notification::GpioChanged(0x5A))
        );
        assert_eq!(io.write_byte(GPIO_DATA, 0x5A), IoWrite::Stored);
    }

    #[test]
    fn timer_counts_only_when_enabled_and_overflow_sets_pending() {
        let mut io = Peripherals::default();
        io.tick();
        assert_eq!(io.read_register(TIMER_VALUE), Some(0));

        write_word(&mut io, TIMER_VALUE, u32::MAX);
        write_word(&mut io, TIMER_CONTROL, 1);
        io.tick();
        assert_eq!(io.read_register(TIMER_VALUE), Some(0));
        assert_eq!(io.read_register(INTC_PENDING), Some(TIMER_IRQ));
        assert_eq!(io.pending_unmasked(), TIMER_IRQ);

        assert_eq!(io.write_byte(INTC_PENDING, 1), IoWrite::Stored);
        assert_eq!(io.read_register(INTC_PENDING), Some(0));
    }

    #[rstest]
    #[case(0x4000)]
    #[case(0x4FFC)]
    #[case(0x5000)]
    #[case(0x5FFF)]
    fn stub_windows_read_zero_and_discard_writes(#[case] offset: u32) {
        let mut io = Peripherals::default();
        assert_eq!(io.write_byte(offset, 0xAA), IoWrite::Discarded);
        assert_eq!(io.read_byte(offset), Some(0));
    }

    #[rstest]
    #[case(0x000C)]
    #[case(0x1008)]
    #[case(0x6000)]
    #[case(0x0FFF_FFFC)]
    fn unassigned_offsets_are_unmapped(#[case] offset: u32) {
        let mut io = Peripherals::default();
        assert_eq!(io.read_byte(offset), None);
        assert_eq!(io.write_byte(offset, 1), IoWrite::Rejected);
    }
}
