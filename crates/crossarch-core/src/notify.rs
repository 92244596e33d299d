//! Host-facing notification channel.
//!
//! Only notifications cross thread boundaries; register and memory state stay
//! with the core that owns them.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{BootStage, HaltReason};

/// Status and output events emitted by a core in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Notification {
    /// Console service: print integer.
    ConsoleInteger(i32),
    /// Console service: print NUL-terminated string.
    ConsoleText(String),
    /// Console service: print single character.
    ConsoleChar(u8),
    /// Byte written to the UART data register.
    UartOutput(u8),
    /// GPIO data register changed to the given value.
    GpioChanged(u32),
    /// Soft bus fault (sentinel read or rejected write).
    BusFault {
        /// Offending address.
        addr: u32,
        /// True for writes, false for reads.
        write: bool,
    },
    /// Synthetic boot sequence advanced to a new stage.
    BootStage(BootStage),
    /// Core entered its terminal halted state.
    Halted(HaltReason),
}

/// Receiver of core notifications.
pub trait NotificationSink {
    /// Records a notification in execution order.
    fn notify(&mut self, notification: Notification);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&mut self, _notification: Notification) {}
}

/// Sink that keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Notifications in arrival order.
    pub notifications: Vec<Notification>,
}

impl RecordingSink {
    /// Concatenates console and UART output as text.
    #[must_use]
    pub fn console_output(&self) -> String {
        console_text(&self.notifications)
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}

/// Sink forwarding notifications over a `crossbeam-channel` sender.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Notification>,
}

impl ChannelSink {
    /// Wraps an existing sender.
    #[must_use]
    pub const fn new(sender: Sender<Notification>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with the receiving end of an unbounded channel.
    #[must_use]
    pub fn pair() -> (Self, Receiver<Notification>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender), receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&mut self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

/// Renders console-style notifications as the text a terminal would show.
#[must_use]
pub fn console_text(notifications: &[Notification]) -> String {
    let mut out = String::new();
    for notification in notifications {
        match notification {
            Notification::ConsoleInteger(value) => out.push_str(&value.to_string()),
            Notification::ConsoleText(text) => out.push_str(text),
            Notification::ConsoleChar(byte) | Notification::UartOutput(byte) => {
                out.push(char::from(*byte));
            }
            Notification::GpioChanged(_)
            | Notification::BusFault { .. }
            | Notification::BootStage(_)
            | Notification::Halted(_) => {}
        }
    }
    out
}
