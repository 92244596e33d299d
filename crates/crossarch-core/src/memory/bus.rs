//! Address space owning ROM, RAM, and the IO window for one loaded image.

use crate::image::{check_image_len, check_rom_placement};
use crate::memory::map::{
    resolve_region, Region, IO_BASE, MAX_RAM_BYTES, RAM_BASE, ROM_BASE, UNMAPPED_READ_SENTINEL,
};
use crate::memory::mmio::{IoWrite, Peripherals, UART_STATUS};
use crate::{Diagnostics, ImageError, Notification, NotificationSink};

/// Why a byte write left the address space unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Target lies in ROM.
    ReadOnlyRom,
    /// Target is a read-only IO register.
    ReadOnlyIo,
    /// Target lies in no region.
    Unmapped,
}

/// Outcome of a byte write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOutcome {
    /// Byte stored (or consumed by a peripheral).
    Applied,
    /// Write rejected; logged and counted.
    Rejected(RejectReason),
}

/// ROM, RAM, and peripheral state with fixed region boundaries.
///
/// Bus faults never abort: unmapped reads answer `0xFF` and rejected writes
/// leave every byte unchanged. Both are logged, counted in [`Diagnostics`],
/// and queued as [`Notification::BusFault`].
#[derive(Debug, Clone)]
pub struct AddressSpace {
    rom: Vec<u8>,
    ram: Vec<u8>,
    io: Peripherals,
    pending: Vec<Notification>,
    diagnostics: Diagnostics,
}

impl AddressSpace {
    /// Creates a zeroed address space. RAM is clamped below the IO window.
    #[must_use]
    pub fn new(rom_bytes: usize, ram_bytes: usize) -> Self {
        let rom_bytes = rom_bytes.min(RAM_BASE as usize);
        Self {
            rom: vec![0; rom_bytes],
            ram: vec![0; ram_bytes.min(MAX_RAM_BYTES)],
            io: Peripherals::default(),
            pending: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Creates an address space with `image` copied into ROM at `load_address`.
    ///
    /// ROM grows past `rom_bytes` when the image needs more room.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError`] for empty or oversized images and for images
    /// that would extend into RAM.
    pub fn with_image(
        rom_bytes: usize,
        ram_bytes: usize,
        image: &[u8],
        load_address: u32,
    ) -> Result<Self, ImageError> {
        check_image_len(image.len())?;
        check_rom_placement(load_address, image.len())?;

        let start = (load_address - ROM_BASE) as usize;
        let end = start + image.len();
        let mut space = Self::new(rom_bytes, ram_bytes);
        if space.rom.len() < end {
            space.rom.resize(end, 0);
        }
        space.rom[start..end].copy_from_slice(image);
        Ok(space)
    }

    fn region(&self, addr: u32) -> Region {
        resolve_region(addr, self.rom.len(), self.ram.len())
    }

    /// Reads one byte, recording a bus fault for unmapped addresses.
    pub fn read_byte(&mut self, addr: u32) -> u8 {
        let value = match self.region(addr) {
            Region::Rom(offset) => Some(self.rom[offset]),
            Region::Ram(offset) => Some(self.ram[offset]),
            Region::Io(offset) => {
                let value = self.io.read_byte(offset);
                if value.is_none() {
                    self.diagnostics.record_unmapped_io();
                }
                value
            }
            Region::Unmapped => None,
        };
        value.unwrap_or_else(|| {
            tracing::warn!(addr = format_args!("{addr:#010x}"), "read from unmapped address");
            self.diagnostics.record_unmapped_read(addr);
            self.pending.push(Notification::BusFault { addr, write: false });
            UNMAPPED_READ_SENTINEL
        })
    }

    /// Reads one byte without recording diagnostics.
    #[must_use]
    pub fn peek_byte(&self, addr: u32) -> u8 {
        match self.region(addr) {
            Region::Rom(offset) => self.rom[offset],
            Region::Ram(offset) => self.ram[offset],
            Region::Io(offset) => self
                .io
                .read_byte(offset)
                .unwrap_or(UNMAPPED_READ_SENTINEL),
            Region::Unmapped => UNMAPPED_READ_SENTINEL,
        }
    }

    /// Writes one byte. ROM, read-only IO, and unmapped targets are rejected.
    pub fn write_byte(&mut self, addr: u32, value: u8) -> WriteOutcome {
        let reason = match self.region(addr) {
            Region::Ram(offset) => {
                self.ram[offset] = value;
                return WriteOutcome::Applied;
            }
            Region::Io(offset) => match self.io.write_byte(offset, value) {
                IoWrite::Stored | IoWrite::Discarded => return WriteOutcome::Applied,
                IoWrite::Notify(notification) => {
                    self.pending.push(notification);
                    return WriteOutcome::Applied;
                }
                IoWrite::Rejected if offset & !3 == UART_STATUS => {
                    RejectReason::ReadOnlyIo
                }
                IoWrite::Rejected => {
                    self.diagnostics.record_unmapped_io();
                    RejectReason::Unmapped
                }
            },
            Region::Rom(_) => RejectReason::ReadOnlyRom,
            Region::Unmapped => RejectReason::Unmapped,
        };
        tracing::warn!(
            addr = format_args!("{addr:#010x}"),
            value,
            ?reason,
            "write rejected"
        );
        self.diagnostics.record_rejected_write(addr);
        self.pending.push(Notification::BusFault { addr, write: true });
        WriteOutcome::Rejected(reason)
    }

    /// Reads four successive bytes as a little-endian word.
    pub fn read_word(&mut self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in (0u32..).zip(bytes.iter_mut()) {
            *byte = self.read_byte(addr.wrapping_add(i));
        }
        u32::from_le_bytes(bytes)
    }

    /// Peeks four successive bytes as a little-endian word.
    #[must_use]
    pub fn peek_word(&self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in (0u32..).zip(bytes.iter_mut()) {
            *byte = self.peek_byte(addr.wrapping_add(i));
        }
        u32::from_le_bytes(bytes)
    }

    /// Writes a word as four little-endian byte writes.
    ///
    /// Each byte is resolved on its own, so a word straddling a boundary may
    /// be partially applied. Returns the first rejection, if any.
    pub fn write_word(&mut self, addr: u32, value: u32) -> WriteOutcome {
        let mut outcome = WriteOutcome::Applied;
        for (i, byte) in (0u32..).zip(value.to_le_bytes()) {
            let result = self.write_byte(addr.wrapping_add(i), byte);
            if outcome == WriteOutcome::Applied {
                outcome = result;
            }
        }
        outcome
    }

    /// Advances time-based peripherals by one retired instruction.
    pub const fn tick(&mut self) {
        self.io.tick();
    }

    /// Queues a notification behind any bus events already pending.
    pub fn notify(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    /// Hands every pending notification to `sink`, oldest first.
    pub fn drain_notifications(&mut self, sink: &mut dyn NotificationSink) {
        for notification in self.pending.drain(..) {
            sink.notify(notification);
        }
    }

    /// ROM contents.
    #[must_use]
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// RAM contents.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Peripheral register state.
    #[must_use]
    pub const fn peripherals(&self) -> &Peripherals {
        &self.io
    }

    /// Bus and fault counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Mutable counters, used by the cycle loop to record halting faults.
    pub const fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// One past the last RAM address.
    #[must_use]
    pub fn ram_end(&self) -> u32 {
        let len = u32::try_from(self.ram.len()).unwrap_or(IO_BASE - RAM_BASE);
        RAM_BASE.wrapping_add(len)
    }
}
