//! Address-space model: fixed region map, byte/word bus, and MMIO stand-ins.

/// ROM/RAM/IO address space servicing byte and word accesses.
pub mod bus;
/// Fixed region bases and region resolution.
pub mod map;
/// Memory-mapped peripheral registers.
pub mod mmio;

pub use bus::{AddressSpace, RejectReason, WriteOutcome};
pub use map::{
    resolve_region, Region, DEFAULT_RAM_BYTES, DEFAULT_ROM_BYTES, IO_BASE, MAX_RAM_BYTES,
    RAM_BASE, ROM_BASE, UNMAPPED_READ_SENTINEL,
};
pub use mmio::{IoWrite, Peripherals};
