//! Fixed region bases and the region resolver.

/// Base address of the ROM region.
pub const ROM_BASE: u32 = 0x0000_0000;
/// Base address of the RAM region.
pub const RAM_BASE: u32 = 0x8000_0000;
/// Base address of the memory-mapped IO window.
pub const IO_BASE: u32 = 0xF000_0000;

/// Largest RAM buffer that stays below the IO window.
pub const MAX_RAM_BYTES: usize = (IO_BASE - RAM_BASE) as usize;
/// Default ROM buffer size when the image is smaller.
pub const DEFAULT_ROM_BYTES: usize = 64 * 1024;
/// Default RAM buffer size.
pub const DEFAULT_RAM_BYTES: usize = 1024 * 1024;

/// Byte returned for reads that hit no region.
pub const UNMAPPED_READ_SENTINEL: u8 = 0xFF;

/// Region classification for an address, with the offset into that region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Offset into the ROM buffer.
    Rom(usize),
    /// Offset into the RAM buffer.
    Ram(usize),
    /// Offset into the IO window.
    Io(u32),
    /// No backing region.
    Unmapped,
}

/// Resolves `addr` in fixed priority order: ROM, RAM, IO, else unmapped.
#[must_use]
pub const fn resolve_region(addr: u32, rom_len: usize, ram_len: usize) -> Region {
    let rom_offset = addr.wrapping_sub(ROM_BASE) as usize;
    if addr >= ROM_BASE && rom_offset < rom_len {
        return Region::Rom(rom_offset);
    }
    let ram_offset = addr.wrapping_sub(RAM_BASE) as usize;
    if addr >= RAM_BASE && ram_offset < ram_len {
        return Region::Ram(ram_offset);
    }
    if addr >= IO_BASE {
        return Region::Io(addr - IO_BASE);
    }
    Region::Unmapped
}
