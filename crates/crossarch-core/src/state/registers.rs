/// Access to the architectural program counter.
pub trait ProgramCounter {
    /// Current program counter.
    fn pc(&self) -> u32;
    /// Replaces the program counter.
    fn set_pc(&mut self, value: u32);
}

/// Fixed-size general-purpose register array plus PC and a status word.
///
/// The status word holds whichever flag register the ISA defines (CPSR on
/// ARM, EFLAGS on x86); ISAs without one leave it at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile<const N: usize> {
    gpr: [u32; N],
    pc: u32,
    status: u32,
}

impl<const N: usize> Default for RegisterFile<N> {
    fn default() -> Self {
        Self {
            gpr: [0; N],
            pc: 0,
            status: 0,
        }
    }
}

impl<const N: usize> RegisterFile<N> {
    /// Number of general-purpose registers.
    pub const COUNT: usize = N;

    /// Reads a general-purpose register. Out-of-range indices read as zero.
    #[must_use]
    pub fn gpr(&self, index: usize) -> u32 {
        self.gpr.get(index).copied().unwrap_or(0)
    }

    /// Writes a general-purpose register. Out-of-range indices are ignored.
    pub fn set_gpr(&mut self, index: usize, value: u32) {
        if let Some(slot) = self.gpr.get_mut(index) {
            *slot = value;
        }
    }

    /// Status/flags word.
    #[must_use]
    pub const fn status(&self) -> u32 {
        self.status
    }

    /// Replaces the status/flags word.
    pub const fn set_status(&mut self, value: u32) {
        self.status = value;
    }

    /// Sets or clears the bits in `mask` of the status word.
    pub const fn set_status_bit(&mut self, mask: u32, enabled: bool) {
        if enabled {
            self.status |= mask;
        } else {
            self.status &= !mask;
        }
    }

    /// Snapshot of all general-purpose registers.
    #[must_use]
    pub fn values(&self) -> Vec<u32> {
        self.gpr.to_vec()
    }
}

impl<const N: usize> ProgramCounter for RegisterFile<N> {
    fn pc(&self) -> u32 {
        self.pc
    }

    fn set_pc(&mut self, value: u32) {
        self.pc = value;
    }
}
