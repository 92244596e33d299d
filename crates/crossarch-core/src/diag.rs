//! Diagnostic counters kept alongside each address space.

use crate::{FaultClass, FaultRecord};

/// Saturating counters and last-fault tracking for one loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Diagnostics {
    /// Reads from unmapped addresses (answered with the sentinel byte).
    pub unmapped_reads: u32,
    /// Writes rejected because the target was ROM, read-only IO, or unmapped.
    pub rejected_writes: u32,
    /// Accesses inside the IO window at offsets no peripheral decodes.
    /// These are also counted as unmapped reads or rejected writes.
    pub unmapped_io: u32,
    /// Address of the most recent soft bus fault.
    pub last_bus_fault: Option<u32>,
    /// Decode-class step faults.
    pub decode_faults: u32,
    /// Service-class step faults.
    pub service_faults: u32,
    /// Most recent step fault that halted the core.
    pub last_fault: Option<FaultRecord>,
    /// Instructions retired since the image was loaded.
    pub instructions_retired: u64,
}

impl Diagnostics {
    /// Records a read from an unmapped address.
    pub const fn record_unmapped_read(&mut self, addr: u32) {
        self.unmapped_reads = self.unmapped_reads.saturating_add(1);
        self.last_bus_fault = Some(addr);
    }

    /// Records a rejected write.
    pub const fn record_rejected_write(&mut self, addr: u32) {
        self.rejected_writes = self.rejected_writes.saturating_add(1);
        self.last_bus_fault = Some(addr);
    }

    /// Records an access to an undecoded IO offset.
    pub const fn record_unmapped_io(&mut self) {
        self.unmapped_io = self.unmapped_io.saturating_add(1);
    }

    /// Records one retired instruction.
    pub const fn record_retired(&mut self) {
        self.instructions_retired = self.instructions_retired.saturating_add(1);
    }

    /// Records a halting step fault and bumps its class counter.
    pub const fn record_fault(&mut self, record: FaultRecord) {
        match record.code.class() {
            FaultClass::Decode => self.decode_faults = self.decode_faults.saturating_add(1),
            FaultClass::Service => self.service_faults = self.service_faults.saturating_add(1),
        }
        self.last_fault = Some(record);
    }

    /// Total soft bus faults observed.
    #[must_use]
    pub const fn bus_faults(&self) -> u32 {
        self.unmapped_reads.saturating_add(self.rejected_writes)
    }
}
