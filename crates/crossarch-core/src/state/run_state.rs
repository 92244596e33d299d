use std::fmt;

use crate::FaultRecord;

/// Why a core stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum HaltReason {
    /// Host asked the core to halt.
    Requested,
    /// Cooperative stop flag observed at a cycle boundary.
    Cancelled,
    /// Program requested exit (console service 10, `hlt`).
    Exit,
    /// Configured instruction budget exhausted.
    BudgetExhausted,
    /// Step fault caught at the cycle-loop boundary.
    Fault(FaultRecord),
}

impl HaltReason {
    /// Returns the recorded fault, if this halt was caused by one.
    #[must_use]
    pub const fn fault(self) -> Option<FaultRecord> {
        match self {
            Self::Fault(record) => Some(record),
            Self::Requested | Self::Cancelled | Self::Exit | Self::BudgetExhausted => None,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("halt requested"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Exit => f.write_str("program exit"),
            Self::BudgetExhausted => f.write_str("instruction budget exhausted"),
            Self::Fault(record) => write!(f, "fault: {record}"),
        }
    }
}

/// Core lifecycle: `Idle -> Loaded -> Running -> Halted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Constructed; no image loaded.
    #[default]
    Idle,
    /// Image in ROM, PC at the load address.
    Loaded,
    /// Cycle loop has retired at least one step.
    Running,
    /// Terminal until the next load.
    Halted(HaltReason),
}

impl RunState {
    /// Returns the halt reason when halted.
    #[must_use]
    pub const fn halt_reason(self) -> Option<HaltReason> {
        match self {
            Self::Halted(reason) => Some(reason),
            Self::Idle | Self::Loaded | Self::Running => None,
        }
    }

    /// True while the core can still retire instructions.
    #[must_use]
    pub const fn is_runnable(self) -> bool {
        matches!(self, Self::Loaded | Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::{HaltReason, RunState};
    use crate::StepFault;

    #[test]
    fn run_state_default_is_idle() {
        assert_eq!(RunState::default(), RunState::Idle);
        assert!(!RunState::Idle.is_runnable());
    }

    #[test]
    fn halt_reason_accessor_reports_only_halted_variant() {
        assert_eq!(RunState::Running.halt_reason(), None);
        assert_eq!(
            RunState::Halted(HaltReason::Exit).halt_reason(),
            Some(HaltReason::Exit)
        );
        assert!(!RunState::Halted(HaltReason::Exit).is_runnable());
    }

    #[test]
    fn fault_halt_carries_record() {
        let record = StepFault::opcode(0x3F).at(4, 0xFFFF_FFFF);
        let reason = HaltReason::Fault(record);
        assert_eq!(reason.fault(), Some(record));
        assert!(reason.to_string().starts_with("fault: unsupported opcode"));
        assert_eq!(HaltReason::Cancelled.fault(), None);
    }
}
