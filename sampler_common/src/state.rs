//! Execution state and status snapshot types (spec.md §3).

use serde::{Deserialize, Serialize};

use crate::axis::ZState;
use crate::well::WellId;

/// High-level execution state of the sampler (spec.md §3/§4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionState {
    /// No program running, axes not necessarily homed.
    Idle,
    /// Running the homing sequence.
    Homing,
    /// Traveling between wells with Z up.
    Moving,
    /// Drawing liquid into the tip.
    Aspirating,
    /// Expelling liquid from the tip.
    Dispensing,
    /// Running a rinse cycle.
    Rinsing,
    /// Sleeping out a step's `wait_seconds`.
    Waiting,
    /// Unwinding a cancellation request.
    Stopping,
    /// A fault halted execution; program must be restarted.
    Error {
        /// Human-readable fault description.
        reason: String,
    },
}

impl ExecutionState {
    /// True for any state that represents active program execution
    /// (used by the Execution Controller's busy-rejection contract,
    /// spec.md §5).
    pub fn is_executing(&self) -> bool {
        !matches!(self, ExecutionState::Idle | ExecutionState::Error { .. })
    }
}

/// A point-in-time snapshot of sampler status, atomically published by the
/// Execution Controller and read without locking by status pollers
/// (spec.md §3, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether the axes have completed homing since power-on.
    pub initialized: bool,
    /// Last well the tip was commanded to, if any.
    pub current_well: Option<WellId>,
    /// Current Z safe-travel state.
    pub z_state: ZState,
    /// Currently configured tip count.
    pub pipette_count: u8,
    /// Current execution state.
    pub current_operation: ExecutionState,
    /// Well associated with the current operation, if any.
    pub operation_well: Option<WellId>,
    /// Convenience flag mirroring `current_operation.is_executing()`.
    pub is_executing: bool,
    /// Free-form status or fault message for display.
    pub message: String,
}

impl StatusSnapshot {
    /// The snapshot published immediately after process start, before any
    /// command has run.
    pub fn startup() -> Self {
        Self {
            initialized: false,
            current_well: None,
            z_state: ZState::Up,
            pipette_count: 1,
            current_operation: ExecutionState::Idle,
            operation_well: None,
            is_executing: false,
            message: "starting up".to_string(),
        }
    }
}
