//! Shared error taxonomy (spec.md §7).
//!
//! One `thiserror`-derived enum per layer; higher layers wrap lower ones
//! via `#[error(transparent)]` rather than flattening everything into a
//! single type.

use crate::axis::Axis;

/// Validation failures raised while parsing or checking a program or its
/// steps, before any motion is attempted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// A well reference fell outside the plate grid.
    #[error("invalid well: {0}")]
    InvalidWell(#[from] crate::well::WellIdError),
    /// A volume fell outside the accepted range.
    #[error("invalid volume: {0}")]
    InvalidVolume(#[from] crate::volume::VolumeError),
    /// A `ProgramStep` field combination failed validation.
    #[error("invalid step: {0}")]
    InvalidStep(#[from] crate::program::ProgramStepError),
    /// The program contained no steps.
    #[error("program has no steps")]
    EmptyProgram,
}

/// Failures communicating with the microcontroller over the serial
/// transport (spec.md §4.1).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The serial port could not be opened.
    #[error("failed to open serial port {port}: {source}")]
    Open {
        /// Port path or descriptor.
        port: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// A read or write on an open port failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No response arrived before the per-request timeout.
    #[error("request timed out waiting for MCU response")]
    Timeout,
    /// The MCU returned something that did not parse as a valid response.
    #[error("malformed response from MCU: {0}")]
    MalformedResponse(String),
    /// The MCU reported the operation was rejected.
    #[error("MCU rejected request: {0}")]
    Rejected(String),
    /// Reconnect attempts were exhausted.
    #[error("transport disconnected and reconnect failed: {0}")]
    Disconnected(String),
}

/// Motion faults: hardware-reported or envelope failures, fatal for the
/// current job and forcing `Position Tracker::initialized = false`
/// (spec.md §7: `UnexpectedLimit`, `OutOfEnvelope`, `MCUError`).
#[derive(Debug, thiserror::Error)]
pub enum MotionFault {
    /// The driver reported a limit switch triggered mid-move outside a
    /// homing operation.
    #[error("axis {axis:?} hit an unexpected limit switch")]
    UnexpectedLimit {
        /// Axis that faulted.
        axis: Axis,
    },
    /// The requested target fell outside the configured travel envelope.
    #[error("axis {axis:?} target {requested} steps is outside the travel envelope (limit {limit})")]
    OutOfEnvelope {
        /// Axis that faulted.
        axis: Axis,
        /// Requested step count.
        requested: i64,
        /// Configured envelope limit.
        limit: i64,
    },
    /// The axis failed to reach its home position within `max_steps`.
    #[error("axis {axis:?} failed to home")]
    HomingFailed {
        /// Axis that faulted.
        axis: Axis,
    },
    /// The MCU reported an error frame for a motion request.
    #[error("MCU error: {0}")]
    McuError(String),
    /// An underlying transport error occurred mid-motion.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Logic faults: invariant violations the Executor detects in its own
/// bookkeeping rather than from the MCU, fatal for the current job but
/// leaving `Position Tracker::initialized` untouched (spec.md §7: pipette
/// `Overflow`/`Underflow`, `InvalidGeometry`).
///
/// `loaded`/`capacity` are plain `Decimal`, not `MilliLiters`: a tip's
/// loaded volume is legitimately `0` between steps, which the
/// `(0, 10]`-validated `MilliLiters` newtype cannot represent.
#[derive(Debug, thiserror::Error)]
pub enum LogicFault {
    /// Aspirating `attempted` mL would push `loaded` past `capacity`.
    #[error("aspirating {attempted} mL would overflow the tip ({loaded} mL loaded, {capacity} mL capacity)")]
    Overflow {
        /// Volume the step attempted to aspirate.
        attempted: crate::volume::MilliLiters,
        /// Volume already loaded in the tip.
        loaded: rust_decimal::Decimal,
        /// Configured pipette capacity.
        capacity: rust_decimal::Decimal,
    },
    /// Dispensing `attempted` mL would take `loaded` negative.
    #[error("dispensing {attempted} mL would underflow the tip ({loaded} mL loaded)")]
    Underflow {
        /// Volume the step attempted to dispense.
        attempted: crate::volume::MilliLiters,
        /// Volume already loaded in the tip.
        loaded: rust_decimal::Decimal,
    },
    /// A multi-pipette step's center column fell outside `1..=12`.
    #[error("invalid multi-pipette geometry: {reason}")]
    InvalidGeometry {
        /// Human-readable explanation.
        reason: String,
    },
}

/// Aggregated error surfaced by the Pipetting Executor (spec.md §4.5, §7).
/// The Execution Controller maps `Validation`/`Motion`/`Logic`/`Transport`
/// to `ExecutionState::Error`, but `Cancelled` is not a fault — it is the
/// expected outcome of a user `stop()` and maps to `Stopping` then `Idle`.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`MotionFault`].
    #[error(transparent)]
    Motion(#[from] MotionFault),
    /// See [`LogicFault`].
    #[error(transparent)]
    Logic(#[from] LogicFault),
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The program was cancelled by user request.
    #[error("cancelled by user request")]
    Cancelled,
}

/// Errors the Execution Controller surfaces at its public API boundary
/// (spec.md §4.6, §5), adding the request-level rejection reasons on top
/// of [`ExecutorError`].
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// A motion request arrived while a program was already executing.
    #[error("sampler is busy running another operation")]
    Busy,
    /// A motion request arrived before homing completed.
    #[error("sampler has not been homed yet")]
    NotInitialized,
    /// See [`ExecutorError`].
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// See [`crate::config::ConfigError`].
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_wraps_well_error() {
        let werr = crate::well::WellId::new(9, 1).unwrap_err();
        let verr: ValidationError = werr.into();
        assert!(verr.to_string().contains("invalid well"));
    }

    #[test]
    fn executor_error_wraps_logic_fault() {
        let lf = LogicFault::InvalidGeometry {
            reason: "column 0 illegal".to_string(),
        };
        let ee: ExecutorError = lf.into();
        assert!(matches!(ee, ExecutorError::Logic(LogicFault::InvalidGeometry { .. })));
    }

    #[test]
    fn controller_error_wraps_executor_error() {
        let ee = ExecutorError::Cancelled;
        let ce: ControllerError = ee.into();
        assert!(ce.to_string().contains("cancelled"));
    }
}
