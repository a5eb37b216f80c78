//! Convenience re-exports of the most load-bearing types, for downstream
//! crates that want a single glob import.

pub use crate::axis::{Axis, Direction, StepCount, ZState};
pub use crate::cancel::{CancelReason, CancellationToken};
pub use crate::config::{ConfigError, ConfigRegistry, Configuration};
pub use crate::error::{ControllerError, ExecutorError, LogicFault, MotionFault, TransportError, ValidationError};
pub use crate::program::{PipetteCount, Program, ProgramStep, ProgramStepError, Repetition};
pub use crate::state::{ExecutionState, StatusSnapshot};
pub use crate::volume::{MilliLiters, VolumeError};
pub use crate::well::{WellId, WellIdError};
