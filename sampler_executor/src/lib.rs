//! Kinematics, Position Tracker, per-step state machine, repetition
//! scheduling, and the Pipetting Executor that drives them together
//! (spec.md §4.3–§4.5).

pub mod executor;
pub mod kinematics;
pub mod position;
pub mod repetition;
pub mod step_machine;

pub use executor::{ExecutorObserver, NullObserver, PipettingExecutor};
pub use position::{PositionSnapshot, PositionTracker};
