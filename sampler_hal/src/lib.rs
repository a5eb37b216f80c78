//! Transport and Motor Driver Client: the host-side half of the MCU wire
//! protocol (spec.md §4.1, §4.2, §6).

pub mod driver;
pub mod sim;
pub mod transport;
pub mod wire;

pub use driver::{HomeOutcome, MotorDriverClient, MotorError, StepOutcome};
pub use transport::{SerialTransport, Transport, TransportResult};
