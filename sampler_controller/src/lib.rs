//! Execution Controller (spec.md §4.6, §5): motion lock, job/request
//! concurrency split, StatusSnapshot/LogRing publication.

pub mod controller;
pub mod lock;
pub mod logring;
pub mod status;

pub use controller::ExecutionController;
pub use lock::{MotionLock, MotionLockGuard};
pub use logring::LogRing;
pub use status::StatusPublisher;
