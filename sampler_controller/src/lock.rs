//! Motion lock (spec.md §4.6/§5): the process-wide binary lock gating
//! `start_program`, `home_all`, and every single-primitive entry point.
//! Acquisition is non-blocking — a caller that finds it held is told
//! `Busy` rather than waiting. A single anonymous holder is all this
//! system needs, since it only ever has one motion owner at a time.

use std::sync::Arc;

use parking_lot::Mutex;

/// A process-wide binary lock shared by every clone.
#[derive(Clone)]
pub struct MotionLock {
    held: Arc<Mutex<bool>>,
}

impl MotionLock {
    /// Construct a lock that starts free.
    pub fn new() -> Self {
        Self {
            held: Arc::new(Mutex::new(false)),
        }
    }

    /// Attempt to acquire the lock without blocking. Returns `None` if
    /// another caller already holds it.
    pub fn try_acquire(&self) -> Option<MotionLockGuard> {
        let mut held = self.held.lock();
        if *held {
            None
        } else {
            *held = true;
            Some(MotionLockGuard {
                held: self.held.clone(),
            })
        }
    }

    /// Whether a caller currently holds the lock.
    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

impl Default for MotionLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle releasing the lock when dropped. Held for the duration of
/// a job thread (`start_program`) or a synchronous single-primitive call.
pub struct MotionLockGuard {
    held: Arc<Mutex<bool>>,
}

impl Drop for MotionLockGuard {
    fn drop(&mut self) {
        *self.held.lock() = false;
    }
}
