//! Bounded FIFO log ring (spec.md §3/§4.6/§9): timestamped lines, oldest
//! evicted past capacity, readable without the motion lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use sampler_common::consts::LOG_RING_CAPACITY;

#[derive(Debug, Default)]
struct Ring {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Ring {
    fn push(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn last_n(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

fn timestamp_prefix() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("[{}.{:03}] ", now.as_secs(), now.subsec_millis())
}

/// Shared, concurrently-readable log ring. The job thread appends;
/// status pollers read a cloned snapshot with no coordination required.
#[derive(Clone)]
pub struct LogRing {
    inner: Arc<RwLock<Ring>>,
}

impl LogRing {
    /// Construct a ring at spec.md's recommended capacity.
    pub fn new() -> Self {
        Self::with_capacity(LOG_RING_CAPACITY)
    }

    /// Construct a ring with an explicit capacity (used in tests).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Ring {
                lines: VecDeque::with_capacity(capacity.min(64)),
                capacity,
            })),
        }
    }

    /// Append one line, timestamped at the moment of the call.
    pub fn push(&self, message: impl Into<String>) {
        let line = format!("{}{}", timestamp_prefix(), message.into());
        self.inner.write().push(line);
    }

    /// Return up to the last `n` lines, oldest first (spec.md §4.6: `logs(last_n)`).
    pub fn last_n(&self, n: usize) -> Vec<String> {
        self.inner.read().last_n(n)
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}
