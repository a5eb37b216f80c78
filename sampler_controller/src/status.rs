//! Status publisher (spec.md §4.6/§5/§9): atomic snapshot-swap so a
//! status poller never observes a half-updated `StatusSnapshot`.

use std::sync::Arc;

use parking_lot::RwLock;

use sampler_common::state::{ExecutionState, StatusSnapshot};

fn operation_message(state: &ExecutionState) -> String {
    match state {
        ExecutionState::Idle => "idle".to_string(),
        ExecutionState::Homing => "homing".to_string(),
        ExecutionState::Moving => "moving".to_string(),
        ExecutionState::Aspirating => "aspirating".to_string(),
        ExecutionState::Dispensing => "dispensing".to_string(),
        ExecutionState::Rinsing => "rinsing".to_string(),
        ExecutionState::Waiting => "waiting".to_string(),
        ExecutionState::Stopping => "stopping".to_string(),
        ExecutionState::Error { reason } => format!("error: {reason}"),
    }
}

/// Shared, concurrently-readable status snapshot.
#[derive(Clone)]
pub struct StatusPublisher {
    inner: Arc<RwLock<Arc<StatusSnapshot>>>,
}

impl StatusPublisher {
    /// Construct a publisher holding the process-start snapshot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(StatusSnapshot::startup()))),
        }
    }

    /// Publish a whole new snapshot atomically.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }

    /// Update only the operation-in-progress fields, keeping the last
    /// known position fields untouched — used for the frequent,
    /// cheap updates a running job emits between the full-snapshot
    /// publishes taken at job start/end.
    pub fn update_operation(&self, state: sampler_common::state::ExecutionState, well: Option<sampler_common::well::WellId>) {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        next.is_executing = state.is_executing();
        next.message = operation_message(&state);
        next.current_operation = state;
        next.operation_well = well;
        *guard = Arc::new(next);
    }

    /// Non-blocking read of the current snapshot (spec.md §4.6: `status()`).
    pub fn current(&self) -> Arc<StatusSnapshot> {
        self.inner.read().clone()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampler_common::state::ExecutionState;

    #[test]
    fn starts_with_startup_snapshot() {
        let publisher = StatusPublisher::new();
        assert_eq!(publisher.current().current_operation, ExecutionState::Idle);
        assert!(!publisher.current().is_executing);
    }

    #[test]
    fn publish_replaces_the_whole_snapshot() {
        let publisher = StatusPublisher::new();
        let mut snap = StatusSnapshot::startup();
        snap.initialized = true;
        publisher.publish(snap);
        assert!(publisher.current().initialized);
    }

    #[test]
    fn update_operation_leaves_position_fields_untouched() {
        let publisher = StatusPublisher::new();
        let mut snap = StatusSnapshot::startup();
        snap.initialized = true;
        snap.pipette_count = 3;
        publisher.publish(snap);

        publisher.update_operation(ExecutionState::Moving, None);
        let after = publisher.current();
        assert_eq!(after.current_operation, ExecutionState::Moving);
        assert!(after.is_executing);
        assert!(after.initialized);
        assert_eq!(after.pipette_count, 3);
    }
}
