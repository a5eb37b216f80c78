//! Position Tracker (spec.md §4.4): authoritative, single-writer record
//! of the four axis positions, last-known well, and Z state.

use sampler_common::axis::{Axis, Direction, StepCount, ZState};
use sampler_common::error::MotionFault;
use sampler_common::well::WellId;

/// Process-wide axis position record. Mutated only by the Pipetting
/// Executor while the Execution Controller holds the motion lock;
/// readers elsewhere obtain a cloned snapshot via [`Self::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionTracker {
    positions: [StepCount; sampler_common::consts::NUM_AXES],
    current_well: Option<WellId>,
    z_state: ZState,
    pipette_count: u8,
    initialized: bool,
}

/// An immutable point-in-time read of [`PositionTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSnapshot {
    /// Current step position, indexed by [`Axis::index`].
    pub positions: [StepCount; sampler_common::consts::NUM_AXES],
    /// Last well the tip was commanded to.
    pub current_well: Option<WellId>,
    /// Current Z safe-travel state.
    pub z_state: ZState,
    /// Currently configured tip count.
    pub pipette_count: u8,
    /// Whether homing has completed since the last fault/restart.
    pub initialized: bool,
}

impl PositionTracker {
    /// Construct the tracker as it exists at process start:
    /// `initialized=false`, all axes at 0, Z up, single tip.
    pub fn new() -> Self {
        Self {
            positions: [0; sampler_common::consts::NUM_AXES],
            current_well: None,
            z_state: ZState::Up,
            pipette_count: 1,
            initialized: false,
        }
    }

    /// Current step position for `axis`.
    pub fn position(&self, axis: Axis) -> StepCount {
        self.positions[axis.index()]
    }

    /// Whether homing has completed since the last fault/restart.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Current Z safe-travel state.
    pub fn z_state(&self) -> ZState {
        self.z_state
    }

    /// Last well the tip was commanded to.
    pub fn current_well(&self) -> Option<WellId> {
        self.current_well
    }

    /// Currently configured tip count.
    pub fn pipette_count(&self) -> u8 {
        self.pipette_count
    }

    /// Apply a confirmed MCU reply to `axis`'s position (spec.md §4.4).
    ///
    /// On `limit_triggered` during a non-homing move, the position is
    /// still advanced by `executed_steps` (it reflects what physically
    /// happened) but the call returns `Err` so the executor can fault the
    /// job; during a homing move the axis snaps to 0 and `Ok` is returned.
    pub fn apply_axis_delta(
        &mut self,
        axis: Axis,
        executed_steps: u32,
        direction: Direction,
        limit_triggered: bool,
        is_homing: bool,
    ) -> Result<(), MotionFault> {
        if limit_triggered && is_homing {
            self.positions[axis.index()] = 0;
            return Ok(());
        }

        let delta = match direction {
            Direction::Cw => executed_steps as StepCount,
            Direction::Ccw => -(executed_steps as StepCount),
        };
        self.positions[axis.index()] += delta;

        if limit_triggered {
            return Err(MotionFault::UnexpectedLimit { axis });
        }
        Ok(())
    }

    /// Record a completed X+Y relocation (spec.md §4.4: "called only
    /// after a completed X+Y relocation").
    pub fn set_well(&mut self, well: WellId) {
        self.current_well = Some(well);
    }

    /// Record a confirmed Z move (spec.md §4.4: "updated only after Z
    /// move confirmed").
    pub fn set_z(&mut self, state: ZState) {
        self.z_state = state;
    }

    /// Update the configured tip count (spec.md §4.6: refused while a job
    /// is running, enforced by the caller).
    pub fn set_pipette_count(&mut self, count: u8) {
        self.pipette_count = count;
    }

    /// Zero all axes and mark the tracker initialized, called after a
    /// successful `home_all` (spec.md §4.6).
    pub fn mark_homed(&mut self) {
        self.positions = [0; sampler_common::consts::NUM_AXES];
        self.initialized = true;
        self.current_well = Some(WellId::new(0, 1).expect("A1 is always valid"));
        self.z_state = ZState::Up;
    }

    /// Force back to the uninitialized state after a fatal motion error
    /// (spec.md §3: "a fatal motion error reverts it to
    /// `initialized=false` and forces a re-home").
    pub fn mark_uninitialized(&mut self) {
        self.initialized = false;
    }

    /// Take an immutable, cloned snapshot for concurrent readers.
    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            positions: self.positions,
            current_well: self.current_well,
            z_state: self.z_state,
            pipette_count: self.pipette_count,
            initialized: self.initialized,
        }
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized_at_origin() {
        let tracker = PositionTracker::new();
        assert!(!tracker.initialized());
        assert_eq!(tracker.position(Axis::X), 0);
        assert_eq!(tracker.z_state(), ZState::Up);
    }

    #[test]
    fn apply_axis_delta_accumulates_by_direction() {
        let mut tracker = PositionTracker::new();
        tracker
            .apply_axis_delta(Axis::X, 400, Direction::Cw, false, false)
            .unwrap();
        assert_eq!(tracker.position(Axis::X), 400);
        tracker
            .apply_axis_delta(Axis::X, 100, Direction::Ccw, false, false)
            .unwrap();
        assert_eq!(tracker.position(Axis::X), 300);
    }

    #[test]
    fn unexpected_limit_advances_position_and_errors() {
        let mut tracker = PositionTracker::new();
        let err = tracker
            .apply_axis_delta(Axis::X, 150, Direction::Cw, true, false)
            .unwrap_err();
        assert!(matches!(err, MotionFault::UnexpectedLimit { axis: Axis::X }));
        assert_eq!(tracker.position(Axis::X), 150);
    }

    #[test]
    fn homing_limit_snaps_to_zero_without_error() {
        let mut tracker = PositionTracker::new();
        tracker
            .apply_axis_delta(Axis::Z, 9000, Direction::Ccw, true, true)
            .unwrap();
        assert_eq!(tracker.position(Axis::Z), 0);
    }

    #[test]
    fn mark_homed_zeroes_and_initializes() {
        let mut tracker = PositionTracker::new();
        tracker
            .apply_axis_delta(Axis::X, 400, Direction::Cw, false, false)
            .unwrap();
        tracker.mark_homed();
        assert!(tracker.initialized());
        assert_eq!(tracker.position(Axis::X), 0);
        assert_eq!(tracker.current_well(), WellId::new(0, 1).ok());
    }

    #[test]
    fn mark_uninitialized_forces_rehome() {
        let mut tracker = PositionTracker::new();
        tracker.mark_homed();
        tracker.mark_uninitialized();
        assert!(!tracker.initialized());
    }

    #[test]
    fn snapshot_is_independent_of_later_mutation() {
        let mut tracker = PositionTracker::new();
        tracker.mark_homed();
        let snap = tracker.snapshot();
        tracker
            .apply_axis_delta(Axis::X, 100, Direction::Cw, false, false)
            .unwrap();
        assert_eq!(snap.positions[Axis::X.index()], 0);
        assert_eq!(tracker.position(Axis::X), 100);
    }
}
