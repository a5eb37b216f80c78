//! Motor axis identifiers, step directions, and axis positions
//! (spec.md §3: `AxisPositionSteps`, §4.2: motor driver operations).

use serde::{Deserialize, Serialize};

/// One of the four motor axes driven by the Motor Driver Client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Plate X travel.
    X,
    /// Plate Y travel.
    Y,
    /// Tip Z travel (0 = fully up / safe).
    Z,
    /// Pipette plunger (0 = empty).
    Pipette,
}

impl Axis {
    /// All four axes, in the homing order spec.md §4.6 mandates.
    pub const HOMING_ORDER: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::Pipette];

    /// Stable 1-based motor index used on the wire (`motor_id` in §6).
    #[inline]
    pub const fn motor_id(&self) -> u8 {
        match self {
            Axis::X => 1,
            Axis::Y => 2,
            Axis::Z => 3,
            Axis::Pipette => 4,
        }
    }

    /// Array index (`0..4`) for use with `[T; 4]` position arrays.
    #[inline]
    pub const fn index(&self) -> usize {
        self.motor_id() as usize - 1
    }
}

/// Rotation direction of a step pulse, matching the wire's `0|1` encoding
/// (spec.md §6: "1 = clockwise").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Counter-clockwise (wire value `0`).
    Ccw,
    /// Clockwise (wire value `1`).
    Cw,
}

impl Direction {
    /// Wire-protocol encoding (spec.md §6: "1 = clockwise").
    #[inline]
    pub const fn to_wire(self) -> u8 {
        match self {
            Direction::Ccw => 0,
            Direction::Cw => 1,
        }
    }

    /// Decode the wire's `0|1` direction value.
    #[inline]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::Ccw),
            1 => Some(Direction::Cw),
            _ => None,
        }
    }

    /// The opposite direction.
    #[inline]
    pub const fn reverse(self) -> Self {
        match self {
            Direction::Ccw => Direction::Cw,
            Direction::Cw => Direction::Ccw,
        }
    }
}

/// Signed step count for a single axis (spec.md §3: `AxisPositionSteps`).
pub type StepCount = i64;

/// Z-axis safe-travel state (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZState {
    /// Z is at or above the configured safe height — X/Y travel permitted.
    Up,
    /// Z is below safe height — X/Y travel is forbidden.
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_ids_are_stable_and_distinct() {
        let ids: Vec<u8> = Axis::HOMING_ORDER.iter().map(Axis::motor_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn direction_wire_round_trip() {
        for d in [Direction::Ccw, Direction::Cw] {
            assert_eq!(Direction::from_wire(d.to_wire()), Some(d));
        }
        assert_eq!(Direction::from_wire(2), None);
    }

    #[test]
    fn direction_reverse_is_involution() {
        assert_eq!(Direction::Ccw.reverse().reverse(), Direction::Ccw);
    }
}
