//! Pipetting program domain types (spec.md §3: `ProgramStep`).

use serde::{Deserialize, Serialize};

use crate::volume::MilliLiters;
use crate::well::WellId;

/// A pipette tip count — spec.md §3 restricts this to `{1, 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipetteCount {
    /// Single tip, commanded well is the pickup well itself.
    One,
    /// Three-tip gang, commanded well is the center of `{col-1, col, col+1}`.
    Three,
}

impl PipetteCount {
    /// Numeric count, for display/config purposes.
    #[inline]
    pub const fn count(&self) -> u8 {
        match self {
            PipetteCount::One => 1,
            PipetteCount::Three => 3,
        }
    }

    /// Construct from a raw count, rejecting anything but `1` or `3`.
    pub const fn from_count(n: u8) -> Option<Self> {
        match n {
            1 => Some(PipetteCount::One),
            3 => Some(PipetteCount::Three),
            _ => None,
        }
    }
}

/// How a step's cycles block repeats (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Repetition {
    /// Repeat the cycles block `count` times back-to-back.
    Quantity {
        /// Number of consecutive repeats, `>= 1`.
        count: u32,
    },
    /// Fire the cycles block once every `interval_s` until `duration_s`
    /// has elapsed, using wall-clock alignment.
    Time {
        /// Seconds between firings, `> 0`.
        interval_s: f64,
        /// Total window, `>= interval_s`.
        duration_s: f64,
    },
}

/// Error returned when a `ProgramStep` fails field validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramStepError {
    /// `cycles` was zero.
    #[error("cycles must be >= 1")]
    ZeroCycles,
    /// `Repetition::Quantity{count: 0}`.
    #[error("repetition count must be >= 1")]
    ZeroRepetitionCount,
    /// `Repetition::Time` had a non-positive interval.
    #[error("repetition interval_s must be > 0")]
    NonPositiveInterval,
    /// `Repetition::Time` had `duration_s < interval_s`.
    #[error("repetition duration_s ({duration_s}) must be >= interval_s ({interval_s})")]
    DurationShorterThanInterval {
        /// Configured interval.
        interval_s: f64,
        /// Configured duration.
        duration_s: f64,
    },
}

/// One step of a pipetting program (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramStep {
    /// Well to aspirate from.
    pub pickup_well: WellId,
    /// Well to dispense into, if any.
    pub dropoff_well: Option<WellId>,
    /// Well to rinse the tip in, if any.
    pub rinse_well: Option<WellId>,
    /// Volume aspirated/dispensed per cycle.
    pub sample_volume_ml: MilliLiters,
    /// Cooperative sleep after the cycles block, in seconds.
    pub wait_seconds: u32,
    /// Number of pickup→dropoff→rinse traversals per repetition firing.
    pub cycles: u32,
    /// Tip gang size.
    pub pipette_count: PipetteCount,
    /// How the cycles block repeats.
    pub repetition: Repetition,
}

impl ProgramStep {
    /// Validate the fields that are not already enforced by their own
    /// newtypes (`MilliLiters`, `WellId`).
    pub fn validate(&self) -> Result<(), ProgramStepError> {
        if self.cycles == 0 {
            return Err(ProgramStepError::ZeroCycles);
        }
        match self.repetition {
            Repetition::Quantity { count: 0 } => {
                return Err(ProgramStepError::ZeroRepetitionCount)
            }
            Repetition::Time {
                interval_s,
                duration_s,
            } => {
                if interval_s <= 0.0 {
                    return Err(ProgramStepError::NonPositiveInterval);
                }
                if duration_s < interval_s {
                    return Err(ProgramStepError::DurationShorterThanInterval {
                        interval_s,
                        duration_s,
                    });
                }
            }
            Repetition::Quantity { .. } => {}
        }
        Ok(())
    }

    /// Total number of cycles-block firings (spec.md §4.5/§8 property 7).
    ///
    /// For `Quantity{count}` this is `count`; for `Time{interval, duration}`
    /// it is the count of non-negative integers `k` with `k * interval <
    /// duration` — i.e. every wall-clock instant strictly before the
    /// window closes gets a firing, including one at `t=0`.
    pub fn total_firings(&self) -> u64 {
        match self.repetition {
            Repetition::Quantity { count } => count as u64,
            Repetition::Time {
                interval_s,
                duration_s,
            } => {
                let ratio = duration_s / interval_s;
                let floor = ratio.floor();
                if ratio - floor < 1e-9 {
                    floor as u64
                } else {
                    floor as u64 + 1
                }
            }
        }
    }
}

/// An ordered sequence of pipetting steps.
pub type Program = Vec<ProgramStep>;
