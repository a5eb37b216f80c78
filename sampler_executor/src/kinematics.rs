//! Pure coordinate and unit conversions (spec.md §4.3).
//!
//! Every conversion between wells/mL/mm and axis steps passes through this
//! module (spec.md §9: "the rest of the system deals in axis steps and mL,
//! never raw mm in control paths"). All rounding happens here, at the
//! conversion boundary, never accumulated step-by-step.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use sampler_common::axis::{Axis, Direction, StepCount};
use sampler_common::config::Configuration;
use sampler_common::error::MotionFault;
use sampler_common::volume::MilliLiters;
use sampler_common::well::{WellId, WellIdError};

/// Aspirate direction by convention (spec.md §4.3).
pub const ASPIRATE_DIRECTION: Direction = Direction::Ccw;
/// Dispense direction by convention (spec.md §4.3).
pub const DISPENSE_DIRECTION: Direction = Direction::Cw;
/// Z travels away from the safe-up position (`z_steps` increasing).
pub const Z_DOWN_DIRECTION: Direction = Direction::Cw;
/// Z travels back toward the safe-up position (`z_steps` decreasing).
pub const Z_UP_DIRECTION: Direction = Direction::Ccw;

/// An (x, y) target in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XySteps {
    /// X-axis target, in steps from origin (well A1).
    pub x: StepCount,
    /// Y-axis target, in steps from origin (well A1).
    pub y: StepCount,
}

fn round_to_steps(value: f64) -> StepCount {
    value.round() as StepCount
}

/// Map a well to its (x, y) target in steps. Row A / column 1 is the
/// origin (spec.md §4.3).
pub fn well_to_xy(well: WellId, config: &Configuration) -> XySteps {
    let x = round_to_steps((well.column() as f64 - 1.0) * config.well_spacing_mm * config.steps_per_mm_x);
    let y = round_to_steps(well.row() as f64 * config.well_spacing_mm * config.steps_per_mm_y);
    XySteps { x, y }
}

/// Invert [`well_to_xy`]: find the nearest well to an (x, y) step target
/// (spec.md §8 property 6: round-trip coordinates).
pub fn xy_to_well(xy: XySteps, config: &Configuration) -> Result<WellId, WellIdError> {
    let column = (xy.x as f64 / (config.well_spacing_mm * config.steps_per_mm_x)).round() as i64 + 1;
    let row = (xy.y as f64 / (config.well_spacing_mm * config.steps_per_mm_y)).round() as i64;
    WellId::new(row.clamp(0, u8::MAX as i64) as u8, column.clamp(0, u8::MAX as i64) as u8)
}

/// Convert a depth below the safe-travel height into Z steps. `0.0` maps
/// to `z_steps = 0`, i.e. the safe height (spec.md §4.3).
pub fn z_for(depth_mm: f64, config: &Configuration) -> StepCount {
    round_to_steps(depth_mm * config.steps_per_mm_z)
}

/// Convert a validated volume into pipette-axis steps (spec.md §4.3).
pub fn volume_to_pipette_steps(volume: MilliLiters, config: &Configuration) -> StepCount {
    decimal_to_pipette_steps(volume.get(), config)
}

/// As [`volume_to_pipette_steps`], but for a raw `Decimal` amount that may
/// legitimately be `0` (used for rinse bookkeeping, where the amount being
/// moved is the tip's current loaded volume rather than a fresh
/// `ProgramStep::sample_volume_ml`).
pub fn decimal_to_pipette_steps(ml: Decimal, config: &Configuration) -> StepCount {
    let ml = ml.to_f64().unwrap_or(0.0);
    round_to_steps(ml * config.pipette_steps_per_ml)
}

/// Invert [`volume_to_pipette_steps`], used when reporting remaining
/// loaded volume.
pub fn steps_to_volume(steps: StepCount, config: &Configuration) -> Decimal {
    let ml = steps as f64 / config.pipette_steps_per_ml;
    Decimal::try_from(ml).unwrap_or(Decimal::ZERO)
}

/// Reject an (x, y) target that exceeds the configured plate travel
/// envelope (spec.md §4.3: `clamp_to_envelope`).
pub fn clamp_to_envelope(xy: XySteps, config: &Configuration) -> Result<(), MotionFault> {
    let max_x = round_to_steps(
        (sampler_common::consts::PLATE_COLS as f64 - 1.0) * config.well_spacing_mm * config.steps_per_mm_x,
    );
    let max_y = round_to_steps(
        (sampler_common::consts::PLATE_ROWS as f64 - 1.0) * config.well_spacing_mm * config.steps_per_mm_y,
    );
    if xy.x < 0 || xy.x > max_x {
        return Err(MotionFault::OutOfEnvelope {
            axis: Axis::X,
            requested: xy.x,
            limit: max_x,
        });
    }
    if xy.y < 0 || xy.y > max_y {
        return Err(MotionFault::OutOfEnvelope {
            axis: Axis::Y,
            requested: xy.y,
            limit: max_y,
        });
    }
    Ok(())
}

/// Compute the center well-column for a 3-tip gang centered on `well`
/// (spec.md §4.5: multi-pipette geometry). Fails if `column - 1 < 1` or
/// `column + 1 > 12`.
pub fn three_tip_center(well: WellId) -> Result<WellId, String> {
    let column = well.column() as i16;
    if column - 1 < 1 {
        return Err(format!(
            "column {} has no left neighbor for a 3-tip gang",
            column
        ));
    }
    if column + 1 > sampler_common::consts::PLATE_COLS as i16 {
        return Err(format!(
            "column {} has no right neighbor for a 3-tip gang",
            column
        ));
    }
    Ok(well)
}
