//! Validated decimal liquid volumes (spec.md §3: `sample_volume_ml`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned when a volume fails the `(0, 10]` mL validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    /// Volume was zero or negative.
    #[error("volume must be greater than 0 mL")]
    NotPositive,
    /// Volume exceeded the 10 mL ceiling.
    #[error("volume must not exceed 10 mL")]
    TooLarge,
}

/// A liquid volume in milliliters, validated to `(0, 10]` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct MilliLiters(Decimal);

impl MilliLiters {
    /// Inclusive upper bound accepted by `ProgramStep::sample_volume_ml`.
    pub const MAX: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

    /// Construct a validated volume.
    ///
    /// # Errors
    /// Returns [`VolumeError`] if `ml` is not in `(0, 10]`.
    pub fn new(ml: Decimal) -> Result<Self, VolumeError> {
        if ml <= Decimal::ZERO {
            return Err(VolumeError::NotPositive);
        }
        if ml > Self::MAX {
            return Err(VolumeError::TooLarge);
        }
        Ok(Self(ml))
    }

    /// The underlying decimal value.
    #[inline]
    pub const fn get(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for MilliLiters {
    type Error = VolumeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MilliLiters> for Decimal {
    fn from(value: MilliLiters) -> Self {
        value.0
    }
}

impl fmt::Display for MilliLiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mL", self.0)
    }
}
