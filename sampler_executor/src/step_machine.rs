//! Per-step primitive state machine (spec.md §4.5).
//!
//! A pure transition table: given the current phase and the step being
//! executed, compute the next phase. Optional phases are skipped when
//! their well is absent. All side effects (issuing motion, checking
//! cancellation) live in [`crate::executor`]; this module only decides
//! *what comes next*.

use sampler_common::program::ProgramStep;

/// One phase of the per-step primitive sequence (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Entry phase, before any primitive has run.
    AtStart,
    /// Ensure Z is at the safe-up position before any X/Y travel.
    EnsureZUp,
    /// Move X/Y to the pickup well.
    TravelToPickup,
    /// Lower Z to the pickup depth.
    ZDownPickup,
    /// Draw the sample volume into the tip.
    Aspirate,
    /// Raise Z back to safe height.
    ZUpAfterPickup,
    /// Move X/Y to the dropoff well, if any.
    TravelToDropoff,
    /// Lower Z to the dropoff depth.
    ZDownDropoff,
    /// Expel the sample volume from the tip.
    Dispense,
    /// Raise Z back to safe height.
    ZUpAfterDropoff,
    /// Move X/Y to the rinse well, if any.
    TravelToRinse,
    /// One iteration of the rinse cycle; `remaining` counts iterations
    /// left after this one, including this one.
    RinseCycle {
        /// Rinse iterations left to perform, counting this one.
        remaining: u32,
    },
    /// Final dispense guaranteeing `loaded_volume = 0` after rinsing.
    RinseFinalDispense,
    /// Raise Z back to safe height after rinsing.
    ZUpAfterRinse,
    /// Cooperative sleep for `wait_seconds`.
    Wait,
    /// Step complete.
    Done,
}

/// Compute the phase that follows `current` for `step`. `rinse_cycles` is
/// the Configuration Registry's `RINSE_CYCLES` value, pinned for the job
/// at `start_program` time (spec.md §4.7, §8 S6). Returns `None` only
/// when called on [`StepPhase::Done`] (there is nothing after it).
pub fn next(current: StepPhase, step: &ProgramStep, rinse_cycles: u32) -> Option<StepPhase> {
    use StepPhase::*;
    Some(match current {
        AtStart => EnsureZUp,
        EnsureZUp => TravelToPickup,
        TravelToPickup => ZDownPickup,
        ZDownPickup => Aspirate,
        Aspirate => ZUpAfterPickup,
        ZUpAfterPickup => {
            if step.dropoff_well.is_some() {
                TravelToDropoff
            } else if step.rinse_well.is_some() {
                TravelToRinse
            } else {
                Wait
            }
        }
        TravelToDropoff => ZDownDropoff,
        ZDownDropoff => Dispense,
        Dispense => ZUpAfterDropoff,
        ZUpAfterDropoff => {
            if step.rinse_well.is_some() {
                TravelToRinse
            } else {
                Wait
            }
        }
        TravelToRinse => {
            if rinse_cycles == 0 {
                ZUpAfterRinse
            } else {
                RinseCycle {
                    remaining: rinse_cycles,
                }
            }
        }
        RinseCycle { remaining } => {
            if remaining <= 1 {
                RinseFinalDispense
            } else {
                RinseCycle {
                    remaining: remaining - 1,
                }
            }
        }
        RinseFinalDispense => ZUpAfterRinse,
        ZUpAfterRinse => Wait,
        Wait => Done,
        Done => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sampler_common::program::{PipetteCount, Repetition};
    use sampler_common::volume::MilliLiters;
    use sampler_common::well::WellId;

    fn step(dropoff: bool, rinse: bool) -> ProgramStep {
        ProgramStep {
            pickup_well: WellId::new(0, 1).unwrap(),
            dropoff_well: dropoff.then(|| WellId::new(0, 2).unwrap()),
            rinse_well: rinse.then(|| WellId::new(0, 3).unwrap()),
            sample_volume_ml: MilliLiters::new(Decimal::new(5, 1)).unwrap(),
            wait_seconds: 1,
            cycles: 1,
            pipette_count: PipetteCount::One,
            repetition: Repetition::Quantity { count: 1 },
        }
    }

    fn run_sequence(s: &ProgramStep, rinse_cycles: u32) -> Vec<StepPhase> {
        let mut phase = StepPhase::AtStart;
        let mut seen = vec![phase];
        while let Some(p) = next(phase, s, rinse_cycles) {
            seen.push(p);
            phase = p;
            if phase == StepPhase::Done {
                break;
            }
        }
        seen
    }

    #[test]
    fn full_sequence_with_dropoff_and_rinse() {
        let s = step(true, true);
        assert_eq!(
            run_sequence(&s, 2),
            vec![
                StepPhase::AtStart,
                StepPhase::EnsureZUp,
                StepPhase::TravelToPickup,
                StepPhase::ZDownPickup,
                StepPhase::Aspirate,
                StepPhase::ZUpAfterPickup,
                StepPhase::TravelToDropoff,
                StepPhase::ZDownDropoff,
                StepPhase::Dispense,
                StepPhase::ZUpAfterDropoff,
                StepPhase::TravelToRinse,
                StepPhase::RinseCycle { remaining: 2 },
                StepPhase::RinseCycle { remaining: 1 },
                StepPhase::RinseFinalDispense,
                StepPhase::ZUpAfterRinse,
                StepPhase::Wait,
                StepPhase::Done,
            ]
        );
    }

    #[test]
    fn zero_rinse_cycles_skips_rinse_cycle_phase() {
        let s = step(false, true);
        assert_eq!(
            run_sequence(&s, 0),
            vec![
                StepPhase::AtStart,
                StepPhase::EnsureZUp,
                StepPhase::TravelToPickup,
                StepPhase::ZDownPickup,
                StepPhase::Aspirate,
                StepPhase::ZUpAfterPickup,
                StepPhase::TravelToRinse,
                StepPhase::ZUpAfterRinse,
                StepPhase::Wait,
                StepPhase::Done,
            ]
        );
    }

    #[test]
    fn skips_dropoff_and_rinse_when_absent() {
        let s = step(false, false);
        assert_eq!(
            run_sequence(&s, 2),
            vec![
                StepPhase::AtStart,
                StepPhase::EnsureZUp,
                StepPhase::TravelToPickup,
                StepPhase::ZDownPickup,
                StepPhase::Aspirate,
                StepPhase::ZUpAfterPickup,
                StepPhase::Wait,
                StepPhase::Done,
            ]
        );
    }

    #[test]
    fn done_has_no_successor() {
        let s = step(true, true);
        assert_eq!(next(StepPhase::Done, &s, 2), None);
    }
}
