//! Cycle and repetition scheduling (spec.md §4.5, §8 property 7).
//!
//! `QuantityMode` is a plain repeat count, driven by the executor's own
//! loop. `TimeMode` fires once every `interval_s` until `duration_s` has
//! elapsed, using wall-clock alignment: the caller supplies elapsed time
//! at each poll rather than this module reading a clock directly, which
//! keeps it pure and trivially testable.

use sampler_common::program::Repetition;

/// Drives the firing schedule for a step's `repetition` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepetitionSchedule {
    /// Fire the cycles block `remaining` more times, back-to-back.
    Quantity {
        /// Firings left, including the next one.
        remaining: u32,
    },
    /// Fire the cycles block once every `interval_s` seconds until
    /// `total_firings` firings have occurred.
    Time {
        /// Seconds between firings.
        interval_s: f64,
        /// Total number of firings over the window.
        total_firings: u64,
        /// Index of the next firing, `0`-based.
        next_index: u64,
    },
}

impl RepetitionSchedule {
    /// Build a schedule from a [`Repetition`] spec.
    pub fn new(repetition: Repetition, total_firings: u64) -> Self {
        match repetition {
            Repetition::Quantity { count } => RepetitionSchedule::Quantity { remaining: count },
            Repetition::Time { interval_s, .. } => RepetitionSchedule::Time {
                interval_s,
                total_firings,
                next_index: 0,
            },
        }
    }

    /// Whether every firing has already occurred.
    pub fn is_exhausted(&self) -> bool {
        match self {
            RepetitionSchedule::Quantity { remaining } => *remaining == 0,
            RepetitionSchedule::Time {
                total_firings,
                next_index,
                ..
            } => next_index >= total_firings,
        }
    }

    /// For `Quantity` mode: consume one firing immediately. Panics if
    /// already exhausted — callers must check [`Self::is_exhausted`] first.
    pub fn fire_quantity(&mut self) {
        match self {
            RepetitionSchedule::Quantity { remaining } => {
                *remaining = remaining.saturating_sub(1);
            }
            RepetitionSchedule::Time { .. } => {
                panic!("fire_quantity called on a Time-mode schedule")
            }
        }
    }

    /// For `Time` mode: given the seconds elapsed since the step started,
    /// return the firing index due now, if any, and advance past it.
    ///
    /// If more than one firing's deadline has passed since the last poll
    /// (a cycles block ran long), those intermediate firings are skipped
    /// rather than queued (spec.md §8 property 7).
    pub fn poll_time(&mut self, elapsed_s: f64) -> Option<u64> {
        let RepetitionSchedule::Time {
            interval_s,
            total_firings,
            next_index,
        } = self
        else {
            panic!("poll_time called on a Quantity-mode schedule")
        };

        if *next_index >= *total_firings {
            return None;
        }
        let target = *next_index as f64 * *interval_s;
        if elapsed_s + 1e-9 < target {
            return None;
        }
        let fired = *next_index;
        *next_index += 1;
        while *next_index < *total_firings && elapsed_s + 1e-9 >= *next_index as f64 * *interval_s {
            *next_index += 1;
        }
        Some(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_mode_counts_down() {
        let mut sched = RepetitionSchedule::new(Repetition::Quantity { count: 3 }, 0);
        assert!(!sched.is_exhausted());
        sched.fire_quantity();
        sched.fire_quantity();
        assert!(!sched.is_exhausted());
        sched.fire_quantity();
        assert!(sched.is_exhausted());
    }

    #[test]
    fn time_mode_fires_at_each_interval() {
        let rep = Repetition::Time {
            interval_s: 2.0,
            duration_s: 7.0,
        };
        let mut sched = RepetitionSchedule::new(rep, 4);
        assert_eq!(sched.poll_time(0.0), Some(0));
        assert_eq!(sched.poll_time(0.5), None);
        assert_eq!(sched.poll_time(2.0), Some(1));
        assert_eq!(sched.poll_time(4.0), Some(2));
        assert_eq!(sched.poll_time(6.0), Some(3));
        assert!(sched.is_exhausted());
        assert_eq!(sched.poll_time(8.0), None);
    }

    #[test]
    fn time_mode_skips_bunched_firings_instead_of_queueing() {
        let rep = Repetition::Time {
            interval_s: 1.0,
            duration_s: 5.0,
        };
        let mut sched = RepetitionSchedule::new(rep, 5);
        assert_eq!(sched.poll_time(0.0), Some(0));
        // A long cycles block causes elapsed to jump past two deadlines;
        // only one (the latest) fires, the skipped ones never queue.
        assert_eq!(sched.poll_time(3.2), Some(3));
        assert_eq!(sched.poll_time(4.0), Some(4));
        assert!(sched.is_exhausted());
    }

    #[test]
    #[should_panic]
    fn fire_quantity_panics_on_time_schedule() {
        let mut sched = RepetitionSchedule::new(
            Repetition::Time {
                interval_s: 1.0,
                duration_s: 1.0,
            },
            1,
        );
        sched.fire_quantity();
    }
}
