//! Pipetting Executor (spec.md §4.5): drives one `ProgramStep` at a time
//! through the per-step primitive sequence, enforcing the loaded-volume,
//! Z-safe-travel, and multi-pipette geometry invariants.
//!
//! A typed phase (here, [`crate::step_machine::StepPhase`]) drives what
//! primitive runs next, and every primitive checks cancellation before it
//! issues anything to the Motor Driver Client.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use sampler_common::axis::{Axis, Direction, ZState};
use sampler_common::cancel::CancellationToken;
use sampler_common::config::Configuration;
use sampler_common::error::{ExecutorError, LogicFault, MotionFault, TransportError, ValidationError};
use sampler_common::program::{PipetteCount, Program, ProgramStep, Repetition};
use sampler_common::state::ExecutionState;
use sampler_common::volume::MilliLiters;
use sampler_common::well::WellId;

use sampler_hal::driver::MotorDriverClient;
use sampler_hal::transport::Transport;
use sampler_hal::wire::Movement;

use crate::kinematics;
use crate::position::PositionTracker;
use crate::repetition::RepetitionSchedule;
use crate::step_machine::{self, StepPhase};

/// Receives progress notifications as the executor runs a program, so the
/// Execution Controller can keep its StatusSnapshot and LogRing current
/// without the executor depending on either directly.
pub trait ExecutorObserver {
    /// `current_operation`/`operation_well` changed.
    fn on_state(&mut self, state: ExecutionState, well: Option<WellId>);
    /// A human-readable progress line, destined for the LogRing.
    fn on_log(&mut self, line: String);
}

/// An observer that discards every notification.
pub struct NullObserver;

impl ExecutorObserver for NullObserver {
    fn on_state(&mut self, _state: ExecutionState, _well: Option<WellId>) {}
    fn on_log(&mut self, _line: String) {}
}

fn motor_error_to_motion(err: sampler_hal::driver::MotorError) -> MotionFault {
    use sampler_hal::driver::MotorError as ME;
    match err {
        ME::Io(io) => MotionFault::Transport(TransportError::Io(io)),
        ME::Timeout => MotionFault::Transport(TransportError::Timeout),
        ME::McuError(message) => MotionFault::McuError(message),
        other => MotionFault::McuError(other.to_string()),
    }
}

/// Drives the Motor Driver Client, Position Tracker, and Kinematics
/// together to execute whole programs (spec.md §4.5).
pub struct PipettingExecutor<T: Transport> {
    driver: MotorDriverClient<T>,
    position: PositionTracker,
    config: Arc<Configuration>,
    /// Amount currently loaded in the tip. Tracked as a raw `Decimal`
    /// rather than `MilliLiters` because it is legitimately `0` between
    /// steps, which `MilliLiters`'s `(0, 10]` validation rejects.
    loaded_ml: Decimal,
    capacity_ml: Decimal,
}

impl<T: Transport> PipettingExecutor<T> {
    /// Build an executor over an already-connected driver, pinning
    /// `config` for the duration of whatever job runs on it (spec.md
    /// §4.7: "readers already executing a job keep their original
    /// snapshot").
    pub fn new(driver: MotorDriverClient<T>, position: PositionTracker, config: Arc<Configuration>) -> Self {
        let capacity_ml = Decimal::try_from(config.pipette_capacity_ml).unwrap_or(Decimal::MAX);
        Self {
            driver,
            position,
            config,
            loaded_ml: Decimal::ZERO,
            capacity_ml,
        }
    }

    /// Read-only access to the current position, for the controller to
    /// publish in its StatusSnapshot between primitives.
    pub fn position(&self) -> &PositionTracker {
        &self.position
    }

    /// Whether the underlying transport is currently broken.
    pub fn is_broken(&self) -> bool {
        self.driver.is_broken()
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<(), ExecutorError> {
        if cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        Ok(())
    }

    /// Run one MCU request with spec.md §4.5's "transient `Timeout` may
    /// be retried at most once, otherwise fatal" policy.
    fn exchange<R>(
        &mut self,
        mut call: impl FnMut(&mut MotorDriverClient<T>) -> Result<R, sampler_hal::driver::MotorError>,
    ) -> Result<R, ExecutorError> {
        match call(&mut self.driver) {
            Ok(r) => Ok(r),
            Err(sampler_hal::driver::MotorError::Timeout) => {
                call(&mut self.driver).map_err(|e| ExecutorError::Motion(motor_error_to_motion(e)))
            }
            Err(e) => Err(ExecutorError::Motion(motor_error_to_motion(e))),
        }
    }

    fn stop_all_best_effort(&mut self) {
        let _ = self.driver.stop_all();
    }

    fn speed_to_delay_us(seconds_per_step: f64) -> u32 {
        (seconds_per_step * 1_000_000.0)
            .round()
            .max(sampler_common::consts::MIN_DELAY_US as f64) as u32
    }

    /// Home every axis in spec.md §4.6's mandated order, using the
    /// configured per-axis `HOME_DIRECTION_*` field. On success, zeroes
    /// the Position Tracker and marks it initialized.
    pub fn home_all(&mut self) -> Result<(), ExecutorError> {
        for axis in Axis::HOMING_ORDER {
            let direction = self.config.home_direction(axis);
            let outcome = self.exchange(|d| {
                d.home(
                    axis.motor_id(),
                    direction,
                    sampler_common::consts::HOME_STEP_DELAY_US,
                    sampler_common::consts::HOME_MAX_STEPS,
                )
            })?;
            if !outcome.homed {
                self.stop_all_best_effort();
                return Err(ExecutorError::Motion(MotionFault::HomingFailed { axis }));
            }
            self.position
                .apply_axis_delta(axis, outcome.steps_to_home, direction, true, true)
                .expect("a homing limit hit never returns Err");
        }
        self.position.mark_homed();
        Ok(())
    }

    fn ensure_z_up(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        Self::check_cancelled(cancel)?;
        if self.position.z_state() == ZState::Up {
            return Ok(());
        }
        let steps = self.position.position(Axis::Z).unsigned_abs() as u32;
        if steps == 0 {
            self.position.set_z(ZState::Up);
            return Ok(());
        }
        let delay_us = Self::speed_to_delay_us(self.config.travel_speed_s_per_step);
        let outcome = self.exchange(|d| {
            d.step(Axis::Z.motor_id(), steps, kinematics::Z_UP_DIRECTION, delay_us, true)
        })?;
        self.position
            .apply_axis_delta(
                Axis::Z,
                outcome.executed_steps,
                kinematics::Z_UP_DIRECTION,
                outcome.limit_triggered,
                false,
            )
            .map_err(ExecutorError::Motion)?;
        self.position.set_z(ZState::Up);
        Ok(())
    }

    /// Lower Z to `depth_mm` below the safe-up position, raising first if
    /// not already up (spec.md §4.5).
    fn z_down(&mut self, depth_mm: f64, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.ensure_z_up(cancel)?;
        Self::check_cancelled(cancel)?;
        let target = kinematics::z_for(depth_mm, &self.config);
        if target == 0 {
            return Ok(());
        }
        let delay_us = Self::speed_to_delay_us(self.config.travel_speed_s_per_step);
        let outcome = self.exchange(|d| {
            d.step(Axis::Z.motor_id(), target as u32, kinematics::Z_DOWN_DIRECTION, delay_us, true)
        })?;
        self.position
            .apply_axis_delta(
                Axis::Z,
                outcome.executed_steps,
                kinematics::Z_DOWN_DIRECTION,
                outcome.limit_triggered,
                false,
            )
            .map_err(ExecutorError::Motion)?;
        self.position.set_z(ZState::Down);
        Ok(())
    }

    fn travel_direction(delta: i64) -> Direction {
        if delta >= 0 {
            Direction::Cw
        } else {
            Direction::Ccw
        }
    }

    /// Move X/Y to `well`, refusing to travel while Z is not up (spec.md
    /// §4.5: "Refuse to travel in X/Y while Z is not UP").
    fn travel_to(&mut self, well: WellId, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.ensure_z_up(cancel)?;
        Self::check_cancelled(cancel)?;

        let target = kinematics::well_to_xy(well, &self.config);
        kinematics::clamp_to_envelope(target, &self.config).map_err(ExecutorError::Motion)?;

        let dx = target.x - self.position.position(Axis::X);
        let dy = target.y - self.position.position(Axis::Y);
        if dx == 0 && dy == 0 {
            self.position.set_well(well);
            return Ok(());
        }

        let delay_us = Self::speed_to_delay_us(self.config.travel_speed_s_per_step);
        let mut movements = Vec::with_capacity(2);
        if dx != 0 {
            movements.push(Movement {
                motor_id: Axis::X.motor_id(),
                steps: dx.unsigned_abs() as u32,
                direction: Self::travel_direction(dx).to_wire(),
                delay_us,
            });
        }
        if dy != 0 {
            movements.push(Movement {
                motor_id: Axis::Y.motor_id(),
                steps: dy.unsigned_abs() as u32,
                direction: Self::travel_direction(dy).to_wire(),
                delay_us,
            });
        }

        let results = self.exchange(|d| d.move_batch(movements.clone(), true))?;
        for result in results {
            let (axis, delta) = if result.motor_id == Axis::X.motor_id() {
                (Axis::X, dx)
            } else {
                (Axis::Y, dy)
            };
            self.position
                .apply_axis_delta(axis, result.steps_executed, Self::travel_direction(delta), result.limit_hit, false)
                .map_err(ExecutorError::Motion)?;
        }
        self.position.set_well(well);
        Ok(())
    }

    fn pipette_step_decimal(&mut self, ml: Decimal, direction: Direction, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        Self::check_cancelled(cancel)?;
        let steps = kinematics::decimal_to_pipette_steps(ml, &self.config);
        if steps <= 0 {
            return Ok(());
        }
        let delay_us = Self::speed_to_delay_us(self.config.pipette_speed_s_per_step);
        let outcome = self.exchange(|d| d.step(Axis::Pipette.motor_id(), steps as u32, direction, delay_us, true))?;
        self.position
            .apply_axis_delta(Axis::Pipette, outcome.executed_steps, direction, outcome.limit_triggered, false)
            .map_err(ExecutorError::Motion)?;
        Ok(())
    }

    /// Draw `volume` into the tip (spec.md §4.5), enforcing
    /// `loaded + volume <= capacity`.
    fn aspirate(&mut self, volume: MilliLiters, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        Self::check_cancelled(cancel)?;
        let projected = self.loaded_ml + volume.get();
        if projected > self.capacity_ml {
            return Err(ExecutorError::Logic(LogicFault::Overflow {
                attempted: volume,
                loaded: self.loaded_ml,
                capacity: self.capacity_ml,
            }));
        }
        self.pipette_step_decimal(volume.get(), kinematics::ASPIRATE_DIRECTION, cancel)?;
        self.loaded_ml = projected;
        Ok(())
    }

    /// Expel `volume` from the tip (spec.md §4.5), enforcing
    /// `volume <= loaded`.
    fn dispense(&mut self, volume: MilliLiters, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        Self::check_cancelled(cancel)?;
        if volume.get() > self.loaded_ml {
            return Err(ExecutorError::Logic(LogicFault::Underflow {
                attempted: volume,
                loaded: self.loaded_ml,
            }));
        }
        self.pipette_step_decimal(volume.get(), kinematics::DISPENSE_DIRECTION, cancel)?;
        self.loaded_ml -= volume.get();
        Ok(())
    }

    /// One rinse iteration: `ZDown(dropoff_depth) → Dispense(loaded) →
    /// Aspirate(loaded) → ZUp` (spec.md §4.5).
    fn rinse_cycle(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.z_down(self.config.dropoff_depth_mm, cancel)?;
        let loaded = self.loaded_ml;
        self.pipette_step_decimal(loaded, kinematics::DISPENSE_DIRECTION, cancel)?;
        self.loaded_ml = Decimal::ZERO;
        self.pipette_step_decimal(loaded, kinematics::ASPIRATE_DIRECTION, cancel)?;
        self.loaded_ml = loaded;
        self.ensure_z_up(cancel)?;
        Ok(())
    }

    /// The final dispense guaranteeing `loaded = 0` after the rinse loop
    /// exits (spec.md §4.5).
    fn rinse_final_dispense(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.z_down(self.config.dropoff_depth_mm, cancel)?;
        let loaded = self.loaded_ml;
        self.pipette_step_decimal(loaded, kinematics::DISPENSE_DIRECTION, cancel)?;
        self.loaded_ml = Decimal::ZERO;
        Ok(())
    }

    fn wait(&mut self, wait_seconds: u32, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        let total = Duration::from_secs(wait_seconds as u64);
        let checkpoint = Duration::from_millis(sampler_common::consts::WAIT_CHECKPOINT_MS);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            Self::check_cancelled(cancel)?;
            let sleep_for = (total - elapsed).min(checkpoint);
            thread::sleep(sleep_for);
            elapsed += sleep_for;
        }
        Self::check_cancelled(cancel)
    }

    fn validate_geometry(step: &ProgramStep) -> Result<(), ExecutorError> {
        if step.pipette_count != PipetteCount::Three {
            return Ok(());
        }
        for well in [Some(step.pickup_well), step.dropoff_well, step.rinse_well]
            .into_iter()
            .flatten()
        {
            kinematics::three_tip_center(well)
                .map_err(|reason| ExecutorError::Logic(LogicFault::InvalidGeometry { reason }))?;
        }
        Ok(())
    }

    /// Run one pickup→dropoff→rinse→wait traversal of `step` (spec.md
    /// §4.5's per-step state machine), driven by [`step_machine::next`].
    fn run_traversal(
        &mut self,
        step: &ProgramStep,
        rinse_cycles: u32,
        cancel: &CancellationToken,
        observer: &mut dyn ExecutorObserver,
    ) -> Result<(), ExecutorError> {
        Self::validate_geometry(step)?;
        let mut phase = StepPhase::AtStart;
        loop {
            Self::check_cancelled(cancel)?;
            match phase {
                StepPhase::AtStart => {}
                StepPhase::EnsureZUp => self.ensure_z_up(cancel)?,
                StepPhase::TravelToPickup => {
                    observer.on_state(ExecutionState::Moving, Some(step.pickup_well));
                    self.travel_to(step.pickup_well, cancel)?;
                }
                StepPhase::ZDownPickup => self.z_down(self.config.pickup_depth_mm, cancel)?,
                StepPhase::Aspirate => {
                    observer.on_state(ExecutionState::Aspirating, Some(step.pickup_well));
                    self.aspirate(step.sample_volume_ml, cancel)?;
                }
                StepPhase::ZUpAfterPickup => self.ensure_z_up(cancel)?,
                StepPhase::TravelToDropoff => {
                    let well = step.dropoff_well.expect("phase only reached when dropoff_well is Some");
                    observer.on_state(ExecutionState::Moving, Some(well));
                    self.travel_to(well, cancel)?;
                }
                StepPhase::ZDownDropoff => self.z_down(self.config.dropoff_depth_mm, cancel)?,
                StepPhase::Dispense => {
                    observer.on_state(ExecutionState::Dispensing, step.dropoff_well);
                    self.dispense(step.sample_volume_ml, cancel)?;
                }
                StepPhase::ZUpAfterDropoff => self.ensure_z_up(cancel)?,
                StepPhase::TravelToRinse => {
                    let well = step.rinse_well.expect("phase only reached when rinse_well is Some");
                    observer.on_state(ExecutionState::Rinsing, Some(well));
                    self.travel_to(well, cancel)?;
                }
                StepPhase::RinseCycle { .. } => {
                    observer.on_state(ExecutionState::Rinsing, step.rinse_well);
                    self.rinse_cycle(cancel)?;
                }
                StepPhase::RinseFinalDispense => {
                    observer.on_state(ExecutionState::Rinsing, step.rinse_well);
                    self.rinse_final_dispense(cancel)?;
                }
                StepPhase::ZUpAfterRinse => self.ensure_z_up(cancel)?,
                StepPhase::Wait => {
                    observer.on_state(ExecutionState::Waiting, self.position.current_well());
                    self.wait(step.wait_seconds, cancel)?;
                }
                StepPhase::Done => return Ok(()),
            }
            phase = step_machine::next(phase, step, rinse_cycles).expect("Done is handled above");
        }
    }

    fn run_cycles_block(
        &mut self,
        step: &ProgramStep,
        rinse_cycles: u32,
        cancel: &CancellationToken,
        observer: &mut dyn ExecutorObserver,
    ) -> Result<(), ExecutorError> {
        for _ in 0..step.cycles {
            self.run_traversal(step, rinse_cycles, cancel, observer)?;
        }
        Ok(())
    }

    /// Run `step`'s full repetition schedule (spec.md §4.5/§8 property 7).
    fn run_step(
        &mut self,
        step: &ProgramStep,
        rinse_cycles: u32,
        cancel: &CancellationToken,
        observer: &mut dyn ExecutorObserver,
    ) -> Result<(), ExecutorError> {
        let total_firings = step.total_firings();
        let mut schedule = RepetitionSchedule::new(step.repetition, total_firings);
        match step.repetition {
            Repetition::Quantity { .. } => {
                while !schedule.is_exhausted() {
                    Self::check_cancelled(cancel)?;
                    self.run_cycles_block(step, rinse_cycles, cancel, observer)?;
                    schedule.fire_quantity();
                }
            }
            Repetition::Time { interval_s, .. } => {
                let start = Instant::now();
                let poll_interval = Duration::from_millis(sampler_common::consts::WAIT_CHECKPOINT_MS)
                    .min(Duration::from_secs_f64(interval_s.max(0.001)));
                while !schedule.is_exhausted() {
                    Self::check_cancelled(cancel)?;
                    let elapsed = start.elapsed().as_secs_f64();
                    if schedule.poll_time(elapsed).is_some() {
                        self.run_cycles_block(step, rinse_cycles, cancel, observer)?;
                    } else {
                        thread::sleep(poll_interval);
                    }
                }
            }
        }
        Ok(())
    }

    /// Move X/Y to `well` as a standalone primitive (spec.md §4.6:
    /// `move_to_well`).
    pub fn move_to_well(&mut self, well: WellId, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.travel_to(well, cancel)
    }

    /// Aspirate `volume` as a standalone primitive (spec.md §4.6:
    /// `aspirate`).
    pub fn aspirate_now(&mut self, volume: MilliLiters, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.aspirate(volume, cancel)
    }

    /// Dispense `volume` as a standalone primitive (spec.md §4.6:
    /// `dispense`).
    pub fn dispense_now(&mut self, volume: MilliLiters, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        self.dispense(volume, cancel)
    }

    /// Toggle Z between the safe-up position and a manual-down depth
    /// (spec.md §4.6: `toggle_z`). `Down` uses `DROPOFF_DEPTH` as the
    /// generic manual depth; no separate config key exists for manual
    /// jogging.
    pub fn toggle_z(&mut self, state: ZState, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        match state {
            ZState::Up => self.ensure_z_up(cancel),
            ZState::Down => self.z_down(self.config.dropoff_depth_mm, cancel),
        }
    }

    /// Step a single axis directly by `steps`, bypassing Kinematics
    /// (spec.md §4.6: `axis_jog`). Used for manual calibration, never as
    /// part of a `ProgramStep` traversal.
    pub fn axis_jog(
        &mut self,
        axis: Axis,
        steps: u32,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        Self::check_cancelled(cancel)?;
        if steps == 0 {
            return Ok(());
        }
        let seconds_per_step = if axis == Axis::Pipette {
            self.config.pipette_speed_s_per_step
        } else {
            self.config.travel_speed_s_per_step
        };
        let delay_us = Self::speed_to_delay_us(seconds_per_step);
        let outcome = self.exchange(|d| d.step(axis.motor_id(), steps, direction, delay_us, true))?;
        self.position
            .apply_axis_delta(axis, outcome.executed_steps, direction, outcome.limit_triggered, false)
            .map_err(ExecutorError::Motion)?;
        if axis == Axis::Z {
            let up = self.position.position(Axis::Z) == 0;
            self.position.set_z(if up { ZState::Up } else { ZState::Down });
        }
        Ok(())
    }

    /// Update the tracked tip count (spec.md §4.6: `set_pipette_count`,
    /// refused by the controller while a job is running).
    pub fn set_pipette_count(&mut self, count: u8) {
        self.position.set_pipette_count(count);
    }

    /// Rebind the pinned Configuration snapshot used by subsequent
    /// primitives (spec.md §4.7: "readers already executing a job keep
    /// their original snapshot for the duration of that job"). Called by
    /// the Execution Controller once per job, at `start_program`/
    /// `home_all` time — never mid-job.
    pub fn set_config(&mut self, config: Arc<Configuration>) {
        self.capacity_ml = Decimal::try_from(config.pipette_capacity_ml).unwrap_or(Decimal::MAX);
        self.config = config;
    }

    /// Run every step of `program` in order (spec.md §4.5, §4.6
    /// `start_program`). `rinse_cycles` is the Configuration Registry's
    /// `RINSE_CYCLES` value, pinned for the whole job.
    pub fn run_program(
        &mut self,
        program: &Program,
        rinse_cycles: u32,
        cancel: &CancellationToken,
        observer: &mut dyn ExecutorObserver,
    ) -> Result<(), ExecutorError> {
        if program.is_empty() {
            return Err(ExecutorError::Validation(ValidationError::EmptyProgram));
        }
        for step in program {
            step.validate()
                .map_err(|e| ExecutorError::Validation(ValidationError::InvalidStep(e)))?;
        }

        for step in program {
            if let Err(err) = self.run_step(step, rinse_cycles, cancel, observer) {
                self.stop_all_best_effort();
                if matches!(err, ExecutorError::Cancelled) {
                    observer.on_state(ExecutionState::Stopping, self.position.current_well());
                    observer.on_state(ExecutionState::Idle, None);
                    return Err(err);
                }
                if matches!(err, ExecutorError::Motion(_)) {
                    self.position.mark_uninitialized();
                }
                let reason = err.to_string();
                observer.on_state(ExecutionState::Error { reason }, self.position.current_well());
                return Err(err);
            }
        }
        observer.on_state(ExecutionState::Idle, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampler_hal::sim::{Injected, SimulatedTransport};

    struct RecordingObserver {
        states: Vec<ExecutionState>,
    }

    impl ExecutorObserver for RecordingObserver {
        fn on_state(&mut self, state: ExecutionState, _well: Option<WellId>) {
            self.states.push(state);
        }
        fn on_log(&mut self, _line: String) {}
    }

    fn test_config() -> Configuration {
        Configuration {
            well_spacing_mm: 9.0,
            well_diameter_mm: 6.5,
            well_height_mm: 11.0,
            steps_per_mm_x: 100.0,
            steps_per_mm_y: 100.0,
            steps_per_mm_z: 400.0,
            pipette_steps_per_ml: 1000.0,
            pickup_depth_mm: 8.0,
            dropoff_depth_mm: 5.0,
            safe_height_mm: 20.0,
            rinse_cycles: 2.0,
            travel_speed_s_per_step: 0.0001,
            pipette_speed_s_per_step: 0.0001,
            pipette_capacity_ml: 5.0,
            home_direction_x: 0.0,
            home_direction_y: 0.0,
            home_direction_z: 0.0,
            home_direction_pipette: 0.0,
        }
    }

    fn new_executor() -> PipettingExecutor<SimulatedTransport> {
        let mut driver = MotorDriverClient::new(SimulatedTransport::new());
        for id in 1..=4u8 {
            driver.init(id, 10 + id, 20 + id, 30 + id).unwrap();
        }
        let config = Arc::new(test_config());
        PipettingExecutor::new(driver, PositionTracker::new(), config)
    }

    fn homed_executor() -> PipettingExecutor<SimulatedTransport> {
        let mut ex = new_executor();
        ex.home_all().unwrap();
        ex
    }

    fn sample_step() -> ProgramStep {
        ProgramStep {
            pickup_well: WellId::new(0, 1).unwrap(),
            dropoff_well: Some(WellId::new(0, 2).unwrap()),
            rinse_well: None,
            sample_volume_ml: MilliLiters::new(Decimal::new(5, 1)).unwrap(),
            wait_seconds: 0,
            cycles: 1,
            pipette_count: PipetteCount::One,
            repetition: Repetition::Quantity { count: 1 },
        }
    }

    #[test]
    fn home_all_initializes_and_zeroes_position() {
        let ex = homed_executor();
        assert!(ex.position().initialized());
        assert_eq!(ex.position().position(Axis::X), 0);
    }

    #[test]
    fn single_transfer_completes_and_leaves_tip_empty() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let mut observer = RecordingObserver { states: vec![] };
        ex.run_program(&vec![sample_step()], 2, &cancel, &mut observer).unwrap();
        assert_eq!(ex.loaded_ml, Decimal::ZERO);
        assert!(observer.states.contains(&ExecutionState::Aspirating));
        assert!(observer.states.contains(&ExecutionState::Dispensing));
        assert_eq!(observer.states.last(), Some(&ExecutionState::Idle));
    }

    #[test]
    fn aspirate_past_capacity_is_overflow() {
        // test_config's PIPETTE_CAPACITY_ML is 5.0; loading two 3 mL draws
        // in a row overflows on the second.
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let draw = MilliLiters::new(Decimal::new(30, 1)).unwrap();
        ex.aspirate(draw, &cancel).unwrap();
        let result = ex.aspirate(draw, &cancel);
        assert!(matches!(result, Err(ExecutorError::Logic(LogicFault::Overflow { .. }))));
    }

    #[test]
    fn dispense_past_loaded_is_underflow() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let vol = MilliLiters::new(Decimal::new(5, 1)).unwrap();
        let result = ex.dispense(vol, &cancel);
        assert!(matches!(result, Err(ExecutorError::Logic(LogicFault::Underflow { .. }))));
    }

    #[test]
    fn three_tip_geometry_rejects_edge_column_before_motion() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let mut step = sample_step();
        step.pickup_well = WellId::new(0, 1).unwrap();
        step.pipette_count = PipetteCount::Three;
        let mut observer = NullObserver;
        let result = ex.run_program(&vec![step], 2, &cancel, &mut observer);
        assert!(matches!(result, Err(ExecutorError::Logic(LogicFault::InvalidGeometry { .. }))));
        // no motion attempted: position untouched from the homed origin
        assert_eq!(ex.position().position(Axis::X), 0);
    }

    #[test]
    fn cancellation_stops_before_next_primitive() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        cancel.cancel(sampler_common::cancel::CancelReason::User);
        let mut observer = NullObserver;
        let result = ex.run_program(&vec![sample_step()], 2, &cancel, &mut observer);
        assert!(matches!(result, Err(ExecutorError::Cancelled)));
    }

    #[test]
    fn unexpected_limit_during_travel_clears_initialized() {
        let mut ex = homed_executor();
        let mut sim = SimulatedTransport::new();
        sim.inject(Axis::X.motor_id(), Injected::LimitHit);
        let mut driver = MotorDriverClient::new(sim);
        for id in 1..=4u8 {
            driver.init(id, 10 + id, 20 + id, 30 + id).unwrap();
        }
        ex.driver = driver;
        ex.position.mark_homed();

        let cancel = CancellationToken::new();
        let mut observer = NullObserver;
        let err = ex
            .run_program(&vec![sample_step()], 2, &cancel, &mut observer)
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Motion(MotionFault::UnexpectedLimit { .. })));
        assert!(!ex.position().initialized());
    }

    #[test]
    fn empty_program_is_rejected() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let mut observer = NullObserver;
        let result = ex.run_program(&vec![], 2, &cancel, &mut observer);
        assert!(matches!(result, Err(ExecutorError::Validation(ValidationError::EmptyProgram))));
    }

    #[test]
    fn move_to_well_primitive_updates_current_well() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let target = WellId::new(2, 5).unwrap();
        ex.move_to_well(target, &cancel).unwrap();
        assert_eq!(ex.position().current_well(), Some(target));
    }

    #[test]
    fn aspirate_then_dispense_primitives_round_trip_loaded_volume() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let vol = MilliLiters::new(Decimal::new(1, 0)).unwrap();
        ex.aspirate_now(vol, &cancel).unwrap();
        assert_eq!(ex.loaded_ml, Decimal::ONE);
        ex.dispense_now(vol, &cancel).unwrap();
        assert_eq!(ex.loaded_ml, Decimal::ZERO);
    }

    #[test]
    fn toggle_z_down_then_up_round_trips_to_safe_height() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        ex.toggle_z(ZState::Down, &cancel).unwrap();
        assert_eq!(ex.position().z_state(), ZState::Down);
        assert_ne!(ex.position().position(Axis::Z), 0);
        ex.toggle_z(ZState::Up, &cancel).unwrap();
        assert_eq!(ex.position().z_state(), ZState::Up);
        assert_eq!(ex.position().position(Axis::Z), 0);
    }

    #[test]
    fn axis_jog_steps_a_single_axis_without_kinematics() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        ex.axis_jog(Axis::X, 250, Direction::Cw, &cancel).unwrap();
        assert_eq!(ex.position().position(Axis::X), 250);
    }

    #[test]
    fn set_config_rebinds_capacity_for_subsequent_primitives() {
        let mut ex = homed_executor();
        let cancel = CancellationToken::new();
        let mut tighter = test_config();
        tighter.pipette_capacity_ml = 1.0;
        ex.set_config(Arc::new(tighter));
        let draw = MilliLiters::new(Decimal::new(15, 1)).unwrap();
        let result = ex.aspirate_now(draw, &cancel);
        assert!(matches!(result, Err(ExecutorError::Logic(LogicFault::Overflow { .. }))));
    }

    #[test]
    fn set_pipette_count_updates_position_tracker() {
        let mut ex = homed_executor();
        ex.set_pipette_count(3);
        assert_eq!(ex.position().pipette_count(), 3);
    }
}
