//! Execution Controller (spec.md §4.6): the single owner of the motion
//! lock, the job/request concurrency split, and the StatusSnapshot/LogRing
//! published for pollers.
//!
//! A synchronous, `std::thread`-based supervisor — the workspace carries
//! no `tokio` dependency, and spec.md §5 allows "a single process...
//! either multi-threaded or a cooperative task surface." `start_program`
//! is the one operation long enough to warrant running off the calling
//! thread; every other entry point completes synchronously while holding
//! the lock, so a single command source is gated at a time.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use sampler_common::axis::{Axis, Direction, ZState};
use sampler_common::cancel::{CancelReason, CancellationToken};
use sampler_common::config::ConfigRegistry;
use sampler_common::error::{ControllerError, ExecutorError, LogicFault};
use sampler_common::program::Program;
use sampler_common::state::{ExecutionState, StatusSnapshot};
use sampler_common::volume::MilliLiters;
use sampler_common::well::WellId;

use sampler_executor::{ExecutorObserver, PipettingExecutor};
use sampler_hal::transport::Transport;

use crate::lock::MotionLock;
use crate::logring::LogRing;
use crate::status::StatusPublisher;

/// Build a full StatusSnapshot from the executor's current Position
/// Tracker, used at job/primitive start and end when the exact axis
/// state is in hand (mid-job, [`JobObserver`] updates only the
/// operation fields instead — see [`StatusPublisher::update_operation`]).
fn snapshot_from_executor<T: Transport>(
    executor: &PipettingExecutor<T>,
    state: ExecutionState,
    message: impl Into<String>,
) -> StatusSnapshot {
    let position = executor.position();
    StatusSnapshot {
        initialized: position.initialized(),
        current_well: position.current_well(),
        z_state: position.z_state(),
        pipette_count: position.pipette_count(),
        operation_well: position.current_well(),
        is_executing: state.is_executing(),
        current_operation: state,
        message: message.into(),
    }
}

/// Translates Pipetting Executor progress notifications into LogRing
/// lines and StatusPublisher updates, decoupling the executor from this
/// crate (spec.md §9).
struct JobObserver {
    status: StatusPublisher,
    logs: LogRing,
}

impl ExecutorObserver for JobObserver {
    fn on_state(&mut self, state: ExecutionState, well: Option<WellId>) {
        self.status.update_operation(state, well);
    }

    fn on_log(&mut self, line: String) {
        self.logs.push(line);
    }
}

/// Single-owner entry point for every motion operation (spec.md §4.6).
/// Cloning shares the same lock, executor, and publishers — cheap, and
/// safe to hand to multiple request-handling threads.
#[derive(Clone)]
pub struct ExecutionController<T: Transport + 'static> {
    lock: MotionLock,
    executor: Arc<Mutex<PipettingExecutor<T>>>,
    config: ConfigRegistry,
    cancel: Arc<Mutex<CancellationToken>>,
    status: StatusPublisher,
    logs: LogRing,
}

impl<T: Transport + 'static> ExecutionController<T> {
    /// Wrap an already-constructed executor. `config` is the live
    /// Configuration Registry; each job pins its own `Arc` snapshot at
    /// start (spec.md §4.7).
    pub fn new(executor: PipettingExecutor<T>, config: ConfigRegistry) -> Self {
        Self {
            lock: MotionLock::new(),
            executor: Arc::new(Mutex::new(executor)),
            config,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            status: StatusPublisher::new(),
            logs: LogRing::new(),
        }
    }

    /// Non-blocking status read (spec.md §4.6: `status()`).
    pub fn status(&self) -> Arc<StatusSnapshot> {
        self.status.current()
    }

    /// Non-blocking log read (spec.md §4.6: `logs(last_n)`).
    pub fn logs(&self, last_n: usize) -> Vec<String> {
        self.logs.last_n(last_n)
    }

    /// Share the Configuration Registry so the API layer can serve
    /// `GET|POST /config` without a second handle into the process.
    pub fn config_registry(&self) -> &ConfigRegistry {
        &self.config
    }

    /// Raw per-axis step counts (spec.md §6: `GET /axis/positions`).
    /// Briefly locks the executor, same as any other read of live
    /// hardware state — unlike `status()`/`logs()` this can block behind
    /// a running job, which is acceptable for a low-frequency diagnostic
    /// read.
    pub fn axis_positions(&self) -> sampler_executor::PositionSnapshot {
        self.executor.lock().position().snapshot()
    }

    /// Whether a job or single primitive currently holds the motion lock.
    pub fn is_busy(&self) -> bool {
        self.lock.is_held()
    }

    /// Request cancellation of whatever is currently running (spec.md
    /// §4.6: `stop()`). Idempotent and always succeeds, including when
    /// nothing is running — cancellation is observed at the next
    /// checkpoint the job thread reaches, see spec.md §5.
    pub fn stop(&self) {
        tracing::info!("stop requested");
        self.cancel.lock().cancel(CancelReason::User);
        self.logs.push("stop requested");
    }

    /// Home every axis (spec.md §4.6: `home_all`). Runs synchronously
    /// under the motion lock: the four-axis homing sequence is bounded
    /// and has no interior cancellation checkpoint in this build, unlike
    /// `start_program`'s potentially long-running traversal.
    pub fn home_all(&self) -> Result<(), ControllerError> {
        let _guard = self.lock.try_acquire().ok_or(ControllerError::Busy)?;
        let mut executor = self.executor.lock();
        executor.set_config(self.config.current());

        tracing::info!("home_all started");
        self.status.publish(snapshot_from_executor(&executor, ExecutionState::Homing, "homing"));
        self.logs.push("home_all started");

        let result = executor.home_all();
        match &result {
            Ok(()) => {
                tracing::info!("home_all completed");
                self.logs.push("home_all completed");
                self.status.publish(snapshot_from_executor(&executor, ExecutionState::Idle, "idle"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "home_all failed");
                let message = format!("home_all failed: {err}");
                self.logs.push(message.clone());
                self.status.publish(snapshot_from_executor(
                    &executor,
                    ExecutionState::Error { reason: err.to_string() },
                    message,
                ));
            }
        }
        result.map_err(ControllerError::from)
    }

    /// Run `body` as a single motion primitive: acquires the lock,
    /// refuses with `NotInitialized` before the first successful
    /// `home_all`, publishes the outcome, and releases the lock on
    /// return (spec.md §4.6's `move_to_well`/`aspirate`/`dispense`/
    /// `toggle_z`/`axis_jog` share this shape).
    fn run_primitive<F>(&self, label: &str, body: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut PipettingExecutor<T>, &CancellationToken) -> Result<(), ExecutorError>,
    {
        let _guard = self.lock.try_acquire().ok_or(ControllerError::Busy)?;
        let mut executor = self.executor.lock();
        if !executor.position().initialized() {
            return Err(ControllerError::NotInitialized);
        }
        executor.set_config(self.config.current());

        let cancel = {
            let mut current = self.cancel.lock();
            *current = CancellationToken::new();
            current.clone()
        };

        let result = body(&mut executor, &cancel);
        match &result {
            Ok(()) => {
                self.logs.push(format!("{label} completed"));
                self.status.publish(snapshot_from_executor(&executor, ExecutionState::Idle, "idle"));
            }
            Err(ExecutorError::Cancelled) => {
                self.logs.push(format!("{label} stopped by user"));
                self.status
                    .publish(snapshot_from_executor(&executor, ExecutionState::Stopping, "stopping"));
                self.status.publish(snapshot_from_executor(&executor, ExecutionState::Idle, "idle"));
            }
            Err(err) => {
                let message = format!("{label} failed: {err}");
                self.logs.push(message.clone());
                self.status.publish(snapshot_from_executor(
                    &executor,
                    ExecutionState::Error { reason: err.to_string() },
                    message,
                ));
            }
        }
        result.map_err(ControllerError::from)
    }

    /// Move X/Y to `well` (spec.md §4.6: `move_to_well`).
    pub fn move_to_well(&self, well: WellId) -> Result<(), ControllerError> {
        self.run_primitive("move_to_well", |executor, cancel| executor.move_to_well(well, cancel))
    }

    /// Aspirate `volume` (spec.md §4.6: `aspirate`).
    pub fn aspirate(&self, volume: MilliLiters) -> Result<(), ControllerError> {
        self.run_primitive("aspirate", |executor, cancel| executor.aspirate_now(volume, cancel))
    }

    /// Dispense `volume` (spec.md §4.6: `dispense`).
    pub fn dispense(&self, volume: MilliLiters) -> Result<(), ControllerError> {
        self.run_primitive("dispense", |executor, cancel| executor.dispense_now(volume, cancel))
    }

    /// Toggle Z between safe-up and a manual-down depth (spec.md §4.6: `toggle_z`).
    pub fn toggle_z(&self, state: ZState) -> Result<(), ControllerError> {
        self.run_primitive("toggle_z", move |executor, cancel| executor.toggle_z(state, cancel))
    }

    /// Step one axis directly (spec.md §4.6: `axis_jog`).
    pub fn axis_jog(&self, axis: Axis, steps: u32, direction: Direction) -> Result<(), ControllerError> {
        self.run_primitive("axis_jog", move |executor, cancel| {
            executor.axis_jog(axis, steps, direction, cancel)
        })
    }

    /// Update the tracked tip count, restricted to `{1, 3}` and refused
    /// while a job or primitive is running (spec.md §4.6: `set_pipette_count`).
    pub fn set_pipette_count(&self, count: u8) -> Result<(), ControllerError> {
        let _guard = self.lock.try_acquire().ok_or(ControllerError::Busy)?;
        if count != 1 && count != 3 {
            return Err(ControllerError::Executor(ExecutorError::Logic(LogicFault::InvalidGeometry {
                reason: format!("pipette count must be 1 or 3, got {count}"),
            })));
        }
        let mut executor = self.executor.lock();
        executor.set_pipette_count(count);
        self.logs.push(format!("pipette count set to {count}"));
        self.status
            .publish(snapshot_from_executor(&executor, ExecutionState::Idle, "idle"));
        Ok(())
    }

    /// Accept `program` and run it on a background job thread (spec.md
    /// §4.6: `start_program`). Returns as soon as the job is accepted —
    /// poll [`Self::status`]/[`Self::logs`] for progress, not the return
    /// value of this call.
    pub fn start_program(&self, program: Program) -> Result<(), ControllerError>
    where
        T: Send,
    {
        let guard = self.lock.try_acquire().ok_or(ControllerError::Busy)?;

        if !self.executor.lock().position().initialized() {
            return Err(ControllerError::NotInitialized);
        }

        let cancel = {
            let mut current = self.cancel.lock();
            *current = CancellationToken::new();
            current.clone()
        };

        let executor = Arc::clone(&self.executor);
        let status = self.status.clone();
        let logs = self.logs.clone();
        let config = self.config.current();
        let rinse_cycles = config.rinse_cycles as u32;

        let step_count = program.len();
        thread::spawn(move || {
            // Held for the whole job; releases the motion lock on drop.
            let _guard = guard;

            let mut exec = executor.lock();
            exec.set_config(config);
            tracing::info!(step_count, "program started");
            logs.push("program started");
            status.publish(snapshot_from_executor(&exec, ExecutionState::Moving, "running program"));

            let mut observer = JobObserver {
                status: status.clone(),
                logs: logs.clone(),
            };
            let result = exec.run_program(&program, rinse_cycles, &cancel, &mut observer);
            match result {
                Ok(()) => {
                    tracing::info!("program completed");
                    logs.push("program completed");
                    status.publish(snapshot_from_executor(&exec, ExecutionState::Idle, "idle"));
                }
                Err(ExecutorError::Cancelled) => {
                    tracing::info!("program stopped by user");
                    logs.push("program stopped by user");
                    status.publish(snapshot_from_executor(&exec, ExecutionState::Stopping, "stopping"));
                    status.publish(snapshot_from_executor(&exec, ExecutionState::Idle, "idle"));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "program failed");
                    let message = format!("program failed: {err}");
                    logs.push(message.clone());
                    status.publish(snapshot_from_executor(
                        &exec,
                        ExecutionState::Error { reason: err.to_string() },
                        message,
                    ));
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use sampler_common::config::Configuration;
    use sampler_common::program::{PipetteCount, ProgramStep, Repetition};
    use sampler_executor::PositionTracker;
    use sampler_hal::driver::MotorDriverClient;
    use sampler_hal::sim::SimulatedTransport;

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
            rinse_cycles: 1.0,
            travel_speed_s_per_step: 0.00001,
            pipette_speed_s_per_step: 0.00001,
            pipette_capacity_ml: 5.0,
            home_direction_x: 0.0,
            home_direction_y: 0.0,
            home_direction_z: 0.0,
            home_direction_pipette: 0.0,
        }
    }

    fn new_controller() -> ExecutionController<SimulatedTransport> {
        let mut driver = MotorDriverClient::new(SimulatedTransport::new());
        for id in 1..=4u8 {
            driver.init(id, 10 + id, 20 + id, 30 + id).unwrap();
        }
        let config = ConfigRegistry::from_configuration(test_config()).unwrap();
        let executor = PipettingExecutor::new(driver, PositionTracker::new(), config.current());
        ExecutionController::new(executor, config)
    }

    fn sample_program() -> Program {
        vec![ProgramStep {
            pickup_well: WellId::new(0, 1).unwrap(),
            dropoff_well: Some(WellId::new(0, 2).unwrap()),
            rinse_well: None,
            sample_volume_ml: MilliLiters::new(Decimal::new(5, 1)).unwrap(),
            wait_seconds: 0,
            cycles: 1,
            pipette_count: PipetteCount::One,
            repetition: Repetition::Quantity { count: 1 },
        }]
    }

    #[test]
    fn single_primitives_are_rejected_before_homing() {
        let controller = new_controller();
        let result = controller.move_to_well(WellId::new(0, 3).unwrap());
        assert!(matches!(result, Err(ControllerError::NotInitialized)));
    }

    #[test]
    fn home_all_initializes_and_move_to_well_then_succeeds() {
        let controller = new_controller();
        controller.home_all().unwrap();
        assert!(controller.status().initialized);

        let target = WellId::new(3, 7).unwrap();
        controller.move_to_well(target).unwrap();
        assert_eq!(controller.status().current_well, Some(target));
    }

    #[test]
    fn home_all_while_busy_is_rejected() {
        let controller = new_controller();
        let _guard = controller.lock.try_acquire().unwrap();
        assert!(matches!(controller.home_all(), Err(ControllerError::Busy)));
    }

    #[test]
    fn set_pipette_count_rejects_invalid_counts() {
        let controller = new_controller();
        controller.home_all().unwrap();
        assert!(controller.set_pipette_count(2).is_err());
        controller.set_pipette_count(3).unwrap();
        assert_eq!(controller.status().pipette_count, 3);
    }

    #[test]
    fn start_program_runs_to_completion_and_publishes_idle() {
        let controller = new_controller();
        controller.home_all().unwrap();
        controller.start_program(sample_program()).unwrap();

        for _ in 0..200 {
            if !controller.status().is_executing {
                break;
            }
            sleep(Duration::from_millis(5));
        }

        let status = controller.status();
        assert!(!status.is_executing);
        assert_eq!(status.current_operation, ExecutionState::Idle);
        assert!(controller.logs(10).iter().any(|l| l.contains("program completed")));
    }

    #[test]
    fn stop_during_running_program_ends_idle_not_error() {
        let controller = new_controller();
        controller.home_all().unwrap();

        let mut program = sample_program();
        program[0].wait_seconds = 5;
        controller.start_program(program).unwrap();

        sleep(Duration::from_millis(20));
        controller.stop();

        for _ in 0..200 {
            if !controller.status().is_executing {
                break;
            }
            sleep(Duration::from_millis(5));
        }

        let status = controller.status();
        assert!(!status.is_executing);
        assert_eq!(status.current_operation, ExecutionState::Idle);
        assert!(controller.logs(10).iter().any(|l| l.contains("stopped by user")));
    }

    #[test]
    fn start_program_rejects_while_another_job_runs() {
        let controller = new_controller();
        controller.home_all().unwrap();
        controller.start_program(sample_program()).unwrap();
        let result = controller.start_program(sample_program());
        assert!(matches!(result, Err(ControllerError::Busy)));

        for _ in 0..200 {
            if !controller.is_busy() {
                break;
            }
            sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn stop_is_idempotent_with_no_job_running() {
        let controller = new_controller();
        controller.stop();
        controller.stop();
    }
}
