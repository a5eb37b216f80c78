//! REST contract DTOs and dispatch layer (spec.md §6).
//!
//! This crate documents the external HTTP contract without pulling in a
//! web framework, since the layer that actually terminates the
//! connection is out of scope for this repo. [`dispatch`] is what a real
//! HTTP handler would call once the framework has parsed the method,
//! path, and body into an [`ApiRequest`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use sampler_common::axis::{Axis, Direction, StepCount, ZState};
use sampler_common::config::{ConfigError, Configuration};
use sampler_common::error::{ControllerError, ExecutorError, TransportError};
use sampler_common::program::Program;
use sampler_common::state::StatusSnapshot;
use sampler_common::volume::MilliLiters;
use sampler_common::well::WellId;

use sampler_controller::ExecutionController;
use sampler_hal::transport::Transport;

/// One request as it would arrive over the external REST surface
/// (spec.md §6). The `op` tag and field names match the route bodies
/// 1:1 so a thin HTTP layer only has to parse method+path into a variant
/// and hand the JSON body straight to serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    /// `POST /pipetting/execute`
    Execute {
        /// The program to run.
        steps: Program,
    },
    /// `POST /pipetting/stop`
    Stop,
    /// `POST /pipetting/home`
    Home,
    /// `POST /pipetting/move-to-well`
    MoveToWell {
        /// Target well.
        well_id: WellId,
    },
    /// `POST /pipetting/aspirate`
    Aspirate {
        /// Volume to draw.
        volume: MilliLiters,
    },
    /// `POST /pipetting/dispense`
    Dispense {
        /// Volume to expel.
        volume: MilliLiters,
    },
    /// `POST /pipetting/toggle-z`
    ToggleZ {
        /// Target Z state.
        direction: ZState,
    },
    /// `POST /axis/move`
    AxisMove {
        /// Axis to step.
        axis: Axis,
        /// Step count.
        steps: u32,
        /// Rotation direction.
        direction: Direction,
    },
    /// `GET /axis/positions`
    AxisPositions,
    /// `GET /pipetting/status`
    Status,
    /// `GET /pipetting/logs?last_n=N`
    Logs {
        /// Number of trailing lines requested.
        last_n: usize,
    },
    /// `GET /config`
    GetConfig,
    /// `POST /config`
    SetConfig {
        /// Replacement configuration, validated before it takes effect.
        config: Configuration,
    },
    /// `POST /pipetting/set-pipette-count`
    SetPipetteCount {
        /// New tip count, restricted to `{1, 3}`.
        pipette_count: u8,
    },
}

/// Per-axis step positions (spec.md §6: `GET /axis/positions` → `{positions}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisPositions {
    /// X axis step position.
    pub x: StepCount,
    /// Y axis step position.
    pub y: StepCount,
    /// Z axis step position.
    pub z: StepCount,
    /// Pipette plunger step position.
    pub pipette: StepCount,
}

/// The payload half of an [`ApiResponse`] (spec.md §6's per-route bodies).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApiOutcome {
    /// A bare acknowledgement (`{message}`), used by every mutating route
    /// whose interesting state lives in `StatusSnapshot`/`LogRing` instead.
    Message {
        /// Human-readable status line.
        message: String,
    },
    /// `GET /axis/positions` and the `{positions}` body of `POST /axis/move`.
    Positions(AxisPositions),
    /// `GET /pipetting/status`.
    Status(StatusSnapshot),
    /// `GET /pipetting/logs`.
    Logs {
        /// Trailing log lines, oldest first.
        logs: Vec<String>,
    },
    /// `GET|POST /config`.
    Config(Configuration),
    /// Any failure, carrying the HTTP-status-equivalent code a real
    /// server would respond with (spec.md §6: 400/409/500/503).
    Error {
        /// HTTP-status-equivalent code.
        code: u16,
        /// Human-readable failure description.
        message: String,
    },
}

/// A dispatched request's outcome, paired with the status code a REST
/// layer would set on the HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP-status-equivalent code: 200/202 success, 400 invalid input,
    /// 409 busy/state-disallowed, 500 internal/logic fault, 503 MCU
    /// disconnected (spec.md §6).
    pub status: u16,
    /// The response body.
    pub body: ApiOutcome,
}

impl ApiResponse {
    fn ok(status: u16, body: ApiOutcome) -> Self {
        Self { status, body }
    }

    fn message(status: u16, message: impl Into<String>) -> Self {
        Self::ok(
            status,
            ApiOutcome::Message {
                message: message.into(),
            },
        )
    }
}

fn transport_status(err: &TransportError) -> u16 {
    match err {
        TransportError::Disconnected(_) => 503,
        _ => 500,
    }
}

fn executor_status(err: &ExecutorError) -> u16 {
    match err {
        ExecutorError::Validation(_) => 400,
        ExecutorError::Cancelled => 409,
        ExecutorError::Transport(t) => transport_status(t),
        ExecutorError::Motion(sampler_common::error::MotionFault::Transport(t)) => transport_status(t),
        ExecutorError::Motion(_) | ExecutorError::Logic(_) => 500,
    }
}

/// Map a [`ControllerError`] to the HTTP-status-equivalent code spec.md
/// §6 specifies, and render it as an [`ApiResponse`].
fn map_controller_error(err: ControllerError) -> ApiResponse {
    let code = match &err {
        ControllerError::Busy | ControllerError::NotInitialized => 409,
        ControllerError::Executor(exec_err) => executor_status(exec_err),
        ControllerError::Config(_) => 400,
    };
    ApiResponse::ok(
        code,
        ApiOutcome::Error {
            code,
            message: err.to_string(),
        },
    )
}

fn map_config_error(err: ConfigError) -> ApiResponse {
    ApiResponse::ok(
        400,
        ApiOutcome::Error {
            code: 400,
            message: err.to_string(),
        },
    )
}

fn axis_positions_of(snapshot: sampler_executor::PositionSnapshot) -> AxisPositions {
    AxisPositions {
        x: snapshot.positions[Axis::X.index()],
        y: snapshot.positions[Axis::Y.index()],
        z: snapshot.positions[Axis::Z.index()],
        pipette: snapshot.positions[Axis::Pipette.index()],
    }
}

/// Route one [`ApiRequest`] to the matching [`ExecutionController`] call
/// and translate the result into an [`ApiResponse`] (spec.md §6).
///
/// `config_path` is the on-disk location `SetConfig`/`GetConfig` read and
/// write — the Execution Controller's [`sampler_common::config::ConfigRegistry`]
/// does not retain the path it was loaded from, so the caller (the
/// `sampler` binary, which owns the `--config` CLI flag) supplies it on
/// every call.
pub fn dispatch<T: Transport + 'static>(
    controller: &ExecutionController<T>,
    config_path: &Path,
    request: ApiRequest,
) -> ApiResponse {
    tracing::debug!(?request, "dispatching api request");
    match request {
        ApiRequest::Execute { steps } => match controller.start_program(steps) {
            Ok(()) => ApiResponse::message(202, "program accepted"),
            Err(err) => map_controller_error(err),
        },
        ApiRequest::Stop => {
            controller.stop();
            ApiResponse::message(200, "stop requested")
        }
        ApiRequest::Home => match controller.home_all() {
            Ok(()) => ApiResponse::message(200, "homed"),
            Err(err) => map_controller_error(err),
        },
        ApiRequest::MoveToWell { well_id } => match controller.move_to_well(well_id) {
            Ok(()) => ApiResponse::message(200, format!("moved to {well_id}")),
            Err(err) => map_controller_error(err),
        },
        ApiRequest::Aspirate { volume } => match controller.aspirate(volume) {
            Ok(()) => ApiResponse::message(200, format!("aspirated {volume}")),
            Err(err) => map_controller_error(err),
        },
        ApiRequest::Dispense { volume } => match controller.dispense(volume) {
            Ok(()) => ApiResponse::message(200, format!("dispensed {volume}")),
            Err(err) => map_controller_error(err),
        },
        ApiRequest::ToggleZ { direction } => match controller.toggle_z(direction) {
            Ok(()) => ApiResponse::message(200, "z toggled"),
            Err(err) => map_controller_error(err),
        },
        ApiRequest::AxisMove { axis, steps, direction } => {
            match controller.axis_jog(axis, steps, direction) {
                Ok(()) => ApiResponse::ok(200, ApiOutcome::Positions(axis_positions_of(controller.axis_positions()))),
                Err(err) => map_controller_error(err),
            }
        }
        ApiRequest::AxisPositions => {
            ApiResponse::ok(200, ApiOutcome::Positions(axis_positions_of(controller.axis_positions())))
        }
        ApiRequest::Status => ApiResponse::ok(200, ApiOutcome::Status((*controller.status()).clone())),
        ApiRequest::Logs { last_n } => ApiResponse::ok(
            200,
            ApiOutcome::Logs {
                logs: controller.logs(last_n),
            },
        ),
        ApiRequest::GetConfig => ApiResponse::ok(200, ApiOutcome::Config(*controller.config_registry().current())),
        ApiRequest::SetConfig { config } => match controller.config_registry().write_and_swap(config_path, config) {
            Ok(()) => ApiResponse::ok(200, ApiOutcome::Config(config)),
            Err(err) => map_config_error(err),
        },
        ApiRequest::SetPipetteCount { pipette_count } => match controller.set_pipette_count(pipette_count) {
            Ok(()) => ApiResponse::message(200, format!("pipette count set to {pipette_count}")),
            Err(err) => map_controller_error(err),
        },
    }
}
