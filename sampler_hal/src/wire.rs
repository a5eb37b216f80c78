//! MCU wire protocol (spec.md §6): newline-delimited JSON, tagged request
//! and response unions.
//!
//! Replaces the "dynamic JSON command routing" pattern the reference
//! system used (spec.md §9) with an exhaustively-matched tagged union,
//! serialized only at this module's boundary.

use serde::{Deserialize, Serialize};

/// One request frame sent to the MCU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Request {
    /// `init_motor {motor_id, pulse_pin, dir_pin, limit_pin}`.
    #[serde(rename = "init_motor")]
    InitMotor {
        /// 1-based motor index.
        motor_id: u8,
        /// Step-pulse GPIO pin.
        pulse_pin: u8,
        /// Direction GPIO pin.
        dir_pin: u8,
        /// Limit-switch GPIO pin.
        limit_pin: u8,
    },
    /// `step {motor_id, direction, steps, delay_us, respect_limit}`.
    #[serde(rename = "step")]
    Step {
        /// 1-based motor index.
        motor_id: u8,
        /// `0` = CCW, `1` = CW.
        direction: u8,
        /// Requested step count, `>= 0`.
        steps: u32,
        /// Inter-pulse delay, microseconds, `>= 1`.
        delay_us: u32,
        /// Whether to stop early on a triggered limit switch.
        respect_limit: bool,
    },
    /// `home_motor {motor_id, direction, delay_us, max_steps}`.
    #[serde(rename = "home_motor")]
    HomeMotor {
        /// 1-based motor index.
        motor_id: u8,
        /// Direction to travel while homing.
        direction: u8,
        /// Inter-pulse delay, microseconds.
        delay_us: u32,
        /// Ceiling on steps before giving up.
        max_steps: u32,
    },
    /// `home_all {direction, delay_us, max_steps}`.
    #[serde(rename = "home_all")]
    HomeAll {
        /// Direction to travel while homing, applied to all motors.
        direction: u8,
        /// Inter-pulse delay, microseconds.
        delay_us: u32,
        /// Ceiling on steps before giving up.
        max_steps: u32,
    },
    /// `move_batch {respect_limits, movements}`.
    #[serde(rename = "move_batch")]
    MoveBatch {
        /// Whether to stop early on a triggered limit switch.
        respect_limits: bool,
        /// Per-motor movement requests, stepped in lockstep.
        movements: Vec<Movement>,
    },
    /// `get_limits`.
    #[serde(rename = "get_limits")]
    GetLimits,
    /// `stop {motor_id}`.
    #[serde(rename = "stop")]
    Stop {
        /// 1-based motor index.
        motor_id: u8,
    },
    /// `stop_all`.
    #[serde(rename = "stop_all")]
    StopAll,
    /// `ping`.
    #[serde(rename = "ping")]
    Ping,
}

/// One motor's movement within a [`Request::MoveBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// 1-based motor index.
    pub motor_id: u8,
    /// Requested step count, `>= 0`.
    pub steps: u32,
    /// `0` = CCW, `1` = CW.
    pub direction: u8,
    /// Inter-pulse delay, microseconds.
    pub delay_us: u32,
}

/// One reported motor's result within a [`Response::MoveBatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementResult {
    /// 1-based motor index.
    pub motor_id: u8,
    /// Steps actually executed, `<= requested`.
    pub steps_executed: u32,
    /// Whether a limit switch stopped the move early.
    pub limit_hit: bool,
}

/// One limit switch's state within a [`Response::Limits`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitState {
    /// 1-based motor index.
    pub motor_id: u8,
    /// `true` iff the line reads low (spec.md §6: normally-open, pull-up).
    pub triggered: bool,
    /// GPIO pin backing the switch.
    pub pin: u8,
}

/// One reply frame received from the MCU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    /// Plain success acknowledgement (`init_motor`, `stop`, `stop_all`).
    #[serde(rename = "ok")]
    Ok,
    /// Firmware-reported failure.
    #[serde(rename = "error")]
    Error {
        /// Human-readable failure reason.
        #[serde(default)]
        message: String,
    },
    /// Reply to `ping`.
    #[serde(rename = "pong")]
    Pong,
    /// Reply to `step`.
    #[serde(rename = "step_result")]
    StepResult {
        /// Steps actually executed.
        steps_executed: u32,
        /// Whether the limit switch stopped the move early.
        limit_triggered: bool,
    },
    /// Reply to `home_motor`.
    #[serde(rename = "home_result")]
    HomeResult {
        /// Steps taken before the switch triggered (or `max_steps` if not).
        steps_to_home: u32,
        /// `false` iff `max_steps` was reached without triggering.
        homed: bool,
    },
    /// Reply to `home_all`.
    #[serde(rename = "home_all_result")]
    HomeAllResult {
        /// Steps taken per motor, in motor-index order.
        steps_to_home: [u32; 4],
        /// Per-motor homed flag, in motor-index order.
        homed: [bool; 4],
    },
    /// Reply to `move_batch`.
    #[serde(rename = "move_batch_result")]
    MoveBatchResult {
        /// Per-motor movement results.
        results: Vec<MovementResult>,
    },
    /// Reply to `get_limits`.
    #[serde(rename = "limits")]
    Limits {
        /// Per-motor limit-switch state.
        limits: Vec<LimitState>,
    },
}
