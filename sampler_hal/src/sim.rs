//! In-memory simulated transport, used by `sampler_executor`/`sampler_controller`
//! tests and by the `sampler` binary's `--simulate` mode. Grounded on the
//! dual real/simulated driver split other hardware-facing examples in the
//! pack use to keep test suites hardware-free.

use std::collections::HashMap;
use std::time::Duration;

use crate::transport::{Transport, TransportResult};
use crate::wire::{LimitState, MovementResult, Request, Response};

/// Fault to inject on the next matching request, for failure-path tests.
#[derive(Debug, Clone)]
pub enum Injected {
    /// Respond as if the limit switch triggered mid-move.
    LimitHit,
    /// Time out instead of replying.
    Timeout,
    /// Fail as if the link dropped.
    IoError,
}

/// A transport backed by an in-process motor model. Every motor starts at
/// position 0 and steps respond immediately with the full requested count
/// unless a fault has been injected for that motor.
pub struct SimulatedTransport {
    positions: HashMap<u8, i64>,
    broken: bool,
    injected: HashMap<u8, Injected>,
}

impl SimulatedTransport {
    /// Construct a fresh simulator with all motors at position 0.
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            broken: false,
            injected: HashMap::new(),
        }
    }

    /// Read back a motor's simulated absolute step position.
    pub fn position(&self, motor_id: u8) -> i64 {
        *self.positions.get(&motor_id).unwrap_or(&0)
    }

    /// Inject a fault to be returned on `motor_id`'s next request.
    pub fn inject(&mut self, motor_id: u8, fault: Injected) {
        self.injected.insert(motor_id, fault);
    }

    fn apply_step(&mut self, motor_id: u8, steps: u32, direction: u8) -> i64 {
        let delta = if direction == 1 {
            steps as i64
        } else {
            -(steps as i64)
        };
        let entry = self.positions.entry(motor_id).or_insert(0);
        *entry += delta;
        *entry
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedTransport {
    fn send_request(&mut self, request: &Request, _timeout: Duration) -> TransportResult {
        if self.broken {
            return TransportResult::IoError(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "simulated transport is broken",
            ));
        }

        match request {
            Request::InitMotor { .. } => TransportResult::Reply(Response::Ok),
            Request::Step {
                motor_id,
                direction,
                steps,
                ..
            } => {
                if let Some(fault) = self.injected.remove(motor_id) {
                    return self.fault_response(fault);
                }
                self.apply_step(*motor_id, *steps, *direction);
                TransportResult::Reply(Response::StepResult {
                    steps_executed: *steps,
                    limit_triggered: false,
                })
            }
            Request::HomeMotor {
                motor_id,
                max_steps,
                ..
            } => match self.injected.remove(motor_id) {
                Some(Injected::Timeout) => TransportResult::Timeout,
                Some(Injected::IoError) => {
                    self.broken = true;
                    TransportResult::IoError(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "injected I/O fault",
                    ))
                }
                // No limit switch found within the travel ceiling.
                Some(Injected::LimitHit) => TransportResult::Reply(Response::HomeResult {
                    steps_to_home: *max_steps,
                    homed: false,
                }),
                None => {
                    self.positions.insert(*motor_id, 0);
                    TransportResult::Reply(Response::HomeResult {
                        steps_to_home: 1,
                        homed: true,
                    })
                }
            },
            Request::HomeAll { .. } => {
                for id in 1..=4u8 {
                    self.positions.insert(id, 0);
                }
                TransportResult::Reply(Response::HomeAllResult {
                    steps_to_home: [1, 1, 1, 1],
                    homed: [true, true, true, true],
                })
            }
            Request::MoveBatch { movements, .. } => {
                let mut results = Vec::with_capacity(movements.len());
                for m in movements {
                    match self.injected.remove(&m.motor_id) {
                        Some(Injected::LimitHit) => {
                            results.push(MovementResult {
                                motor_id: m.motor_id,
                                steps_executed: 0,
                                limit_hit: true,
                            });
                        }
                        Some(Injected::Timeout) => return TransportResult::Timeout,
                        Some(Injected::IoError) => {
                            self.broken = true;
                            return TransportResult::IoError(std::io::Error::new(
                                std::io::ErrorKind::Other,
                                "injected I/O fault",
                            ));
                        }
                        None => {
                            self.apply_step(m.motor_id, m.steps, m.direction);
                            results.push(MovementResult {
                                motor_id: m.motor_id,
                                steps_executed: m.steps,
                                limit_hit: false,
                            });
                        }
                    }
                }
                TransportResult::Reply(Response::MoveBatchResult { results })
            }
            Request::GetLimits => {
                let limits = (1..=4u8)
                    .map(|motor_id| LimitState {
                        motor_id,
                        triggered: false,
                        pin: motor_id,
                    })
                    .collect();
                TransportResult::Reply(Response::Limits { limits })
            }
            Request::Stop { .. } | Request::StopAll => TransportResult::Reply(Response::Ok),
            Request::Ping => TransportResult::Reply(Response::Pong),
        }
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn reconnect(&mut self) -> std::io::Result<()> {
        self.broken = false;
        Ok(())
    }
}

impl SimulatedTransport {
    /// Build the `Step`-shaped reply for an injected fault. `MoveBatch`
    /// and `HomeMotor` have their own reply shapes and handle faults inline.
    fn fault_response(&mut self, fault: Injected) -> TransportResult {
        match fault {
            Injected::LimitHit => TransportResult::Reply(Response::StepResult {
                steps_executed: 0,
                limit_triggered: true,
            }),
            Injected::Timeout => TransportResult::Timeout,
            Injected::IoError => {
                self.broken = true;
                TransportResult::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected I/O fault",
                ))
            }
        }
    }
}
