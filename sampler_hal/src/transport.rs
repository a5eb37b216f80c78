//! Framed request/response channel to the MCU firmware (spec.md §4.1).
//!
//! Single-writer, single-reader, request/response strictly serialized at
//! this layer — callers must not pipeline. Follows an init/operate/
//! shutdown lifecycle, with each request framed as a newline-delimited
//! JSON object over the serial line.

use std::io::{BufRead, BufReader, Write};
use std::time::{Duration, Instant};

use sampler_common::consts::RECONNECT_BACKOFF_CAP_MS;
use serialport::SerialPort;

use crate::wire::{Request, Response};

/// Framed channel to the MCU (spec.md §4.1).
///
/// Implementors must serialize access themselves; the Motor Driver Client
/// relies on the caller (the Execution Controller's motion lock) to
/// guarantee at most one [`Transport::send_request`] in flight.
pub trait Transport: Send {
    /// Send one request frame and block for the matching reply, up to
    /// `timeout`.
    fn send_request(&mut self, request: &Request, timeout: Duration) -> TransportResult;

    /// Whether the channel is currently marked broken (spec.md §4.1:
    /// "subsequent calls fail-fast until a reconnect succeeds").
    fn is_broken(&self) -> bool;

    /// Attempt to reconnect. Returns `Ok(())` on success, leaving the
    /// channel usable again.
    fn reconnect(&mut self) -> std::io::Result<()>;
}

/// Outcome of a single [`Transport::send_request`] call.
#[derive(Debug)]
pub enum TransportResult {
    /// A reply frame was received before the timeout.
    Reply(Response),
    /// No reply arrived before `timeout` elapsed.
    Timeout,
    /// An I/O error occurred; the channel is now marked broken.
    IoError(std::io::Error),
}

/// Real serial-port transport (spec.md §6: "Baud 115200, 8N1").
pub struct SerialTransport {
    port_path: String,
    baud_rate: u32,
    port: Option<BufReader<Box<dyn SerialPort>>>,
    broken: bool,
    backoff: Duration,
}

impl SerialTransport {
    const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

    /// Open the serial port at `port_path`. The port is held open for the
    /// transport's lifetime; subsequent I/O errors mark it broken rather
    /// than closing it immediately.
    pub fn open(port_path: impl Into<String>, baud_rate: u32) -> std::io::Result<Self> {
        let port_path = port_path.into();
        let port = Self::open_port(&port_path, baud_rate)?;
        Ok(Self {
            port_path,
            baud_rate,
            port: Some(BufReader::new(port)),
            broken: false,
            backoff: Self::INITIAL_BACKOFF,
        })
    }

    fn open_port(port_path: &str, baud_rate: u32) -> std::io::Result<Box<dyn SerialPort>> {
        serialport::new(port_path, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    fn mark_broken(&mut self) {
        self.broken = true;
        self.port = None;
    }
}

impl Transport for SerialTransport {
    fn send_request(&mut self, request: &Request, timeout: Duration) -> TransportResult {
        if self.broken {
            return TransportResult::IoError(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport is broken, call reconnect() first",
            ));
        }
        let Some(reader) = self.port.as_mut() else {
            return TransportResult::IoError(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport has no open port",
            ));
        };

        let mut line = match serde_json::to_string(request) {
            Ok(s) => s,
            Err(e) => return TransportResult::IoError(e.into()),
        };
        line.push('\n');
        if let Err(e) = reader.get_mut().write_all(line.as_bytes()) {
            self.mark_broken();
            return TransportResult::IoError(e);
        }

        let deadline = Instant::now() + timeout;
        let mut buf = String::new();
        loop {
            buf.clear();
            match reader.read_line(&mut buf) {
                Ok(0) => {
                    self.mark_broken();
                    return TransportResult::IoError(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "MCU closed the connection",
                    ));
                }
                Ok(_) => {
                    let trimmed = buf.trim();
                    if trimmed.is_empty() {
                        if Instant::now() >= deadline {
                            return TransportResult::Timeout;
                        }
                        continue;
                    }
                    return match serde_json::from_str::<Response>(trimmed) {
                        Ok(resp) => TransportResult::Reply(resp),
                        Err(e) => TransportResult::IoError(e.into()),
                    };
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return TransportResult::Timeout;
                    }
                }
                Err(e) => {
                    self.mark_broken();
                    return TransportResult::IoError(e);
                }
            }
        }
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn reconnect(&mut self) -> std::io::Result<()> {
        match Self::open_port(&self.port_path, self.baud_rate) {
            Ok(port) => {
                self.port = Some(BufReader::new(port));
                self.broken = false;
                self.backoff = Self::INITIAL_BACKOFF;
                Ok(())
            }
            Err(e) => {
                let cap = Duration::from_millis(RECONNECT_BACKOFF_CAP_MS);
                self.backoff = (self.backoff * 2).min(cap);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_result_timeout_is_not_an_error() {
        let result = TransportResult::Timeout;
        assert!(matches!(result, TransportResult::Timeout));
    }
}
