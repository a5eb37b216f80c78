//! # Sampler
//!
//! Process entry point for the pipetting execution engine (spec.md §5,
//! §6). Wires Transport → Motor Driver Client → Pipetting Executor →
//! Execution Controller, then serves a newline-delimited JSON request
//! loop over stdin/stdout using [`sampler_api::dispatch`] — the thin
//! stand-in for the REST front end spec.md §6 describes. Terminating
//! that contract in an actual HTTP server is out of this repo's scope.
//!
//! # Usage
//!
//! ```bash
//! # Real hardware
//! sampler --config /etc/sampler/sampler.conf --port /dev/ttyACM0
//!
//! # In-process simulated MCU
//! sampler --config sampler.conf --simulate
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use sampler_common::axis::Axis;
use sampler_common::config::ConfigRegistry;
use sampler_controller::ExecutionController;
use sampler_executor::{PipettingExecutor, PositionTracker};
use sampler_hal::driver::{MotorDriverClient, MotorError};
use sampler_hal::sim::SimulatedTransport;
use sampler_hal::transport::{SerialTransport, Transport};

/// Sampler — pipetting execution engine process.
#[derive(Parser, Debug)]
#[command(name = "sampler")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Pipetting execution engine: drives the MCU, serves the status/control surface")]
struct Args {
    /// Path to the sampler configuration file (`KEY=value` lines, spec.md §4.7)
    #[arg(short, long, default_value = "/etc/sampler/sampler.conf")]
    config: PathBuf,

    /// Serial port the MCU firmware is attached to
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Baud rate for the serial link (spec.md §6: "Baud 115200, 8N1")
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Run against an in-process simulated MCU instead of real hardware
    #[arg(short, long)]
    simulate: bool,

    /// Enable verbose (DEBUG) logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

/// Fixed pulse/direction/limit GPIO pin assignment per axis, indexed by
/// `Axis::index()`. Matches the evaluation board wiring; not a
/// Configuration Registry concern since spec.md §4.7's recognized keys
/// are all motion parameters, not pinout.
const AXIS_PINS: [(u8, u8, u8); 4] = [(2, 3, 4), (5, 6, 7), (8, 9, 10), (11, 12, 13)];

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: i32) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Install `SIGINT`/`SIGTERM` handlers that flip [`SHUTDOWN`], read by
/// [`run_request_loop`] between requests.
fn install_signal_handlers() -> nix::Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let action = SigAction::new(SigHandler::Handler(request_shutdown), SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

fn init_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn init_motors<T: Transport>(driver: &mut MotorDriverClient<T>) -> Result<(), MotorError> {
    for axis in Axis::HOMING_ORDER {
        let (pulse, dir, limit) = AXIS_PINS[axis.index()];
        driver.init(axis.motor_id(), pulse, dir, limit)?;
    }
    Ok(())
}

fn build_controller<T: Transport + 'static>(
    transport: T,
    config: ConfigRegistry,
) -> Result<ExecutionController<T>, Box<dyn std::error::Error>> {
    let mut driver = MotorDriverClient::new(transport);
    init_motors(&mut driver)?;
    let executor = PipettingExecutor::new(driver, PositionTracker::new(), config.current());
    Ok(ExecutionController::new(executor, config))
}

fn write_response(stdout: &mut io::Stdout, response: &sampler_api::ApiResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            let _ = writeln!(stdout, "{line}");
            let _ = stdout.flush();
        }
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}

/// Read one [`sampler_api::ApiRequest`] per stdin line, dispatch it, and
/// write one [`sampler_api::ApiResponse`] per stdout line, until stdin
/// closes or a shutdown signal arrives. A blocking `read` can still be
/// mid-syscall when the signal lands, so the flag is only guaranteed to
/// be observed between lines, not instantly.
fn run_request_loop<T: Transport + 'static>(controller: ExecutionController<T>, config_path: PathBuf) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        if SHUTDOWN.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "stdin read interrupted");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: sampler_api::ApiRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                write_response(
                    &mut stdout,
                    &sampler_api::ApiResponse {
                        status: 400,
                        body: sampler_api::ApiOutcome::Error {
                            code: 400,
                            message: format!("malformed request: {e}"),
                        },
                    },
                );
                continue;
            }
        };

        let response = sampler_api::dispatch(&controller, &config_path, request);
        write_response(&mut stdout, &response);
    }

    info!("request loop exiting, requesting controller stop");
    controller.stop();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args);
    install_signal_handlers()?;

    info!(config = %args.config.display(), simulate = args.simulate, "sampler starting");

    let config = ConfigRegistry::load(&args.config)?;
    let config_path = args.config.clone();

    if args.simulate {
        info!("simulated MCU transport selected");
        let controller = build_controller(SimulatedTransport::new(), config)?;
        run_request_loop(controller, config_path);
    } else {
        info!(port = %args.port, baud = args.baud, "opening serial transport");
        let transport = SerialTransport::open(&args.port, args.baud)?;
        let controller = build_controller(transport, config)?;
        run_request_loop(controller, config_path);
    }

    info!("sampler shutdown complete");
    Ok(())
}
