//! # Haptic Arm Bridge
//!
//! Drive a hobby robot arm from a 6-DOF haptic stylus.
//!
//! Pressing the stylus button sends the current stylus pose to the arm
//! controller over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use haptic_arm_bridge::arm::dispatcher::CommandDispatcher;
use haptic_arm_bridge::arm::transport::HttpTransport;
use haptic_arm_bridge::config::Config;
use haptic_arm_bridge::control::control_loop::{ControlLoop, LoopExit};
use haptic_arm_bridge::device::simulated::SimulatedDevice;
use haptic_arm_bridge::servo::sampler::Sampler;
use haptic_arm_bridge::session::HapticSession;

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Process exit code when the device or servo loop cannot be started
const EXIT_STARTUP_FAILURE: i32 = -1;

#[derive(Parser, Debug)]
#[command(name = "haptic-arm-bridge", version, about = "Drive a robot arm from a haptic stylus")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Arm controller host, overrides the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Arm controller port, overrides the configuration file
    #[arg(long)]
    port: Option<u16>,
}

/// Main entry point for the Haptic Arm Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and apply command line overrides
///    - Set up logging
///    - Initialize the device and start the servo loop
///
/// 2. **Control Loop**
///    - Runs on a blocking worker thread until the servo loop fails or
///      Ctrl+C is pressed
///
/// 3. **Shutdown**
///    - Stop the servo loop and disable the device
///
/// Exits with code -1 if the configuration is invalid or the device or servo
/// loop cannot be started, 0 otherwise.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}\n\nPress Enter to quit.", e);
            wait_for_enter();
            std::process::exit(EXIT_STARTUP_FAILURE);
        }
    };

    // Non-blocking writer keeps log output off the control path
    let (writer, log_guard) = tracing_appender::non_blocking(io::stderr());
    let level = config.logging.level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(writer)
        .init();

    info!("Haptic Arm Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let session = match start_session(&config) {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            // process::exit skips destructors; flush pending log lines first
            drop(log_guard);
            eprintln!("\nPress Enter to quit.");
            wait_for_enter();
            std::process::exit(EXIT_STARTUP_FAILURE);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut control = tokio::task::spawn_blocking({
        let shutdown = Arc::clone(&shutdown);
        let config = config.clone();
        move || run_control(session, &config, shutdown)
    });

    let outcome = tokio::select! {
        joined = &mut control => joined,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            shutdown.store(true, Ordering::Release);
            control.await
        }
    };

    let (session, exit) = outcome.context("control loop worker failed")??;
    info!(
        "Control loop finished in state {:?} after {} iterations, {} commands sent",
        exit.state, exit.iterations, exit.dispatched
    );

    let stats = session.stats();
    info!("Servo loop ran {} ticks ({} overruns)", stats.ticks, stats.overruns);

    if let Err(e) = session.shutdown() {
        warn!("{}", e);
    }

    Ok(())
}

/// Load the configuration file and apply command line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("failed to load {}", DEFAULT_CONFIG_PATH))?,
        None => Config::default(),
    };

    if let Some(host) = &args.host {
        config.command.host = host.clone();
    }
    if let Some(port) = args.port {
        config.command.port = port;
    }

    config.validate()?;
    Ok(config)
}

fn start_session(config: &Config) -> Result<HapticSession<SimulatedDevice>> {
    let device = SimulatedDevice::initialize(config.device.simulated_profile())
        .context("failed to initialize haptic device")?;

    let session = HapticSession::start(
        device,
        Sampler::new(config.device.button_mask),
        config.servo.rate_hz,
    )
    .context("failed to start servo loop")?;

    Ok(session)
}

/// Control loop body. Runs on a blocking thread because the HTTP client and
/// the snapshot requests both block.
fn run_control(
    session: HapticSession<SimulatedDevice>,
    config: &Config,
    shutdown: Arc<AtomicBool>,
) -> Result<(HapticSession<SimulatedDevice>, LoopExit)> {
    let transport = HttpTransport::new(Duration::from_millis(config.command.timeout_ms))?;
    let dispatcher = CommandDispatcher::with_code(
        config.command.host.clone(),
        config.command.port,
        config.command.code,
        transport,
    );
    info!("Sending arm commands to {:?}", dispatcher);

    let exit = ControlLoop::new(session.snapshotter(), dispatcher)
        .with_poll_interval(Duration::from_millis(config.control.poll_interval_ms))
        .with_shutdown(shutdown)
        .run();

    Ok((session, exit))
}

fn wait_for_enter() {
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
