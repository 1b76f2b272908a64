//! # Control Loop
//!
//! Polls device snapshots, turns button presses into arm commands and stops
//! when the servo loop can no longer be trusted.
//!
//! ## States
//!
//! ```text
//! Init ──> Polling ──┬──> Terminated     (scheduler/communication error)
//!                    └──> ExitRequested  (shutdown flag raised)
//! ```
//!
//! Each polling iteration:
//! 1. Take a snapshot
//! 2. On a rising button edge, map the angles and dispatch a command
//! 3. Report device errors; terminate on scheduler-class errors
//! 4. Remember the snapshot for the next edge check

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::edge::EdgeDetector;
use crate::arm::dispatcher::CommandDispatcher;
use crate::arm::mapper::map_angles;
use crate::arm::transport::CommandTransport;
use crate::servo::snapshot::Snapshot;
use crate::servo::state::SampledState;

/// Usage text printed when polling starts.
pub const USAGE: &str = "\
Press and release the stylus button to send the current stylus pose to the arm.
Press Ctrl+C to exit.
";

/// Control loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Polling,
    /// The servo loop or device link failed.
    Terminated,
    /// Shutdown was requested from outside.
    ExitRequested,
}

/// Outcome of [`ControlLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    /// Final state, `Terminated` or `ExitRequested`.
    pub state: LoopState,
    /// Commands dispatched (successfully or not).
    pub dispatched: u64,
    /// Polling iterations completed.
    pub iterations: u64,
}

/// Foreground loop turning stylus button presses into arm commands.
pub struct ControlLoop<S, T> {
    snapshots: S,
    dispatcher: CommandDispatcher<T>,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    output: Box<dyn Write + Send>,
    acknowledge: Box<dyn FnMut() + Send>,
}

impl<S: Snapshot, T: CommandTransport> ControlLoop<S, T> {
    /// Create a loop printing to stdout and waiting for Enter on fatal errors.
    pub fn new(snapshots: S, dispatcher: CommandDispatcher<T>) -> Self {
        Self {
            snapshots,
            dispatcher,
            poll_interval: Duration::ZERO,
            shutdown: Arc::new(AtomicBool::new(false)),
            output: Box::new(io::stdout()),
            acknowledge: Box::new(wait_for_enter),
        }
    }

    /// Sleep between iterations. Zero polls back to back.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Use an existing shutdown flag.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Redirect console output.
    #[must_use]
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Replace the "press Enter to quit" acknowledgment.
    #[must_use]
    pub fn with_acknowledge(mut self, acknowledge: impl FnMut() + Send + 'static) -> Self {
        self.acknowledge = Box::new(acknowledge);
        self
    }

    /// Flag that ends the loop with [`LoopState::ExitRequested`] when raised.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run until the servo loop fails or shutdown is requested.
    pub fn run(&mut self) -> LoopExit {
        let mut exit = LoopExit {
            state: LoopState::Init,
            dispatched: 0,
            iterations: 0,
        };

        let mut current = SampledState::default();
        if let Err(e) = self.snapshots.snapshot_into(&mut current) {
            error!("Failed to read the initial device state: {}", e);
            self.wait_for_acknowledgment();
            exit.state = LoopState::Terminated;
            return exit;
        }

        let mut edges = EdgeDetector::seeded(current);
        let _ = writeln!(self.output, "{}", USAGE);

        exit.state = LoopState::Polling;
        debug!("Control loop polling");

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                info!("Shutdown requested, leaving control loop");
                exit.state = LoopState::ExitRequested;
                break;
            }

            if let Err(e) = self.snapshots.snapshot_into(&mut current) {
                error!("Lost the servo scheduler: {}", e);
                self.wait_for_acknowledgment();
                exit.state = LoopState::Terminated;
                break;
            }

            if edges.is_rising(&current) {
                self.send_pose(&current);
                exit.dispatched += 1;
            }

            if current.error.is_error() {
                error!("Device error detected: {}", current.error);

                if current.error.is_scheduler_error() {
                    // Communication with the device was disrupted
                    self.wait_for_acknowledgment();
                    exit.state = LoopState::Terminated;
                    break;
                }
            }

            edges.store(current);
            exit.iterations += 1;

            if !self.poll_interval.is_zero() {
                thread::sleep(self.poll_interval);
            }
        }

        info!(
            "Control loop finished in state {:?} after {} iterations ({} commands)",
            exit.state, exit.iterations, exit.dispatched
        );
        exit
    }

    /// Map the snapshot to an arm command, print it and dispatch it.
    fn send_pose(&mut self, current: &SampledState) {
        let command = map_angles(&current.joint_angles, &current.gimbal_angles);
        debug!("Button pressed, arm command: {}", command);
        let [x, y, z] = current.position;

        let _ = writeln!(
            self.output,
            "Current position: ({}, {}, {})",
            format_g(x),
            format_g(y),
            format_g(z)
        );
        let _ = writeln!(
            self.output,
            "Current joint angles: ({}, {}, {})",
            command.base, command.shoulder, command.elbow
        );
        let _ = writeln!(
            self.output,
            "Current gimbal angles: ({}, {}, {})",
            command.wrist_vertical, command.wrist_rotate, command.grip
        );
        let _ = writeln!(self.output, "URL: {}", self.dispatcher.url(&command));

        if let Err(e) = self.dispatcher.dispatch(&command) {
            warn!("Failed to send arm command: {}", e);
        }
    }

    fn wait_for_acknowledgment(&mut self) {
        let _ = writeln!(self.output, "\nPress Enter to quit.");
        let _ = self.output.flush();
        (self.acknowledge)();
    }
}

/// Format like C's `%g`: six significant digits, trailing zeros dropped,
/// exponent notation below 1e-4 or from 1e6 up.
fn format_g(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Exponent after rounding to six significant digits
    let scientific = format!("{:.5e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..6).contains(&exponent) {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Block until a line is read from stdin (or stdin closes).
fn wait_for_enter() {
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::transport::MockCommandTransport;
    use crate::device::{ErrorCode, ErrorInfo};
    use crate::error::HapticBridgeError;
    use crate::servo::snapshot::mocks::ScriptedSnapshots;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Console output captured for assertions.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample(pressed: bool) -> SampledState {
        SampledState {
            button_pressed: pressed,
            ..Default::default()
        }
    }

    fn failing(pressed: bool, code: ErrorCode) -> SampledState {
        SampledState {
            button_pressed: pressed,
            error: ErrorInfo::new(code, 0),
            ..Default::default()
        }
    }

    /// Transport recording every URL it is asked to GET.
    fn recording_transport(expected: usize) -> (MockCommandTransport, Arc<Mutex<Vec<String>>>) {
        let urls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&urls);
        let mut transport = MockCommandTransport::new();
        transport
            .expect_get()
            .times(expected)
            .returning(move |url| {
                recorded.lock().unwrap().push(url.to_string());
                Ok(())
            });
        (transport, urls)
    }

    fn control_loop(
        snapshots: ScriptedSnapshots,
        transport: MockCommandTransport,
    ) -> (ControlLoop<ScriptedSnapshots, MockCommandTransport>, SharedBuffer, Arc<AtomicUsize>) {
        let output = SharedBuffer::default();
        let acks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&acks);
        let dispatcher = CommandDispatcher::new("192.168.3.14", 4200, transport);
        let control = ControlLoop::new(snapshots, dispatcher)
            .with_output(output.clone())
            .with_acknowledge(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        (control, output, acks)
    }

    #[test]
    fn test_two_presses_dispatch_twice() {
        let snapshots =
            ScriptedSnapshots::from_buttons(&[false, false, true, true, false, true]);
        let (transport, urls) = recording_transport(2);
        let (mut control, _, _) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.dispatched, 2);
        assert_eq!(exit.iterations, 5);
        assert_eq!(
            *urls.lock().unwrap(),
            vec![
                "http://192.168.3.14:4200/?command=10,90,90,0,90,90,25".to_string(),
                "http://192.168.3.14:4200/?command=10,90,90,0,90,90,25".to_string(),
            ]
        );
    }

    #[test]
    fn test_button_held_at_start_is_not_a_press() {
        let snapshots = ScriptedSnapshots::from_buttons(&[true, true, true]);
        let (transport, _) = recording_transport(0);
        let (mut control, _, _) = control_loop(snapshots, transport);

        assert_eq!(control.run().dispatched, 0);
    }

    #[test]
    fn test_command_uses_current_angles() {
        let pressed = SampledState {
            button_pressed: true,
            position: [12.5, -3.0, 40.0],
            joint_angles: [0.1, 0.2, 0.3],
            gimbal_angles: [-0.1, -0.2, 1.6],
            error: ErrorInfo::none(),
        };
        let snapshots = ScriptedSnapshots::new(vec![sample(false), pressed]);
        let (transport, urls) = recording_transport(1);
        let (mut control, output, _) = control_loop(snapshots, transport);

        control.run();

        assert_eq!(
            urls.lock().unwrap()[0],
            "http://192.168.3.14:4200/?command=10,95,101,17,84,78,41"
        );
        let printed = output.contents();
        assert!(printed.contains("Current position: (12.5, -3, 40)"));
        assert!(printed.contains("Current joint angles: (95, 101, 17)"));
        assert!(printed.contains("Current gimbal angles: (78, 84, 41)"));
        assert!(printed.contains("URL: http://192.168.3.14:4200/?command=10,95,101,17,84,78,41"));
    }

    #[test]
    fn test_position_printed_like_printf_g() {
        let pressed = SampledState {
            button_pressed: true,
            position: [0.1 + 0.2, 1234567.0, -0.00001234],
            ..Default::default()
        };
        let snapshots = ScriptedSnapshots::new(vec![sample(false), pressed]);
        let (transport, _) = recording_transport(1);
        let (mut control, output, _) = control_loop(snapshots, transport);

        control.run();

        assert!(output
            .contents()
            .contains("Current position: (0.3, 1.23457e+06, -1.234e-05)"));
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(12.5), "12.5");
        assert_eq!(format_g(-3.0), "-3");
        assert_eq!(format_g(123.456789), "123.457");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(999999.7), "1e+06");
        assert_eq!(format_g(100000.0), "100000");
        assert_eq!(format_g(f64::NAN), "nan");
        assert_eq!(format_g(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_usage_printed_once_after_init() {
        let snapshots = ScriptedSnapshots::from_buttons(&[false, false]);
        let (transport, _) = recording_transport(0);
        let (mut control, output, _) = control_loop(snapshots, transport);

        control.run();

        let printed = output.contents();
        assert_eq!(printed.matches("Press and release the stylus button").count(), 1);
        assert!(!printed.contains("hold"));
    }

    #[test]
    fn test_scheduler_error_terminates() {
        let snapshots = ScriptedSnapshots::new(vec![
            sample(false),
            failing(false, ErrorCode::CommError),
            sample(true),
            sample(false),
            sample(true),
        ]);
        let (transport, _) = recording_transport(0);
        let (mut control, output, acks) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.state, LoopState::Terminated);
        assert_eq!(exit.dispatched, 0);
        assert_eq!(acks.load(Ordering::SeqCst), 1);
        assert!(output.contents().contains("Press Enter to quit."));
    }

    #[test]
    fn test_press_with_scheduler_error_dispatches_then_terminates() {
        let snapshots = ScriptedSnapshots::new(vec![
            sample(false),
            failing(true, ErrorCode::TimerError),
            sample(false),
            sample(true),
        ]);
        let (transport, _) = recording_transport(1);
        let (mut control, _, _) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.state, LoopState::Terminated);
        assert_eq!(exit.dispatched, 1);
        assert_eq!(exit.iterations, 0);
    }

    #[test]
    fn test_recoverable_error_keeps_polling() {
        let snapshots = ScriptedSnapshots::new(vec![
            sample(false),
            failing(false, ErrorCode::DeviceFault),
            sample(true),
        ]);
        let (transport, _) = recording_transport(1);
        let (mut control, _, _) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.dispatched, 1);
        assert_eq!(exit.iterations, 2);
    }

    #[test]
    fn test_dispatch_failure_is_ignored() {
        let snapshots = ScriptedSnapshots::from_buttons(&[false, true, false, true]);
        let mut transport = MockCommandTransport::new();
        transport
            .expect_get()
            .times(2)
            .returning(|_| Err(HapticBridgeError::Dispatch("connection refused".to_string())));
        let (mut control, _, _) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.dispatched, 2);
        assert_eq!(exit.iterations, 3);
    }

    #[test]
    fn test_lost_scheduler_terminates_with_acknowledgment() {
        let snapshots = ScriptedSnapshots::from_buttons(&[false, false]);
        let (transport, _) = recording_transport(0);
        let (mut control, _, acks) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.state, LoopState::Terminated);
        assert_eq!(exit.iterations, 1);
        assert_eq!(acks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initial_snapshot_failure_terminates() {
        let snapshots = ScriptedSnapshots::new(Vec::new());
        let (transport, _) = recording_transport(0);
        let (mut control, output, acks) = control_loop(snapshots, transport);

        let exit = control.run();

        assert_eq!(exit.state, LoopState::Terminated);
        assert_eq!(acks.load(Ordering::SeqCst), 1);
        assert!(!output.contents().contains("Press and release"));
    }

    #[test]
    fn test_shutdown_flag_exits_without_acknowledgment() {
        let snapshots = ScriptedSnapshots::from_buttons(&[false, true, true]);
        let (transport, _) = recording_transport(0);
        let (control, _, acks) = control_loop(snapshots, transport);
        let shutdown = Arc::new(AtomicBool::new(true));
        let mut control = control.with_shutdown(Arc::clone(&shutdown));

        let exit = control.run();

        assert_eq!(exit.state, LoopState::ExitRequested);
        assert_eq!(exit.dispatched, 0);
        assert_eq!(acks.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&control.shutdown_handle(), &shutdown));
    }
}
