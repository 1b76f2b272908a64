//! # Servo Scheduler
//!
//! Runs periodic callbacks at servo rate on a dedicated thread and executes
//! one-shot synchronous requests between two ticks.
//!
//! ## Ownership
//!
//! The scheduler owns a state value `S`. While running, `S` lives on the
//! servo thread and is only reachable from callbacks; after [`stop`] it is
//! parked back in the scheduler. There is no lock around `S`: periodic
//! callbacks and synchronous requests all execute on the servo thread, so
//! they can never overlap.
//!
//! ## Timing
//!
//! ```text
//!  tick ──┬── callbacks (priority order) ──┬── requests until next tick ──┐
//!         └────────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Between ticks the servo thread blocks on the request channel with the
//! next tick as deadline, so a synchronous request is serviced as soon as it
//! arrives without delaying the tick.
//!
//! [`stop`]: ServoScheduler::stop

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{HapticBridgeError, Result};

/// Name of the servo thread.
pub const SERVO_THREAD_NAME: &str = "haptic-servo";

/// Number of overruns between two overrun warnings.
const OVERRUN_LOG_EVERY: u64 = 1000;

/// Scheduling priority. Higher values run first within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u16);

impl Priority {
    /// Lowest priority, used for state snapshots.
    pub const MIN: Priority = Priority(0);
    /// Middle priority.
    pub const DEFAULT: Priority = Priority(u16::MAX / 2);
    /// Highest priority, used for the device sampler.
    pub const MAX: Priority = Priority(u16::MAX);
}

/// Returned by periodic callbacks to keep or drop themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackCode {
    /// Run again on the next tick.
    Continue,
    /// Unschedule after this run.
    Done,
}

/// Identifies a periodic callback for [`ServoScheduler::unschedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

/// Tick counters of a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServoStats {
    /// Ticks executed since creation.
    pub ticks: u64,
    /// Ticks that started more than one period late.
    pub overruns: u64,
}

/// Periodic callback signature.
pub type AsyncCallback<S> = Box<dyn FnMut(&mut S) -> CallbackCode + Send>;

type SyncJob<S> = Box<dyn FnOnce(&mut S) + Send>;

struct Scheduled<S> {
    handle: CallbackHandle,
    priority: Priority,
    callback: AsyncCallback<S>,
}

enum Request<S> {
    Add(Scheduled<S>),
    Remove(CallbackHandle),
    Sync { priority: Priority, job: SyncJob<S> },
    Stop,
}

/// State and callbacks while no servo thread is running.
struct Parked<S> {
    state: S,
    callbacks: Vec<Scheduled<S>>,
}

impl<S> Parked<S> {
    fn insert(&mut self, scheduled: Scheduled<S>) {
        self.callbacks.push(scheduled);
        // Stable: equal priorities keep scheduling order
        self.callbacks.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    fn remove(&mut self, handle: CallbackHandle) {
        self.callbacks.retain(|scheduled| scheduled.handle != handle);
    }

    fn tick(&mut self) {
        let state = &mut self.state;
        self.callbacks
            .retain_mut(|scheduled| (scheduled.callback)(state) == CallbackCode::Continue);
    }
}

struct Running<S> {
    requests: Sender<Request<S>>,
    thread: JoinHandle<Parked<S>>,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    overruns: AtomicU64,
}

/// Servo-rate scheduler owning a state value `S`.
///
/// # Examples
///
/// ```
/// use haptic_arm_bridge::servo::scheduler::{CallbackCode, Priority, ServoScheduler};
///
/// let mut scheduler = ServoScheduler::new(0u64, 1000);
/// scheduler.schedule_asynchronous(
///     |count: &mut u64| {
///         *count += 1;
///         CallbackCode::Continue
///     },
///     Priority::MAX,
/// )?;
/// scheduler.start()?;
///
/// let seen = scheduler.schedule_synchronous(|count: &mut u64| *count, Priority::MIN)?;
/// assert!(seen >= 1);
///
/// scheduler.stop()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ServoScheduler<S: Send + 'static> {
    rate_hz: u32,
    parked: Option<Parked<S>>,
    running: Option<Running<S>>,
    next_handle: u64,
    counters: Arc<Counters>,
}

impl<S: Send + 'static> std::fmt::Debug for ServoScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServoScheduler")
            .field("rate_hz", &self.rate_hz)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<S: Send + 'static> ServoScheduler<S> {
    /// Create a stopped scheduler owning `state`, ticking at `rate_hz` once started.
    pub fn new(state: S, rate_hz: u32) -> Self {
        Self {
            rate_hz,
            parked: Some(Parked {
                state,
                callbacks: Vec::new(),
            }),
            running: None,
            next_handle: 0,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Servo rate in Hz.
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Returns true between a successful `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Tick counters.
    pub fn stats(&self) -> ServoStats {
        ServoStats {
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
        }
    }

    /// Schedule a callback to run on every tick until it returns
    /// [`CallbackCode::Done`] or is unscheduled.
    ///
    /// Callbacks registered before `start` run from the first tick.
    ///
    /// # Errors
    ///
    /// Returns `Scheduler` if the servo thread is gone.
    pub fn schedule_asynchronous<F>(&mut self, callback: F, priority: Priority) -> Result<CallbackHandle>
    where
        F: FnMut(&mut S) -> CallbackCode + Send + 'static,
    {
        let handle = CallbackHandle(self.next_handle);
        self.next_handle += 1;

        let scheduled = Scheduled {
            handle,
            priority,
            callback: Box::new(callback),
        };

        match (&self.running, &mut self.parked) {
            (Some(running), _) => running
                .requests
                .send(Request::Add(scheduled))
                .map_err(|_| HapticBridgeError::Scheduler("servo thread is gone".to_string()))?,
            (None, Some(parked)) => parked.insert(scheduled),
            (None, None) => {
                return Err(HapticBridgeError::Scheduler(
                    "scheduler state was lost".to_string(),
                ))
            }
        }

        debug!("Scheduled periodic callback {:?} at priority {}", handle, priority.0);
        Ok(handle)
    }

    /// Remove a periodic callback. Unknown handles are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Scheduler` if the servo thread is gone.
    pub fn unschedule(&mut self, handle: CallbackHandle) -> Result<()> {
        if let Some(running) = &self.running {
            running
                .requests
                .send(Request::Remove(handle))
                .map_err(|_| HapticBridgeError::Scheduler("servo thread is gone".to_string()))?;
        } else if let Some(parked) = &mut self.parked {
            parked.remove(handle);
        }

        debug!("Unscheduled callback {:?}", handle);
        Ok(())
    }

    /// Run `callback` once on the servo thread between two ticks and wait
    /// for its result.
    ///
    /// # Errors
    ///
    /// - `SchedulerNotRunning`: the scheduler was not started
    /// - `Scheduler`: the servo thread exited before running the request
    pub fn schedule_synchronous<F, R>(&self, callback: F, priority: Priority) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let running = self
            .running
            .as_ref()
            .ok_or(HapticBridgeError::SchedulerNotRunning)?;

        let (reply_tx, reply_rx) = bounded(1);
        let job: SyncJob<S> = Box::new(move |state: &mut S| {
            // Waiter may have given up; nothing to report then
            let _ = reply_tx.send(callback(state));
        });

        running
            .requests
            .send(Request::Sync { priority, job })
            .map_err(|_| HapticBridgeError::Scheduler("servo thread is gone".to_string()))?;

        reply_rx.recv().map_err(|_| {
            HapticBridgeError::Scheduler(
                "servo thread exited before completing the request".to_string(),
            )
        })
    }

    /// Spawn the servo thread and start ticking.
    ///
    /// # Errors
    ///
    /// - `SchedulerAlreadyRunning`: `start` was already called
    /// - `Scheduler`: invalid rate, or the thread could not be spawned
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(HapticBridgeError::SchedulerAlreadyRunning);
        }

        if self.rate_hz == 0 {
            return Err(HapticBridgeError::Scheduler(
                "servo rate must be greater than 0".to_string(),
            ));
        }

        let parked = self
            .parked
            .take()
            .ok_or_else(|| HapticBridgeError::Scheduler("scheduler state was lost".to_string()))?;

        let (requests, receiver) = unbounded();
        let period = Duration::from_nanos(1_000_000_000 / u64::from(self.rate_hz));
        let counters = Arc::clone(&self.counters);

        let thread = thread::Builder::new()
            .name(SERVO_THREAD_NAME.to_string())
            .spawn(move || servo_loop(parked, receiver, period, counters))
            .map_err(|e| HapticBridgeError::Scheduler(format!("Failed to spawn servo thread: {}", e)))?;

        info!("Servo scheduler started at {}Hz", self.rate_hz);
        self.running = Some(Running { requests, thread });
        Ok(())
    }

    /// Stop ticking and join the servo thread. Stopping a stopped scheduler
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Scheduler` if the servo thread panicked; its state is lost.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The thread may already have exited; join tells us how
        let _ = running.requests.send(Request::Stop);

        match running.thread.join() {
            Ok(parked) => {
                self.parked = Some(parked);
                let stats = self.stats();
                info!(
                    "Servo scheduler stopped after {} ticks ({} overruns)",
                    stats.ticks, stats.overruns
                );
                Ok(())
            }
            Err(_) => Err(HapticBridgeError::Scheduler(
                "servo thread panicked".to_string(),
            )),
        }
    }

    /// Borrow the state while the scheduler is stopped.
    ///
    /// Returns `None` while running, or if the state was lost to a servo
    /// thread panic.
    pub fn state_mut(&mut self) -> Option<&mut S> {
        if self.running.is_some() {
            return None;
        }
        self.parked.as_mut().map(|parked| &mut parked.state)
    }

    /// Stop the scheduler and hand back the owned state.
    ///
    /// Returns `None` if the state was lost to a servo thread panic.
    pub fn into_state(mut self) -> Option<S> {
        if let Err(e) = self.stop() {
            warn!("{}", e);
        }
        self.parked.take().map(|parked| parked.state)
    }
}

impl<S: Send + 'static> Drop for ServoScheduler<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Servo scheduler did not stop cleanly: {}", e);
        }
    }
}

/// Body of the servo thread.
fn servo_loop<S>(
    mut parked: Parked<S>,
    requests: Receiver<Request<S>>,
    period: Duration,
    counters: Arc<Counters>,
) -> Parked<S> {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::{set_current_thread_priority, ThreadPriority};

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Servo thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set servo thread priority: {:?}. \
                On Linux, you may need to run with CAP_SYS_NICE.",
                e
            ),
        }
    }

    let mut next_tick = Instant::now();
    let mut batch = Vec::new();

    loop {
        let now = Instant::now();
        if now.saturating_duration_since(next_tick) > period {
            let overruns = counters.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            if overruns % OVERRUN_LOG_EVERY == 1 {
                warn!(
                    "Servo tick started {:?} late ({} overruns so far)",
                    now - next_tick,
                    overruns
                );
            }
            next_tick = now;
        }

        parked.tick();
        counters.ticks.fetch_add(1, Ordering::Relaxed);
        next_tick += period;

        loop {
            match requests.recv_deadline(next_tick) {
                Ok(first) => {
                    batch.push(first);
                    batch.extend(requests.try_iter());
                    if apply_requests(&mut parked, &mut batch) {
                        trace!("Servo thread received stop request");
                        return parked;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Scheduler dropped, servo thread exiting");
                    return parked;
                }
            }
        }
    }
}

/// Apply a batch of requests. Synchronous jobs run after registration
/// changes, highest priority first. Returns true if a stop was requested.
fn apply_requests<S>(parked: &mut Parked<S>, batch: &mut Vec<Request<S>>) -> bool {
    let mut stop = false;
    let mut jobs = Vec::new();

    for request in batch.drain(..) {
        match request {
            Request::Add(scheduled) => parked.insert(scheduled),
            Request::Remove(handle) => parked.remove(handle),
            Request::Sync { priority, job } => jobs.push((priority, job)),
            Request::Stop => stop = true,
        }
    }

    jobs.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, job) in jobs {
        job(&mut parked.state);
    }

    stop
}
