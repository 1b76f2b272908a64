//! # Haptic Session
//!
//! Owns the device for the lifetime of the process.
//!
//! A session moves the device onto the servo thread, schedules the sampler
//! at maximum priority and starts the scheduler. Teardown reverses those
//! steps and disables the device exactly once, either through
//! [`HapticSession::shutdown`] or when the session is dropped.

use tracing::{info, warn};

use crate::device::HapticDevice;
use crate::error::{HapticBridgeError, Result};
use crate::servo::sampler::{Sampler, ServoState};
use crate::servo::scheduler::{CallbackHandle, Priority, ServoScheduler, ServoStats};
use crate::servo::snapshot::StateSnapshotter;

/// Running device + servo loop.
pub struct HapticSession<D: HapticDevice + 'static> {
    scheduler: ServoScheduler<ServoState<D>>,
    sampler_handle: CallbackHandle,
    released: bool,
}

impl<D: HapticDevice + 'static> std::fmt::Debug for HapticSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticSession")
            .field("scheduler", &self.scheduler)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<D: HapticDevice + 'static> HapticSession<D> {
    /// Start sampling `device` at `rate_hz`.
    ///
    /// # Errors
    ///
    /// Returns the scheduler error if the servo loop cannot be started. The
    /// device is disabled before returning.
    pub fn start(device: D, sampler: Sampler, rate_hz: u32) -> Result<Self> {
        info!("Starting servo loop for {} at {}Hz", device.name(), rate_hz);

        let mut scheduler = ServoScheduler::new(ServoState::new(device), rate_hz);
        let sampler_handle = scheduler.schedule_asynchronous(
            move |state: &mut ServoState<D>| sampler.tick(state),
            Priority::MAX,
        )?;

        if let Err(e) = scheduler.start() {
            if let Some(state) = scheduler.state_mut() {
                state.device_mut().disable();
            }
            return Err(e);
        }

        Ok(Self {
            scheduler,
            sampler_handle,
            released: false,
        })
    }

    /// Snapshot source for the control loop.
    pub fn snapshotter(&self) -> StateSnapshotter<'_, D> {
        StateSnapshotter::new(&self.scheduler)
    }

    /// Servo tick counters.
    pub fn stats(&self) -> ServoStats {
        self.scheduler.stats()
    }

    /// Stop the servo loop, unschedule the sampler and disable the device.
    ///
    /// # Errors
    ///
    /// Returns `Scheduler` if the servo thread panicked. The device cannot
    /// be disabled in that case because it was lost with the thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let stopped = self.scheduler.stop();
        self.scheduler.unschedule(self.sampler_handle)?;
        stopped?;

        let state = self.scheduler.state_mut().ok_or_else(|| {
            HapticBridgeError::Scheduler("device was lost with the servo thread".to_string())
        })?;

        let device = state.device_mut();
        device.disable();
        info!("Device {} disabled", device.name());
        Ok(())
    }
}

impl<D: HapticDevice + 'static> Drop for HapticSession<D> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Session teardown failed: {}", e);
        }
    }
}
