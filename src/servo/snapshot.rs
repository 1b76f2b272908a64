//! # State Snapshotter
//!
//! Copies the latest [`SampledState`] off the servo thread.
//!
//! The copy is a synchronous scheduler request at minimum priority. It runs
//! on the servo thread between two sampler ticks, so every snapshot holds
//! fields from exactly one tick.

use super::sampler::ServoState;
use super::scheduler::{Priority, ServoScheduler};
use super::state::SampledState;
use crate::device::HapticDevice;
use crate::error::Result;

/// Something that can hand out consistent copies of the sampled state.
///
/// The control loop depends on this trait rather than on the scheduler, so
/// it can be driven from a scripted source in tests.
pub trait Snapshot {
    /// Copy the latest sampled state into `out`.
    fn snapshot_into(&mut self, out: &mut SampledState) -> Result<()>;
}

/// Scheduler-backed [`Snapshot`] source.
pub struct StateSnapshotter<'a, D: HapticDevice + 'static> {
    scheduler: &'a ServoScheduler<ServoState<D>>,
}

impl<'a, D: HapticDevice + 'static> StateSnapshotter<'a, D> {
    pub fn new(scheduler: &'a ServoScheduler<ServoState<D>>) -> Self {
        Self { scheduler }
    }
}

impl<D: HapticDevice + 'static> Snapshot for StateSnapshotter<'_, D> {
    /// # Errors
    ///
    /// Returns the scheduler error if the servo thread is not running.
    fn snapshot_into(&mut self, out: &mut SampledState) -> Result<()> {
        *out = self
            .scheduler
            .schedule_synchronous(|state: &mut ServoState<D>| state.sampled(), Priority::MIN)?;
        Ok(())
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::HapticBridgeError;
    use std::collections::VecDeque;

    /// Scripted snapshot source.
    ///
    /// Hands out the scripted states in order; once exhausted every further
    /// snapshot fails like a lost scheduler.
    pub struct ScriptedSnapshots {
        pub states: VecDeque<SampledState>,
        pub taken: usize,
    }

    impl ScriptedSnapshots {
        pub fn new(states: Vec<SampledState>) -> Self {
            Self {
                states: states.into_iter().collect(),
                taken: 0,
            }
        }

        /// One state per entry of `buttons`, other fields zeroed.
        pub fn from_buttons(buttons: &[bool]) -> Self {
            Self::new(
                buttons
                    .iter()
                    .map(|&pressed| SampledState {
                        button_pressed: pressed,
                        ..Default::default()
                    })
                    .collect(),
            )
        }
    }

    impl Snapshot for ScriptedSnapshots {
        fn snapshot_into(&mut self, out: &mut SampledState) -> Result<()> {
            match self.states.pop_front() {
                Some(state) => {
                    self.taken += 1;
                    *out = state;
                    Ok(())
                }
                None => Err(HapticBridgeError::Scheduler("script exhausted".to_string())),
            }
        }
    }
}
