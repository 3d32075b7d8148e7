use std::time::Duration;

use crate::audio::AudioSink;
use crate::compositor::Compositor;
use crate::error::{Failure, LoopError};
use crate::vsync::VsyncDriver;

/// Teardown steps in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    StopVsync,
    ResetAudio,
    CloseAudio,
    DestroyWindow,
    ReleaseScratch,
    ReleaseDisplay,
}

/// Runs every teardown step regardless of earlier failures and collects what went
/// wrong, starting with whatever ended the loop.
pub struct ShutdownCascade {
    causes: Vec<Failure>,
    completed: Vec<Stage>,
}

impl ShutdownCascade {
    /// `failures` are what the loop hit before teardown, the one that ended it first.
    pub fn new(failures: Vec<Failure>) -> Self {
        if let Some((trigger, rest)) = failures.split_first() {
            log::error!("Shutting down after failure: {trigger}");
            for failure in rest {
                log::warn!("Also failed before shutdown: {failure}");
            }
        }
        Self {
            causes: failures,
            completed: Vec::new(),
        }
    }

    pub fn run<F>(&mut self, stage: Stage, step: F)
    where
        F: FnOnce() -> Result<(), Failure>,
    {
        debug_assert!(
            self.completed.last().is_none_or(|last| *last < stage),
            "{stage:?} out of order"
        );
        match step() {
            Ok(()) => log::debug!("Shutdown step {stage:?} done"),
            Err(failure) => {
                log::warn!("Shutdown step {stage:?} failed: {failure}");
                self.causes.push(failure);
            }
        }
        self.completed.push(stage);
    }

    /// Steps attempted so far.
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    pub fn finish(self) -> Result<(), LoopError> {
        match LoopError::from_causes(self.causes) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Everything the loop acquired. `W` and `D` are released by dropping them.
pub struct Teardown<A, W, D> {
    pub vsync: Option<VsyncDriver>,
    pub audio: Option<A>,
    pub window: Option<W>,
    pub compositor: Option<Compositor>,
    pub display: Option<D>,
}

impl<A: AudioSink, W, D> Teardown<A, W, D> {
    /// Releases whatever is present, one [`Stage`] at a time. Absent resources skip
    /// their stages.
    pub fn run(self, cascade: &mut ShutdownCascade, poll_interval: Duration, poll_limit: u32) {
        let Teardown { vsync, audio, window, compositor, display } = self;

        if let Some(mut driver) = vsync {
            cascade.run(Stage::StopVsync, || {
                driver.stop(poll_interval, poll_limit).map_err(Failure::StopVsync)
            });
        }
        if let Some(mut audio) = audio {
            cascade.run(Stage::ResetAudio, || audio.reset().map_err(Failure::ResetAudio));
            cascade.run(Stage::CloseAudio, || audio.close().map_err(Failure::CloseAudio));
        }
        if let Some(window) = window {
            cascade.run(Stage::DestroyWindow, || {
                drop(window);
                Ok(())
            });
        }
        if let Some(mut compositor) = compositor {
            cascade.run(Stage::ReleaseScratch, || {
                compositor.release();
                Ok(())
            });
        }
        if let Some(display) = display {
            cascade.run(Stage::ReleaseDisplay, || {
                drop(display);
                Ok(())
            });
        }
    }
}
