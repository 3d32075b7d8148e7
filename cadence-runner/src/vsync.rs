//! Dedicated thread that waits for display frames and asks the UI thread to redraw.
//!
//! The worker only looks for a stop request between frames, so stopping takes up to
//! one frame interval after the request.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VsyncError {
    #[error("frame wait failed: {0}")]
    Wait(String),

    #[error("redraw request failed: {0}")]
    Notify(String),

    #[error("refresh rate {0} Hz is not usable")]
    RefreshRate(f64),

    #[error("thread still running after {0} polls")]
    Timeout(u32),

    #[error("thread panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VsyncState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Blocks until the next frame should be drawn.
pub trait FramePacer: Send + 'static {
    fn wait_for_frame(&mut self) -> Result<(), VsyncError>;
}

/// Tells the UI thread a redraw is due. Must not wait for the redraw itself.
pub trait RedrawNotifier: Send + 'static {
    fn notify(&self) -> Result<(), VsyncError>;
}

struct Shared {
    state: VsyncState,
    error: Option<VsyncError>,
}

pub struct VsyncDriver {
    shared: Arc<Mutex<Shared>>,
    worker: Option<JoinHandle<()>>,
}

impl VsyncDriver {
    pub fn spawn<P: FramePacer, N: RedrawNotifier>(pacer: P, notifier: N) -> std::io::Result<Self> {
        let shared = Arc::new(Mutex::new(Shared {
            state: VsyncState::Starting,
            error: None,
        }));

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("vsync".into())
            .spawn(move || run_worker(pacer, notifier, &worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> VsyncState {
        self.shared.lock().state
    }

    /// The error that stopped the worker, if any. Taken errors are not reported again
    /// by [`VsyncDriver::stop`].
    pub fn take_error(&self) -> Option<VsyncError> {
        self.shared.lock().error.take()
    }

    /// Requests a stop and polls every `interval`, at most `limit` times, until the
    /// worker reports it has stopped. On timeout the worker is left detached.
    pub fn stop(&mut self, interval: Duration, limit: u32) -> Result<(), VsyncError> {
        {
            let mut shared = self.shared.lock();
            if shared.state != VsyncState::Stopped {
                shared.state = VsyncState::Stopping;
            }
        }

        let mut polls = 0;
        while self.state() != VsyncState::Stopped {
            if polls == limit {
                self.worker = None;
                return Err(VsyncError::Timeout(limit));
            }
            thread::sleep(interval);
            polls += 1;
        }

        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| VsyncError::Panicked)?;
        }

        match self.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for VsyncDriver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let mut shared = self.shared.lock();
            if shared.state != VsyncState::Stopped {
                shared.state = VsyncState::Stopping;
            }
        }
    }
}

fn run_worker<P: FramePacer, N: RedrawNotifier>(mut pacer: P, notifier: N, shared: &Mutex<Shared>) {
    {
        let mut shared = shared.lock();
        if shared.state == VsyncState::Starting {
            shared.state = VsyncState::Running;
        }
    }

    loop {
        {
            let mut shared = shared.lock();
            if shared.state == VsyncState::Stopping {
                shared.state = VsyncState::Stopped;
                return;
            }
        }

        if let Err(e) = pacer.wait_for_frame().and_then(|()| notifier.notify()) {
            log::error!("VSync thread stopping: {e}");
            let mut shared = shared.lock();
            shared.error = Some(e);
            shared.state = VsyncState::Stopped;
            return;
        }
    }
}

/// Paces frames from a fixed refresh rate, catching up without bursting when it
/// falls behind.
pub struct IntervalPacer {
    period: Duration,
    next: Option<Instant>,
}

impl IntervalPacer {
    pub fn from_refresh_hz(hz: f64) -> Result<Self, VsyncError> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(VsyncError::RefreshRate(hz));
        }
        Ok(Self {
            period: Duration::from_secs_f64(1.0 / hz),
            next: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FramePacer for IntervalPacer {
    fn wait_for_frame(&mut self) -> Result<(), VsyncError> {
        let now = Instant::now();
        let deadline = self.next.unwrap_or(now + self.period);
        if deadline > now {
            thread::sleep(deadline - now);
        }

        let after = Instant::now();
        let next = deadline + self.period;
        self.next = Some(if next < after { after + self.period } else { next });
        Ok(())
    }
}
