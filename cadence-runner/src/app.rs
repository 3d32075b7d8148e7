use std::sync::Arc;
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy, OwnedDisplayHandle};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId, WindowLevel};

use crate::audio::{AudioSink, CpalSink, TickScheduler};
use crate::compositor::{Compositor, CompositorMode};
use crate::config::LoopConfig;
use crate::error::{append_failure, Failure, LoopError};
use crate::geometry::{track_limits, Geometry, Insets, ResizeSnap};
use crate::host::Host;
use crate::input::{HeldKeySet, PointerTracker};
use crate::shutdown::{ShutdownCascade, Teardown};
use crate::surface::SoftbufferPresenter;
use crate::vsync::{IntervalPacer, RedrawNotifier, VsyncDriver, VsyncError, VsyncState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowDirective {
    #[default]
    Normal,
    Hidden,
    Minimized,
    Maximized,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub title: String,
    pub ticks_per_second: u32,
    pub show: ShowDirective,
}

impl LoopSettings {
    /// Checks the settings against the host's buffers, returning the audio sample rate.
    pub fn validate<H: Host + ?Sized>(&self, host: &H) -> Result<u32, Failure> {
        if self.ticks_per_second == 0 {
            return Err(Failure::Settings("ticks per second must be at least 1".into()));
        }
        host.framebuffer().validate().map_err(Failure::Settings)?;
        host.audio().validate().map_err(Failure::Settings)?;

        u32::try_from(host.audio().samples_per_tick())
            .ok()
            .and_then(|spt| spt.checked_mul(self.ticks_per_second))
            .ok_or_else(|| {
                Failure::Settings(format!(
                    "{} samples per tick at {} ticks per second is not a usable sample rate",
                    host.audio().samples_per_tick(),
                    self.ticks_per_second
                ))
            })
    }
}

#[derive(Debug)]
pub enum UserEvent {
    /// The audio device finished playing a slot.
    AudioDone(usize),
    AudioFault(String),
    /// A display frame is due.
    Redraw,
}

struct ProxyNotifier(EventLoopProxy<UserEvent>);

impl RedrawNotifier for ProxyNotifier {
    fn notify(&self) -> Result<(), VsyncError> {
        self.0
            .send_event(UserEvent::Redraw)
            .map_err(|_| VsyncError::Notify("event loop closed".into()))
    }
}

/// Runs `host` until its window is closed or something fails. Every resource that was
/// acquired is torn down before returning, whatever happened.
pub fn run<H: Host>(settings: LoopSettings, config: LoopConfig, host: H) -> Result<(), LoopError> {
    let sample_rate = settings.validate(&host)?;

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .map_err(|e| Failure::EventLoop(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut runner = Runner::new(settings, config, host, sample_rate, event_loop.create_proxy());
    let loop_failure = event_loop
        .run_app(&mut runner)
        .err()
        .map(|e| Failure::EventLoop(e.to_string()));

    match (runner.outcome.take(), loop_failure) {
        (Some(outcome), None) => outcome,
        // Teardown already ran; the loop failed after it.
        (Some(outcome), Some(failure)) => {
            log::error!("{failure}");
            append_failure(outcome, failure)
        }
        (None, failure) => {
            if let Some(failure) = failure {
                runner.record(failure);
            }
            runner.shut_down()
        }
    }
}

struct Runner<H: Host> {
    settings: LoopSettings,
    config: LoopConfig,
    host: H,
    proxy: EventLoopProxy<UserEvent>,

    rows: usize,
    columns: usize,
    samples_per_tick: usize,
    sample_rate: u32,
    mode: CompositorMode,

    // Resources, in acquisition order.
    context: Option<softbuffer::Context<OwnedDisplayHandle>>,
    window: Option<Arc<Window>>,
    presenter: Option<SoftbufferPresenter>,
    compositor: Option<Compositor>,
    audio: Option<CpalSink>,
    vsync: Option<VsyncDriver>,

    scheduler: TickScheduler,
    geometry: Geometry,
    client_size: (u32, u32),
    snap: ResizeSnap,
    window_position: (i32, i32),
    keys: HeldKeySet,
    pointer: PointerTracker,
    suspended: bool,

    started: bool,
    /// The first entry ended the loop.
    failures: Vec<Failure>,
    outcome: Option<Result<(), LoopError>>,
}

impl<H: Host> Runner<H> {
    fn new(settings: LoopSettings, config: LoopConfig, host: H, sample_rate: u32, proxy: EventLoopProxy<UserEvent>) -> Self {
        let framebuffer = host.framebuffer();
        let (rows, columns) = (framebuffer.rows(), framebuffer.columns());
        let mode = if framebuffer.is_layered() { CompositorMode::Layered } else { CompositorMode::Opaque };
        let samples_per_tick = host.audio().samples_per_tick();
        let scheduler = TickScheduler::new(settings.ticks_per_second, samples_per_tick);

        Self {
            settings,
            config,
            host,
            proxy,
            rows,
            columns,
            samples_per_tick,
            sample_rate,
            mode,
            context: None,
            window: None,
            presenter: None,
            compositor: None,
            audio: None,
            vsync: None,
            scheduler,
            geometry: Geometry::stretched(columns as u32, rows as u32),
            client_size: (columns as u32, rows as u32),
            snap: ResizeSnap::default(),
            window_position: (0, 0),
            keys: HeldKeySet::new(),
            pointer: PointerTracker::default(),
            suspended: false,
            started: false,
            failures: Vec::new(),
            outcome: None,
        }
    }

    fn record(&mut self, failure: Failure) {
        if self.failures.is_empty() {
            log::error!("{failure}");
        } else {
            log::warn!("Follow-up failure: {failure}");
        }
        self.failures.push(failure);
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, failure: Failure) {
        self.record(failure);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Failure> {
        let content = PhysicalSize::new(self.columns as u32, self.rows as u32);
        let mut attributes = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(content)
            .with_min_inner_size(content)
            .with_visible(false);
        if self.mode == CompositorMode::Layered {
            attributes = attributes
                .with_transparent(true)
                .with_decorations(false)
                .with_window_level(WindowLevel::AlwaysOnTop);
        }

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| Failure::CreateWindow(e.to_string()))?,
        );
        self.window = Some(window.clone());

        let context = softbuffer::Context::new(event_loop.owned_display_handle())
            .map_err(|e| Failure::CreateSurface(e.to_string()))?;
        let presenter = SoftbufferPresenter::new(&context, window.clone()).map_err(Failure::CreateSurface)?;
        self.context = Some(context);
        self.presenter = Some(presenter);

        let insets = window_insets(&window);
        if self.mode == CompositorMode::Opaque {
            self.apply_track_limits(&window, insets);
        }
        self.pointer = match self.mode {
            CompositorMode::Layered => PointerTracker::new(insets),
            CompositorMode::Opaque => PointerTracker::default(),
        };
        self.window_position = window.outer_position().map(|p| (p.x, p.y)).unwrap_or_default();
        let size = window.inner_size();
        self.update_geometry(size.width, size.height);
        self.compositor = Some(Compositor::new(self.host.framebuffer(), &self.config));

        let done = self.proxy.clone();
        let fault = self.proxy.clone();
        let audio = CpalSink::open(
            self.sample_rate,
            self.samples_per_tick,
            self.scheduler.ring().len(),
            move |slot| {
                let _ = done.send_event(UserEvent::AudioDone(slot));
            },
            move |message| {
                let _ = fault.send_event(UserEvent::AudioFault(message));
            },
        )
        .map_err(Failure::OpenAudio)?;
        let audio = self.audio.insert(audio);
        audio.pause().map_err(Failure::PauseAudio)?;

        self.scheduler.prime(&mut self.host, &self.keys, audio)?;

        let refresh_hz = window
            .current_monitor()
            .and_then(|monitor| monitor.refresh_rate_millihertz())
            .map(|mhz| mhz as f64 / 1000.0)
            .unwrap_or(self.config.fallback_refresh_hz);
        let pacer = IntervalPacer::from_refresh_hz(refresh_hz).map_err(|e| Failure::SpawnVsync(e.to_string()))?;
        let driver = VsyncDriver::spawn(pacer, ProxyNotifier(self.proxy.clone()))
            .map_err(|e| Failure::SpawnVsync(e.to_string()))?;
        self.vsync = Some(driver);

        match self.settings.show {
            ShowDirective::Hidden => {}
            ShowDirective::Normal => window.set_visible(true),
            ShowDirective::Minimized => {
                window.set_visible(true);
                window.set_minimized(true);
            }
            ShowDirective::Maximized => {
                window.set_visible(true);
                window.set_maximized(true);
            }
        }

        if let Some(audio) = self.audio.as_mut() {
            self.scheduler.start(audio)?;
        }

        log::info!(
            "Loop running: {}x{} viewport, {:?} compositing, {} ticks/s, {} audio slots, {:.2} Hz vsync",
            self.columns,
            self.rows,
            self.mode,
            self.settings.ticks_per_second,
            self.scheduler.ring().len(),
            refresh_hz
        );
        window.request_redraw();
        Ok(())
    }

    fn apply_track_limits(&self, window: &Window, insets: Insets) {
        let Some(monitor) = window.current_monitor() else {
            return;
        };
        let system = monitor.size();
        match track_limits(self.rows, self.columns, insets, (system.width as i32, system.height as i32)) {
            Some(limits) => {
                let inner = |(w, h): (i32, i32)| {
                    PhysicalSize::new((w - insets.horizontal()) as u32, (h - insets.vertical()) as u32)
                };
                window.set_min_inner_size(Some(inner(limits.min)));
                window.set_max_inner_size(Some(inner(limits.max)));
            }
            None => log::debug!("No usable maximum window size for this monitor"),
        }
    }

    fn update_geometry(&mut self, width: u32, height: u32) {
        self.client_size = (width, height);
        self.geometry = match self.mode {
            CompositorMode::Opaque => Geometry::letterbox(width, height, self.rows, self.columns),
            CompositorMode::Layered => Geometry::stretched(width, height),
        };
        self.pointer.refresh(&self.geometry, self.rows, self.columns);
        log::debug!("Client {}x{} -> {:?}", width, height, self.geometry);
    }

    fn resized(&mut self, size: PhysicalSize<u32>) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let locked = aspect_locked(self.mode, window.is_maximized(), window.fullscreen().is_some());
        let snap = self
            .snap
            .on_resize(self.client_size, (size.width, size.height), locked, self.rows, self.columns);
        if let Some((width, height)) = snap {
            let _ = window.request_inner_size(PhysicalSize::new(width, height));
        }

        self.update_geometry(size.width, size.height);
        window.request_redraw();
    }

    fn redraw(&mut self) -> Result<(), Failure> {
        let (Some(compositor), Some(presenter)) = (self.compositor.as_mut(), self.presenter.as_mut()) else {
            return Ok(());
        };

        let progress = match self.audio.as_mut() {
            Some(audio) => {
                if self.suspended {
                    audio.restart().map_err(Failure::RestartAudio)?;
                    self.suspended = false;
                    log::debug!("Audio resumed");
                }
                self.scheduler.progress(&*audio)?
            }
            None => 0.0,
        };

        compositor
            .redraw(
                &mut self.host,
                self.pointer.current(),
                &self.keys,
                progress,
                &self.geometry,
                self.window_position,
                presenter,
            )
            .map_err(Failure::Present)
    }

    fn suspend_audio(&mut self) -> Result<(), Failure> {
        if self.suspended || !self.config.suspend_when_occluded || !self.scheduler.clock().is_started() {
            return Ok(());
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.pause().map_err(Failure::PauseAudio)?;
            self.suspended = true;
            log::debug!("Audio suspended while occluded");
        }
        Ok(())
    }

    fn audio_done(&mut self, slot: usize) -> Result<(), Failure> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };
        self.scheduler
            .on_buffer_done(slot, &mut self.host, self.pointer.current(), &self.keys, audio)
    }

    fn shut_down(&mut self) -> Result<(), LoopError> {
        let mut cascade = ShutdownCascade::new(std::mem::take(&mut self.failures));
        let teardown = Teardown {
            vsync: self.vsync.take(),
            audio: self.audio.take(),
            // The surface goes before the window it draws to.
            window: self.window.take().map(|window| (self.presenter.take(), window)),
            compositor: self.compositor.take(),
            display: self.context.take(),
        };
        teardown.run(
            &mut cascade,
            Duration::from_millis(self.config.shutdown_poll_ms),
            self.config.shutdown_poll_limit,
        );

        let outcome = cascade.finish();
        match &outcome {
            Ok(()) => log::info!("Loop finished cleanly"),
            Err(e) => log::error!("Loop finished with errors: {e}"),
        }
        outcome
    }
}

impl<H: Host> ApplicationHandler<UserEvent> for Runner<H> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;
        if let Err(failure) = self.start(event_loop) {
            self.fail(event_loop, failure);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if !self.failures.is_empty() {
            return;
        }
        match &self.window {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }

        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => {
                self.resized(size);
                Ok(())
            }
            WindowEvent::Moved(position) => {
                self.window_position = (position.x, position.y);
                Ok(())
            }
            WindowEvent::Occluded(true) => self.suspend_audio(),
            WindowEvent::Occluded(false) => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
                Ok(())
            }
            WindowEvent::RedrawRequested => self.redraw(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.keys.press(code),
                        ElementState::Released => self.keys.release(code),
                    };
                }
                Ok(())
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer.moved(position.x, position.y, &self.geometry, self.rows, self.columns);
                Ok(())
            }
            WindowEvent::CursorLeft { .. } => {
                self.pointer.left();
                Ok(())
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                self.pointer.primary_button(
                    state == ElementState::Pressed,
                    &self.geometry,
                    self.rows,
                    self.columns,
                );
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(failure) = result {
            self.fail(event_loop, failure);
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        if !self.failures.is_empty() {
            return;
        }
        let result = match event {
            UserEvent::AudioDone(slot) => self.audio_done(slot),
            UserEvent::AudioFault(message) => Err(Failure::AudioFault(message)),
            UserEvent::Redraw => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
                Ok(())
            }
        };
        if let Err(failure) = result {
            self.fail(event_loop, failure);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.failures.is_empty() {
            event_loop.exit();
            return;
        }
        if let Some(driver) = &self.vsync
            && driver.state() == VsyncState::Stopped
        {
            let error = driver
                .take_error()
                .unwrap_or_else(|| VsyncError::Wait("stopped without a reason".into()));
            self.fail(event_loop, Failure::Vsync(error));
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.outcome = Some(self.shut_down());
    }
}

/// Whether resizes snap to the viewport aspect. Layered windows stretch instead.
fn aspect_locked(mode: CompositorMode, maximized: bool, fullscreen: bool) -> bool {
    mode == CompositorMode::Opaque && !maximized && !fullscreen
}

fn window_insets(window: &Window) -> Insets {
    let (Ok(outer), Ok(inner)) = (window.outer_position(), window.inner_position()) else {
        return Insets::default();
    };
    let outer_size = window.outer_size();
    let inner_size = window.inner_size();
    let left = (inner.x - outer.x).max(0);
    let top = (inner.y - outer.y).max(0);
    Insets {
        left,
        top,
        right: (outer_size.width as i32 - inner_size.width as i32 - left).max(0),
        bottom: (outer_size.height as i32 - inner_size.height as i32 - top).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{AudioFrame, KeyHeld, Pointer, ViewportFramebuffer};

    struct Buffers {
        framebuffer: ViewportFramebuffer,
        audio: AudioFrame,
    }

    impl Host for Buffers {
        fn tick(&mut self, _pointer: Pointer, _keys: &dyn KeyHeld) {}
        fn video(&mut self, _pointer: Pointer, _keys: &dyn KeyHeld, _progress: f32) {}
        fn framebuffer(&self) -> &ViewportFramebuffer {
            &self.framebuffer
        }
        fn audio(&self) -> &AudioFrame {
            &self.audio
        }
    }

    fn settings(ticks_per_second: u32) -> LoopSettings {
        LoopSettings {
            title: "test".into(),
            ticks_per_second,
            show: ShowDirective::Hidden,
        }
    }

    #[test]
    fn sample_rate_is_ticks_times_samples() {
        let host = Buffers {
            framebuffer: ViewportFramebuffer::opaque(192, 256),
            audio: AudioFrame::new(441),
        };
        assert_eq!(settings(100).validate(&host).unwrap(), 44_100);
    }

    #[test]
    fn only_free_opaque_windows_snap() {
        assert!(aspect_locked(CompositorMode::Opaque, false, false));
        assert!(!aspect_locked(CompositorMode::Opaque, true, false));
        assert!(!aspect_locked(CompositorMode::Opaque, false, true));
        assert!(!aspect_locked(CompositorMode::Layered, false, false));
    }

    #[test]
    fn rejects_unusable_settings() {
        let host = Buffers {
            framebuffer: ViewportFramebuffer::opaque(192, 256),
            audio: AudioFrame::new(441),
        };
        assert!(matches!(settings(0).validate(&host), Err(Failure::Settings(_))));
        assert!(matches!(settings(u32::MAX).validate(&host), Err(Failure::Settings(_))));

        let empty = Buffers {
            framebuffer: ViewportFramebuffer::opaque(0, 256),
            audio: AudioFrame::new(441),
        };
        assert!(matches!(settings(60).validate(&empty), Err(Failure::Settings(_))));
    }
}
