//! Running an effect on a camera stream.
//!
//! A [`Session`] owns everything an effect needs while it runs: the [`FrameSource`] and the
//! [`Effect`] itself (its models and render target). Each [`Session::tick`] captures one frame,
//! runs the effect's estimation on it, and renders the result. [`Session::run`] ticks until the
//! session is stopped via its [`StopHandle`].

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;

use crate::{
    image::Image,
    timer::{FpsCounter, Timer},
    video::{Camera, CaptureConstraints, FrameSource},
};

/// A per-frame effect: an estimation step (usually running a neural network) followed by a render
/// step consuming its result.
pub trait Effect {
    /// The result of the estimation step.
    type Estimate;

    /// Returns a short name used in logs.
    fn name(&self) -> &str;

    /// Runs inference on `frame`.
    ///
    /// Errors are treated as transient: the tick is skipped and the session keeps running.
    fn estimate(&mut self, frame: &Image) -> anyhow::Result<Self::Estimate>;

    /// Renders `frame` using the estimation result.
    ///
    /// Errors are treated as transient, like estimation errors.
    fn render(&mut self, frame: &Image, estimate: Self::Estimate) -> anyhow::Result<()>;
}

/// Fatal errors that prevent a [`Session`] from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The camera could not be opened (no device, permission denied, unsupported constraints).
    #[error("camera acquisition failed")]
    Acquisition(#[source] anyhow::Error),
    /// The effect's models could not be loaded.
    #[error("model loading failed")]
    ModelLoad(#[source] anyhow::Error),
}

/// Something that shows the user that a session is starting up.
pub trait LoadingIndicator {
    fn set_loading(&mut self, loading: bool);
}

impl<I: LoadingIndicator + ?Sized> LoadingIndicator for &mut I {
    fn set_loading(&mut self, loading: bool) {
        (**self).set_loading(loading)
    }
}

/// A [`LoadingIndicator`] that logs state changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

impl LoadingIndicator for LogIndicator {
    fn set_loading(&mut self, loading: bool) {
        if loading {
            log::info!("loading...");
        } else {
            log::debug!("loading done");
        }
    }
}

/// Turns a [`LoadingIndicator`] on when created, and off again when dropped.
struct LoadingGuard<'a, I: LoadingIndicator + ?Sized> {
    indicator: &'a mut I,
}

impl<'a, I: LoadingIndicator + ?Sized> LoadingGuard<'a, I> {
    fn new(indicator: &'a mut I) -> Self {
        indicator.set_loading(true);
        Self { indicator }
    }
}

impl<I: LoadingIndicator + ?Sized> Drop for LoadingGuard<'_, I> {
    fn drop(&mut self) {
        self.indicator.set_loading(false);
    }
}

/// A shared "running" flag that can stop a [`Session`] from anywhere.
///
/// This is a cheaply [`Clone`]able handle. Once stopped, a session can not be restarted.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Stops the session. The current tick finishes, but its estimate is not rendered.
    pub fn stop(&self) {
        if self.0.swap(false, Ordering::AcqRel) {
            log::info!("stopping session");
        }
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What happened during a [`Session::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame was estimated and rendered.
    Rendered,
    /// Estimation failed; nothing was rendered.
    EstimateFailed,
    /// Rendering failed.
    RenderFailed,
    /// The session was stopped while estimating, so the estimate was dropped.
    Discarded,
    /// The session was already stopped; no frame was captured.
    Stopped,
    /// The frame source ended. The session is now stopped.
    EndOfStream,
}

/// A running effect together with its frame source.
pub struct Session<F, E> {
    source: F,
    effect: E,
    running: StopHandle,
    t_capture: Timer,
    t_estimate: Timer,
    t_render: Timer,
    fps: FpsCounter,
}

impl<F: FrameSource, E: Effect> Session<F, E> {
    /// Starts a session by acquiring a camera stream, then loading the effect.
    ///
    /// `indicator` is turned on while starting and is always turned off before this function
    /// returns. If acquisition fails, `load` is never called. Nothing is retried.
    pub fn start<C, I, L>(
        camera: &mut C,
        constraints: &CaptureConstraints,
        indicator: &mut I,
        load: L,
    ) -> Result<Self, StartError>
    where
        C: Camera<Source = F>,
        I: LoadingIndicator + ?Sized,
        L: FnOnce() -> anyhow::Result<E>,
    {
        let _loading = LoadingGuard::new(indicator);

        let source = camera
            .acquire(constraints)
            .map_err(StartError::Acquisition)?;
        let effect = load().map_err(StartError::ModelLoad)?;

        log::info!(
            "started {} at {}",
            effect.name(),
            source.resolution()
        );
        Ok(Self::new(source, effect))
    }

    /// Creates a running session from an already acquired source and a loaded effect.
    pub fn new(source: F, effect: E) -> Self {
        let fps = FpsCounter::new(effect.name().to_string());
        Self {
            source,
            effect,
            running: StopHandle::new(),
            t_capture: Timer::new("capture"),
            t_estimate: Timer::new("estimate"),
            t_render: Timer::new("render"),
            fps,
        }
    }

    /// Returns a handle that can stop this session.
    pub fn stop_handle(&self) -> StopHandle {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    pub fn stop(&self) {
        self.running.stop();
    }

    pub fn effect(&self) -> &E {
        &self.effect
    }

    pub fn effect_mut(&mut self) -> &mut E {
        &mut self.effect
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    /// Runs one capture, estimate, and render iteration.
    ///
    /// Failing to read a frame is fatal and returns an error. When the source has no more frames,
    /// the session stops itself. Estimation and rendering failures are logged and reported as a
    /// [`TickOutcome`], and the session can keep ticking.
    pub fn tick(&mut self) -> anyhow::Result<TickOutcome> {
        if !self.is_running() {
            return Ok(TickOutcome::Stopped);
        }

        let frame = self
            .t_capture
            .time(|| self.source.read())
            .context("failed to read camera frame")?;
        let Some(frame) = frame else {
            log::info!("{}: end of stream", self.effect.name());
            self.stop();
            return Ok(TickOutcome::EndOfStream);
        };

        let estimate = match self.t_estimate.time(|| self.effect.estimate(&frame)) {
            Ok(estimate) => estimate,
            Err(e) => {
                log::warn!("{}: estimation failed: {:#}", self.effect.name(), e);
                return Ok(TickOutcome::EstimateFailed);
            }
        };

        if !self.is_running() {
            log::debug!("{}: session stopped, discarding estimate", self.effect.name());
            return Ok(TickOutcome::Discarded);
        }

        let outcome = match self.t_render.time(|| self.effect.render(&frame, estimate)) {
            Ok(()) => TickOutcome::Rendered,
            Err(e) => {
                log::warn!("{}: rendering failed: {:#}", self.effect.name(), e);
                TickOutcome::RenderFailed
            }
        };

        self.fps
            .tick_with([&self.t_capture, &self.t_estimate, &self.t_render]);
        Ok(outcome)
    }

    /// Ticks until the session is stopped, the stream ends, or a frame can not be read.
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match self.tick()? {
                TickOutcome::Stopped | TickOutcome::EndOfStream => return Ok(()),
                _ => {}
            }
        }
    }
}
