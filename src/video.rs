//! Camera acquisition, frame sources, and frame sinks.
//!
//! A [`Camera`] is asked once for a stream matching some [`CaptureConstraints`]. The resulting
//! [`FrameSource`] is then read once per tick. Composited output frames are handed to a
//! [`FrameSink`].

#[cfg(target_os = "linux")]
pub mod webcam;

use std::path::{Path, PathBuf};

use crate::image::Image;
use crate::resolution::Resolution;

/// Describes the stream requested from a [`Camera`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    resolution: Resolution,
    fps: Option<u32>,
    device: Option<String>,
    audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            resolution: Resolution::RES_QVGA,
            fps: None,
            device: None,
            audio: false,
        }
    }
}

impl CaptureConstraints {
    /// Sets the desired frame resolution.
    ///
    /// Cameras pick the smallest format at least this large and scale frames down to fit into it,
    /// keeping the aspect ratio. If the camera only supports smaller formats, frames are delivered
    /// at the largest one.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Sets the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Sets the name of the capture device to open.
    ///
    /// If no device with the given name can be found, acquisition fails.
    #[inline]
    pub fn device(self, name: impl Into<String>) -> Self {
        Self {
            device: Some(name.into()),
            ..self
        }
    }

    /// Sets whether an audio track is requested along with the video.
    #[inline]
    pub fn audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    #[inline]
    pub fn requested_resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn requested_fps(&self) -> Option<u32> {
        self.fps
    }

    #[inline]
    pub fn requested_device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    #[inline]
    pub fn wants_audio(&self) -> bool {
        self.audio
    }
}

/// A source of camera frames, read once per tick.
pub trait FrameSource {
    /// Reads the next frame.
    ///
    /// Blocks until a frame is available. Returns `Ok(None)` once the stream has ended. An error
    /// means the stream is no longer usable.
    fn read(&mut self) -> anyhow::Result<Option<Image>>;

    /// Returns the resolution of the frames produced by this source.
    fn resolution(&self) -> Resolution;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        (**self).read()
    }

    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }
}

/// Acquires a [`FrameSource`] from a capture device.
///
/// Acquisition fails if the device is missing, access is denied, or the constraints cannot be
/// satisfied at all.
pub trait Camera {
    type Source: FrameSource;

    fn acquire(&mut self, constraints: &CaptureConstraints) -> anyhow::Result<Self::Source>;
}

/// A [`FrameSource`] that yields the same image, either once or on every read.
///
/// Useful for running an effect on a photo instead of a live camera feed.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: Image,
    repeat: bool,
    done: bool,
}

impl StillImage {
    /// Creates a source yielding `image` on every read. The stream never ends.
    pub fn new(image: Image) -> Self {
        Self {
            image,
            repeat: true,
            done: false,
        }
    }

    /// Creates a source yielding `image` once, after which the stream ends.
    pub fn once(image: Image) -> Self {
        Self {
            image,
            repeat: false,
            done: false,
        }
    }
}

impl FrameSource for StillImage {
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        if self.done {
            return Ok(None);
        }
        self.done = !self.repeat;
        Ok(Some(self.image.clone()))
    }

    fn resolution(&self) -> Resolution {
        self.image.resolution()
    }
}

/// A [`Camera`] backed by an image file, producing [`StillImage`] sources.
///
/// The image is loaded on [`Camera::acquire`], so a missing or unreadable file surfaces as an
/// acquisition failure. The constraints are ignored.
///
/// By default, the stream ends after the image has been read once.
#[derive(Debug, Clone)]
pub struct StillCamera {
    path: PathBuf,
    repeat: bool,
}

impl StillCamera {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            repeat: false,
        }
    }

    /// Sets whether the image is yielded on every read instead of just once.
    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }
}

impl Camera for StillCamera {
    type Source = StillImage;

    fn acquire(&mut self, constraints: &CaptureConstraints) -> anyhow::Result<StillImage> {
        let image = Image::load(&self.path)?;
        log::info!(
            "opened still image {} ({}, requested {})",
            self.path.display(),
            image.resolution(),
            constraints.requested_resolution(),
        );
        if self.repeat {
            Ok(StillImage::new(image))
        } else {
            Ok(StillImage::once(image))
        }
    }
}

/// Receives composited output frames.
pub trait FrameSink {
    fn show(&mut self, image: &Image) -> anyhow::Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        (**self).show(image)
    }
}

/// A [`FrameSink`] that drops every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _image: &Image) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A [`FrameSink`] that writes every `interval`-th frame to an image file, overwriting it.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    interval: u32,
    frames: u32,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval: 1,
            frames: 0,
        }
    }

    /// Only write every `interval`-th frame (the first frame is always written).
    ///
    /// An `interval` of 0 is treated like 1.
    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }
}

impl FrameSink for FileSink {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        let write = self.frames % self.interval == 0;
        self.frames = self.frames.wrapping_add(1);
        if write {
            image.save(&self.path)?;
        }
        Ok(())
    }
}
