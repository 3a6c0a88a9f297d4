//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::env;

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use super::{Camera, CaptureConstraints, FrameSource};
use crate::image::Image;
use crate::resolution::Resolution;
use crate::timer::Timer;

const ENV_VAR_WEBCAM_NAME: &str = "OMOTE_WEBCAM_NAME";

#[derive(Clone, Copy, Debug)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        1.0 / self.frame_interval.as_f32()
    }
}

fn list_formats(device: &Device) -> anyhow::Result<(Pixelformat, Vec<FrameFormat>)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    Ok((pixel_format, formats))
}

/// Picks the format closest to the constraints.
///
/// Formats at least as large as the requested resolution (and at least as fast as the requested
/// frame rate, if any) are eligible, and the smallest of those wins, preferring higher frame rates
/// among equally sized formats. If nothing is eligible, the largest format is used instead.
fn negotiate_format(
    formats: &[FrameFormat],
    constraints: &CaptureConstraints,
) -> Option<FrameFormat> {
    let res = constraints.requested_resolution();
    let eligible = formats.iter().filter(|fmt| {
        fmt.resolution.width() >= res.width()
            && fmt.resolution.height() >= res.height()
            && constraints
                .requested_fps()
                .map_or(true, |fps| fmt.fps().round() >= fps as f32)
    });

    let best = eligible.min_by(|a, b| {
        a.resolution
            .num_pixels()
            .cmp(&b.resolution.num_pixels())
            .then(b.fps().total_cmp(&a.fps()))
    });
    if let Some(best) = best {
        return Some(*best);
    }

    log::debug!(
        "no format satisfies {} @ {:?} FPS, falling back to the largest one",
        res,
        constraints.requested_fps(),
    );
    formats.iter().copied().max_by(|a, b| {
        a.resolution
            .num_pixels()
            .cmp(&b.resolution.num_pixels())
            .then(a.fps().total_cmp(&b.fps()))
    })
}

/// Computes the resolution frames captured at `captured` are scaled to, given the `requested` one.
///
/// Frames larger than requested are scaled down to fit into `requested`, keeping their aspect
/// ratio. Frames that are already small enough in either dimension are left alone.
fn output_resolution(captured: Resolution, requested: Resolution) -> Resolution {
    if captured.width() <= requested.width() || captured.height() <= requested.height() {
        return captured;
    }

    let scale = f64::min(
        f64::from(requested.width()) / f64::from(captured.width()),
        f64::from(requested.height()) / f64::from(captured.height()),
    );
    Resolution::new(
        ((f64::from(captured.width()) * scale).round() as u32).max(1),
        ((f64::from(captured.height()) * scale).round() as u32).max(1),
    )
}

/// A [`Camera`] that opens V4L2 devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Camera;

impl Camera for V4l2Camera {
    type Source = Webcam;

    fn acquire(&mut self, constraints: &CaptureConstraints) -> anyhow::Result<Webcam> {
        Webcam::open(constraints)
    }
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    /// Resolution the camera delivers.
    captured: Resolution,
    /// Resolution of the frames returned by `read`.
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
    t_resize: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(constraints: &CaptureConstraints) -> anyhow::Result<Self> {
        if constraints.wants_audio() {
            bail!("audio capture is not supported");
        }

        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }
        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_impl(dev, constraints) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{}", e);
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                }
            }
        }

        bail!("no supported webcam device found")
    }

    fn open_impl(dev: Device, constraints: &CaptureConstraints) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        let cam_name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = constraints
            .requested_device()
            .or(cam_name_from_env.as_deref())
        {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixel_format, formats) = list_formats(&dev)?;
        let Some(format) = negotiate_format(&formats, constraints) else {
            bail!("device {} offers no frame formats", caps.card());
        };

        let capture = dev.video_capture(PixFormat::new(
            format.resolution.width(),
            format.resolution.height(),
            pixel_format,
        ))?;

        let actual_format = capture.format();
        let captured = Resolution::new(actual_format.width(), actual_format.height());
        let resolution = output_resolution(captured, constraints.requested_resolution());

        let actual = capture.set_frame_interval(format.frame_interval)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            captured,
            1.0 / actual.as_f32(),
        );
        if captured != resolution {
            log::debug!("scaling frames down to {}", resolution);
        }

        let stream = capture.into_stream(2)?;

        Ok(Some(Self {
            stream,
            captured,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
            t_resize: Timer::new("resize"),
        }))
    }

    /// Returns profiling timers for webcam access, decoding, and scaling.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode, &self.t_resize].into_iter()
    }
}

impl FrameSource for Webcam {
    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is. The stream never ends.
    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        let resolution = self.captured;
        let t_decode = &mut self.t_decode;
        let dequeue_guard = self.t_dequeue.start();
        let image = self
            .stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        // Webcams occasionally produce corrupted MJPG frames. Hand back a blank
                        // image instead of skipping, which would cause a latency spike.
                        log::error!("webcam decode error: {}", e);
                        Image::new(resolution.width(), resolution.height())
                    }
                };
                Ok(image)
            })?;

        if image.resolution() == self.resolution {
            return Ok(Some(image));
        }
        let target = self.resolution;
        Ok(Some(self.t_resize.time(|| image.resized(target))))
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }
}
