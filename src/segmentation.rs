//! Person segmentation.
//!
//! A [`Segmenter`] classifies every pixel of a frame as either belonging to a person or to the
//! background, producing a [`Mask`].

use std::{fmt, path::Path};

use anyhow::bail;

use crate::{
    image::Image,
    nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork},
    resolution::Resolution,
    timer::Timer,
};

/// Per-pixel person coverage of a frame.
///
/// Each pixel holds a value in `[0.0, 1.0]`, where `1.0` means the pixel is fully covered by a
/// person and `0.0` means it is background.
#[derive(Clone, PartialEq)]
pub struct Mask {
    resolution: Resolution,
    coverage: Box<[f32]>,
}

impl Mask {
    /// Creates an all-background mask.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            coverage: vec![0.0; resolution.num_pixels() as usize].into_boxed_slice(),
        }
    }

    /// Creates a mask by calling `f` for every pixel. Results are clamped to `[0.0, 1.0]`.
    pub fn from_fn(resolution: Resolution, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut coverage = Vec::with_capacity(resolution.num_pixels() as usize);
        for y in 0..resolution.height() {
            for x in 0..resolution.width() {
                coverage.push(f(x, y).clamp(0.0, 1.0));
            }
        }
        Self {
            resolution,
            coverage: coverage.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.resolution.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.resolution.height()
    }

    /// Returns the person coverage at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[track_caller]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.coverage[self.index(x, y)]
    }

    /// Sets the person coverage at `(x, y)`, clamped to `[0.0, 1.0]`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[track_caller]
    pub fn set(&mut self, x: u32, y: u32, coverage: f32) {
        let index = self.index(x, y);
        self.coverage[index] = coverage.clamp(0.0, 1.0);
    }

    /// Returns the fraction of the frame covered by a person.
    pub fn person_fraction(&self) -> f32 {
        if self.coverage.is_empty() {
            return 0.0;
        }
        self.coverage.iter().sum::<f32>() / self.coverage.len() as f32
    }

    #[track_caller]
    fn index(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width() && y < self.height(),
            "({}, {}) out of bounds for {} mask",
            x,
            y,
            self.resolution,
        );
        y as usize * self.width() as usize + x as usize
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Mask", self.resolution)
    }
}

/// A person segmentation model.
pub trait Segmenter {
    /// Segments `image`, returning a mask with the same resolution as `image`.
    fn segment_person(&mut self, image: &Image) -> anyhow::Result<Mask>;
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
    fn segment_person(&mut self, image: &Image) -> anyhow::Result<Mask> {
        (**self).segment_person(image)
    }
}

/// Segmentation model configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationConfig {
    threshold: f32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { threshold: 0.7 }
    }
}

impl SegmentationConfig {
    /// Sets the person probability above which a pixel is considered part of a person.
    ///
    /// The value is clamped to `[0.0, 1.0]`.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    #[inline]
    pub fn person_threshold(&self) -> f32 {
        self.threshold
    }
}

/// A [`Segmenter`] backed by a single-channel person segmentation network.
///
/// The network must take one NHWC RGB image with values in `[0.0, 1.0]` and output one person
/// probability per input pixel. The frame is letterboxed into the network input, and the result is
/// thresholded into a binary mask at the frame's resolution.
pub struct OnnxSegmenter {
    cnn: Cnn,
    config: SegmentationConfig,
    t_resize: Timer,
    t_infer: Timer,
}

impl OnnxSegmenter {
    /// Loads the network from an `.onnx` file.
    pub fn load<P: AsRef<Path>>(path: P, config: SegmentationConfig) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?;
        Self::new(nn, config)
    }

    /// Wraps an already loaded network.
    pub fn new(nn: NeuralNetwork, config: SegmentationConfig) -> anyhow::Result<Self> {
        let cnn = Cnn::new(nn, CnnInputShape::NHWC, ColorMapper::linear(0.0..=1.0))?;
        if cnn.input_resolution().num_pixels() == 0 {
            bail!("segmentation network has an empty input");
        }
        Ok(Self {
            cnn,
            config,
            t_resize: Timer::new("resize"),
            t_infer: Timer::new("infer"),
        })
    }

    /// Returns profiling timers for letterboxing and inference.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_resize, &self.t_infer].into_iter()
    }
}

impl Segmenter for OnnxSegmenter {
    fn segment_person(&mut self, image: &Image) -> anyhow::Result<Mask> {
        let input_res = self.cnn.input_resolution();
        let (input, letterbox) = self.t_resize.time(|| image.letterboxed(input_res));
        let outputs = self.t_infer.time(|| self.cnn.estimate(&input))?;

        let probabilities = outputs.get(0)?.as_slice();
        if probabilities.len() != input_res.num_pixels() as usize {
            bail!(
                "segmentation network produced {} values for a {} input",
                probabilities.len(),
                input_res,
            );
        }

        let threshold = self.config.person_threshold();
        let (in_w, in_h) = (input_res.width(), input_res.height());
        let mask = Mask::from_fn(image.resolution(), |x, y| {
            let [tx, ty] = letterbox.to_target(x as f32 + 0.5, y as f32 + 0.5);
            let tx = (tx.max(0.0) as u32).min(in_w - 1);
            let ty = (ty.max(0.0) as u32).min(in_h - 1);
            let p = probabilities[(ty * in_w + tx) as usize];
            if p > threshold {
                1.0
            } else {
                0.0
            }
        });
        log::trace!("person coverage: {:.3}", mask.person_fraction());
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_access() {
        let mut mask = Mask::new(Resolution::new(4, 2));
        assert_eq!(mask.person_fraction(), 0.0);
        mask.set(3, 1, 2.0);
        mask.set(0, 0, 1.0);
        assert_eq!(mask.get(3, 1), 1.0);
        assert_eq!(mask.person_fraction(), 0.25);

        let mask = Mask::from_fn(Resolution::new(2, 2), |x, _| if x == 0 { -1.0 } else { 0.5 });
        assert_eq!(mask.get(0, 1), 0.0);
        assert_eq!(mask.get(1, 1), 0.5);
    }

    #[test]
    #[should_panic]
    fn mask_out_of_bounds() {
        Mask::new(Resolution::new(2, 2)).get(2, 0);
    }

    #[test]
    fn config() {
        assert_eq!(SegmentationConfig::default().person_threshold(), 0.7);
        assert_eq!(
            SegmentationConfig::default()
                .threshold(1.5)
                .person_threshold(),
            1.0
        );
    }
}
