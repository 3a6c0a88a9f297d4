//! Background blur ("bokeh") effect.

use anyhow::{bail, ensure};
use image::{imageops, GrayImage, Luma};

use crate::{
    image::{blend, Image},
    segmentation::{Mask, Segmenter},
    session::Effect,
    timer::Timer,
    video::FrameSink,
};

/// Parameters of [`draw_bokeh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BokehParams {
    background_blur: u32,
    edge_blur: u32,
    flip_horizontal: bool,
}

impl Default for BokehParams {
    fn default() -> Self {
        Self {
            background_blur: 3,
            edge_blur: 3,
            flip_horizontal: true,
        }
    }
}

impl BokehParams {
    pub const MAX_BACKGROUND_BLUR: u32 = 20;
    pub const MAX_EDGE_BLUR: u32 = 20;

    /// Sets how strongly the background is blurred, in pixels. Must be in `1..=20`.
    pub fn background_blur(mut self, amount: u32) -> Self {
        self.background_blur = amount;
        self
    }

    /// Sets how far the person's outline is softened, in pixels. Must be in `0..=20`.
    pub fn edge_blur(mut self, amount: u32) -> Self {
        self.edge_blur = amount;
        self
    }

    /// Sets whether the output is mirrored, so that it looks like a mirror image to the user.
    pub fn flip_horizontal(mut self, flip: bool) -> Self {
        self.flip_horizontal = flip;
        self
    }

    /// Checks that the blur amounts are in range.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            (1..=Self::MAX_BACKGROUND_BLUR).contains(&self.background_blur),
            "background blur must be in 1..={}, got {}",
            Self::MAX_BACKGROUND_BLUR,
            self.background_blur,
        );
        ensure!(
            self.edge_blur <= Self::MAX_EDGE_BLUR,
            "edge blur must be in 0..={}, got {}",
            Self::MAX_EDGE_BLUR,
            self.edge_blur,
        );
        Ok(())
    }
}

/// Composites `frame` over a blurred copy of itself, keeping the areas covered by `mask` sharp.
///
/// `mask` must have the same resolution as `frame`.
pub fn draw_bokeh(frame: &Image, mask: &Mask, params: &BokehParams) -> anyhow::Result<Image> {
    params.validate()?;
    if mask.resolution() != frame.resolution() {
        bail!(
            "mask resolution {} does not match frame resolution {}",
            mask.resolution(),
            frame.resolution(),
        );
    }

    let background = frame.blurred(params.background_blur as f32);

    let mut coverage = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([(mask.get(x, y) * 255.0).round() as u8])
    });
    if params.edge_blur > 0 {
        coverage = imageops::blur(&coverage, params.edge_blur as f32);
    }

    let mut out = Image::from_fn(frame.width(), frame.height(), |x, y| {
        let person = f32::from(coverage.get_pixel(x, y)[0]) / 255.0;
        blend::mix(frame.get(x, y), background.get(x, y), person)
    });
    if params.flip_horizontal {
        out.flip_horizontal_in_place();
    }
    Ok(out)
}

/// Blurs the background behind the person in the camera frame.
pub struct BackgroundBlur<S, K> {
    segmenter: S,
    sink: K,
    params: BokehParams,
    t_composite: Timer,
}

impl<S: Segmenter, K: FrameSink> BackgroundBlur<S, K> {
    /// Creates the effect, checking `params`.
    pub fn new(segmenter: S, sink: K, params: BokehParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self {
            segmenter,
            sink,
            params,
            t_composite: Timer::new("composite"),
        })
    }

    pub fn params(&self) -> &BokehParams {
        &self.params
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn segmenter(&self) -> &S {
        &self.segmenter
    }

    /// Returns the profiling timer for compositing.
    pub fn timer(&self) -> &Timer {
        &self.t_composite
    }
}

impl<S: Segmenter, K: FrameSink> Effect for BackgroundBlur<S, K> {
    type Estimate = Mask;

    fn name(&self) -> &str {
        "blur"
    }

    fn estimate(&mut self, frame: &Image) -> anyhow::Result<Mask> {
        self.segmenter.segment_person(frame)
    }

    fn render(&mut self, frame: &Image, mask: Mask) -> anyhow::Result<()> {
        let params = self.params;
        let out = self
            .t_composite
            .time(|| draw_bokeh(frame, &mask, &params))?;
        self.sink.show(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::Color, resolution::Resolution};

    fn stripes() -> Image {
        // alternating black and white columns, so that blurring is visible everywhere
        Image::from_fn(16, 8, |x, _| {
            if x % 2 == 0 {
                Color::BLACK
            } else {
                Color::WHITE
            }
        })
    }

    #[test]
    fn validate_ranges() {
        assert!(BokehParams::default().validate().is_ok());
        assert!(BokehParams::default().background_blur(0).validate().is_err());
        assert!(BokehParams::default().background_blur(21).validate().is_err());
        assert!(BokehParams::default().edge_blur(0).validate().is_ok());
        assert!(BokehParams::default().edge_blur(21).validate().is_err());
    }

    #[test]
    fn person_stays_sharp() {
        let frame = stripes();
        let mask = Mask::from_fn(frame.resolution(), |_, _| 1.0);
        let params = BokehParams::default().edge_blur(0).flip_horizontal(false);
        let out = draw_bokeh(&frame, &mask, &params).unwrap();
        for x in 0..16 {
            assert_eq!(out.get(x, 4), frame.get(x, 4));
        }
    }

    #[test]
    fn background_gets_blurred() {
        let frame = stripes();
        let mask = Mask::new(frame.resolution());
        let params = BokehParams::default().flip_horizontal(false);
        let out = draw_bokeh(&frame, &mask, &params).unwrap();
        let c = out.get(8, 4);
        assert!(c.r() > 40 && c.r() < 215, "{:?}", c);
    }

    #[test]
    fn flips_output() {
        let frame = Image::from_fn(2, 1, |x, _| if x == 0 { Color::RED } else { Color::BLUE });
        let mask = Mask::from_fn(frame.resolution(), |_, _| 1.0);
        let params = BokehParams::default().edge_blur(0);
        let out = draw_bokeh(&frame, &mask, &params).unwrap();
        assert_eq!(out.get(0, 0), Color::BLUE);
        assert_eq!(out.get(1, 0), Color::RED);
    }

    #[test]
    fn mask_must_match_frame() {
        let frame = stripes();
        let mask = Mask::new(Resolution::new(8, 8));
        assert!(draw_bokeh(&frame, &mask, &BokehParams::default()).is_err());
    }
}
