//! Types for representing image resolutions.

use std::fmt;

/// Resolution (`width x height`) of an image, camera, or network input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// QVGA resolution: `320x240`
    pub const RES_QVGA: Self = Self {
        width: 320,
        height: 240,
    };

    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Computes the [`AspectRatio`] of this [`Resolution`].
    ///
    /// If `self` has a width or height of 0, `None` is returned.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width(), self.height())
    }

    /// Computes how an image of resolution `self` is scaled and padded to fit into `target` while
    /// keeping its aspect ratio.
    ///
    /// The image is centered in `target`, with black bars added either on the top and bottom
    /// (letterboxing) or on the left and right (pillarboxing).
    pub fn letterbox(&self, target: Resolution) -> Letterbox {
        if self.width == 0 || self.height == 0 {
            return Letterbox {
                scale: 1.0,
                offset: [0.0, 0.0],
                content: Resolution::new(0, 0),
            };
        }

        let scale_x = target.width() as f32 / self.width() as f32;
        let scale_y = target.height() as f32 / self.height() as f32;
        let scale = scale_x.min(scale_y);

        let w = ((self.width() as f32 * scale).round() as u32).min(target.width());
        let h = ((self.height() as f32 * scale).round() as u32).min(target.height());
        let offset = [
            ((target.width() - w) / 2) as f32,
            ((target.height() - h) / 2) as f32,
        ];

        let letterbox = Letterbox {
            scale,
            offset,
            content: Resolution::new(w, h),
        };
        log::trace!("letterbox {} into {} -> {:?}", self, target, letterbox);
        letterbox
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Describes how a source image was placed inside a (usually square) target image.
///
/// Created by [`Resolution::letterbox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    scale: f32,
    offset: [f32; 2],
    content: Resolution,
}

impl Letterbox {
    /// Returns the factor by which source coordinates are multiplied to get target coordinates.
    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Returns the top-left corner of the scaled source image inside the target.
    #[inline]
    pub fn offset(&self) -> [f32; 2] {
        self.offset
    }

    /// Returns the size of the scaled source image inside the target.
    #[inline]
    pub fn content(&self) -> Resolution {
        self.content
    }

    /// Maps a point in source image coordinates to target coordinates.
    pub fn to_target(&self, x: f32, y: f32) -> [f32; 2] {
        [
            x * self.scale + self.offset[0],
            y * self.scale + self.offset[1],
        ]
    }

    /// Maps a point in target coordinates back to source image coordinates.
    pub fn to_source(&self, x: f32, y: f32) -> [f32; 2] {
        [
            (x - self.offset[0]) / self.scale,
            (y - self.offset[1]) / self.scale,
        ]
    }
}

/// Ratio of a width to a height of an image.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Invariant: `width` and `height` are nonzero and as small as possible (ie. their GCD is 1).
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// 1:1 aspect ratio.
    ///
    /// Common for CNN inputs.
    pub const SQUARE: Self = Self {
        width: 1,
        height: 1,
    };

    /// Creates the aspect ratio representing `width:height`.
    ///
    /// If either `width` or `height` is `0`, returns `None`.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let gcd = gcd(width, height);
        Some(Self {
            width: width / gcd,
            height: height / gcd,
        })
    }

    /// Returns the `f32` corresponding to this ratio.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b > 0 {
        let t = b;
        b = a % b;
        a = t;
    }

    a
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(6, 9), 3);
        assert_eq!(gcd(7, 13), 1);
        assert_eq!(320 / gcd(320, 240), 4);
        assert_eq!(240 / gcd(320, 240), 3);

        // one argument is 0 - the other one will be returned
        assert_eq!(gcd(0, 7), 7);
        assert_eq!(gcd(7, 0), 7);
    }

    #[test]
    fn test_aspect_ratio() {
        let qvga = AspectRatio::new(320, 240).unwrap();
        let vga = AspectRatio::new(640, 480).unwrap();
        assert_eq!(qvga, vga);
        assert_eq!(qvga.to_string(), "4:3");
        assert_eq!(AspectRatio::new(0, 240), None);
    }

    #[test]
    fn letterbox_wide_source() {
        let lb = Resolution::RES_QVGA.letterbox(Resolution::new(192, 192));
        assert_abs_diff_eq!(lb.scale(), 0.6, epsilon = 1e-3);
        assert_eq!(lb.content(), Resolution::new(192, 144));
        assert_eq!(lb.offset(), [0.0, 24.0]);

        let [x, y] = lb.to_source(96.0, 96.0);
        assert_abs_diff_eq!(x, 160.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 120.0, epsilon = 1e-3);

        let [x, y] = lb.to_target(0.0, 0.0);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 24.0, epsilon = 1e-3);
    }

    #[test]
    fn letterbox_tall_source() {
        let lb = Resolution::new(100, 200).letterbox(Resolution::new(100, 100));
        assert_abs_diff_eq!(lb.scale(), 0.5, epsilon = 1e-3);
        assert_eq!(lb.content(), Resolution::new(50, 100));
        assert_eq!(lb.offset(), [25.0, 0.0]);
    }

    #[test]
    fn letterbox_empty_source() {
        let lb = Resolution::new(0, 0).letterbox(Resolution::new(100, 100));
        assert_eq!(lb.content(), Resolution::new(0, 0));
    }
}
