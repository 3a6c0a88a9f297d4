//! Image manipulation.
//!
//! This module provides the [`Image`] type, an owned 8-bit sRGB image with alpha channel, and
//! [`Color`], a single pixel value. Blending of colors in linear light lives in [`blend`], overlay
//! drawing in [`draw`].

pub mod blend;
pub mod draw;

#[cfg(test)]
mod tests;

use std::{fmt, path::Path};

use anyhow::bail;
use image::{imageops, ImageBuffer, Rgba, RgbaImage};

use crate::resolution::{Letterbox, Resolution};

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_crate(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_crate())?.to_rgba8();
        Ok(Self { buf })
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        match ImageFormat::from_path(path)? {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => {
                let rgb = image::DynamicImage::ImageRgba8(self.buf.clone()).to_rgb8();
                rgb.save_with_format(path, image::ImageFormat::Jpeg)?;
            }
            ImageFormat::Png => self.buf.save_with_format(path, image::ImageFormat::Png)?,
        }
        Ok(())
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image of a specified size, computing each pixel's color with `f`.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        Self {
            buf: ImageBuffer::from_fn(width, height, |x, y| Rgba(f(x, y).0)),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Mirrors the image along its vertical axis.
    pub fn flip_horizontal_in_place(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Returns a copy of this image, blurred with a Gaussian kernel of standard deviation `sigma`.
    pub fn blurred(&self, sigma: f32) -> Image {
        Image {
            buf: imageops::blur(&self.buf, sigma),
        }
    }

    /// Returns a copy of this image scaled to `target`, using bilinear filtering.
    ///
    /// The aspect ratio is not preserved.
    pub fn resized(&self, target: Resolution) -> Image {
        Image {
            buf: imageops::resize(
                &self.buf,
                target.width(),
                target.height(),
                imageops::FilterType::Triangle,
            ),
        }
    }

    /// Scales this image to fit into `target` while keeping its aspect ratio, filling the remaining
    /// area with opaque black bars.
    ///
    /// Returns the new image and the [`Letterbox`] describing where the original image ended up,
    /// which can be used to map coordinates in the result back to coordinates in `self`.
    ///
    /// For performance (as this runs on the CPU), this uses nearest neighbor interpolation.
    pub fn letterboxed(&self, target: Resolution) -> (Image, Letterbox) {
        let letterbox = self.resolution().letterbox(target);
        let content = letterbox.content();
        let [off_x, off_y] = letterbox.offset();
        let (off_x, off_y) = (off_x as u32, off_y as u32);

        let mut out = Image::new(target.width(), target.height());
        out.clear(Color::BLACK);
        if content.width() == 0 || content.height() == 0 {
            return (out, letterbox);
        }

        let scaled = imageops::resize(
            &self.buf,
            content.width(),
            content.height(),
            imageops::FilterType::Nearest,
        );
        imageops::replace(&mut out.buf, &scaled, i64::from(off_x), i64::from(off_y));
        (out, letterbox)
    }

    /// Returns the raw RGBA bytes of this image, in row-major order.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An 8-bit sRGB color with alpha channel.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    pub fn with_alpha(mut self, a: u8) -> Color {
        self.0[3] = a;
        self
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a()
        )
    }
}

impl std::ops::Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}
