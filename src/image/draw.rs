//! Drawing primitives for debug overlays.

use super::{Color, Image};

/// Guard returned by [`draw_marker`]; draws the marker when dropped and allows customization.
pub struct DrawMarker<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    color: Color,
    size: u32,
}

impl<'a> DrawMarker<'a> {
    /// Sets the marker's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the width and height of the marker.
    ///
    /// The default size is 5. The size must be *uneven* and *non-zero*. A size of 1 will result in
    /// a single pixel getting drawn.
    pub fn size(&mut self, size: u32) -> &mut Self {
        assert!(size != 0, "marker size must be greater than zero");
        assert!(size % 2 == 1, "marker size must be an uneven number");
        self.size = size;
        self
    }
}

impl Drop for DrawMarker<'_> {
    fn drop(&mut self) {
        let offset = ((self.size - 1) / 2) as i32;
        for (xoff, yoff) in (-offset..=offset)
            .zip(-offset..=offset)
            .chain((-offset..=offset).rev().zip(-offset..=offset))
        {
            let (x, y) = (self.x + xoff, self.y + yoff);
            // pixels outside the image are clipped
            if x < 0 || y < 0 {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            if x < self.image.width() && y < self.image.height() {
                self.image.set(x, y, self.color);
            }
        }
    }
}

/// Draws a marker onto an image.
///
/// This can be used to visualize shape landmarks or points of interest. The marker is an `X`
/// centered on `(x, y)`.
pub fn draw_marker(image: &mut Image, x: i32, y: i32) -> DrawMarker<'_> {
    DrawMarker {
        image,
        x,
        y,
        color: Color::from_rgb8(255, 0, 0),
        size: 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_a_cross() {
        let mut image = Image::new(5, 5);
        draw_marker(&mut image, 2, 2).color(Color::GREEN);
        for (x, y) in [(0, 0), (1, 1), (2, 2), (3, 3), (4, 4), (4, 0), (0, 4), (3, 1)] {
            assert_eq!(image.get(x, y), Color::GREEN, "({}, {})", x, y);
        }
        assert_eq!(image.get(2, 0), Color::NULL);
        assert_eq!(image.get(0, 2), Color::NULL);
    }

    #[test]
    fn marker_is_clipped() {
        let mut image = Image::new(3, 3);
        draw_marker(&mut image, 0, 0);
        draw_marker(&mut image, 10, -4);
        assert_eq!(image.get(0, 0), Color::RED);
        assert_eq!(image.get(2, 2), Color::RED);
        assert_eq!(image.get(1, 0), Color::NULL);
    }

    #[test]
    fn single_pixel_marker() {
        let mut image = Image::new(3, 3);
        draw_marker(&mut image, 1, 1).size(1);
        assert_eq!(image.get(1, 1), Color::RED);
        assert_eq!(image.get(0, 0), Color::NULL);
        assert_eq!(image.get(2, 2), Color::NULL);
    }
}
