use super::blend::{alpha_over, mix};
use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let mut image = Image::new(W as u32, H as u32);
    for (y, row) in data.iter().enumerate() {
        for (x, color) in row.iter().enumerate() {
            image.set(x as u32, y as u32, *color);
        }
    }
    image
}

#[test]
fn flip() {
    let mut image = mkimage([[C::RED, C::GREEN, C::BLUE]]);
    image.flip_horizontal_in_place();
    assert_eq!(image.get(0, 0), C::BLUE);
    assert_eq!(image.get(1, 0), C::GREEN);
    assert_eq!(image.get(2, 0), C::RED);
}

#[test]
fn letterboxed() {
    let image = mkimage([[C::RED, C::RED], [C::GREEN, C::GREEN]]);
    let wide = Image::from_fn(4, 2, |x, y| image.get(x / 2, y));

    let (square, lb) = wide.letterboxed(Resolution::new(4, 4));
    assert_eq!(square.resolution(), Resolution::new(4, 4));
    assert_eq!(lb.content(), Resolution::new(4, 2));
    assert_eq!(lb.offset(), [0.0, 1.0]);

    // black bars
    assert_eq!(square.get(0, 0), C::BLACK);
    assert_eq!(square.get(3, 3), C::BLACK);
    // content
    assert_eq!(square.get(0, 1), C::RED);
    assert_eq!(square.get(3, 2), C::GREEN);
}

#[test]
fn blend() {
    assert_eq!(mix(C::RED, C::BLUE, 1.0), C::RED);
    assert_eq!(mix(C::RED, C::BLUE, 0.0), C::BLUE);
    assert_eq!(mix(C::RED, C::BLUE, 7.0), C::RED); // clamped
    assert_eq!(mix(C::RED, C::BLUE, -1.0), C::BLUE); // clamped

    // linear light: half coverage of white over black is brighter than sRGB 127
    let half = mix(C::WHITE, C::BLACK, 0.5);
    assert!(half.r() > 180, "{:?}", half);
    assert_eq!(half.r(), half.g());
    assert_eq!(half.a(), 255);

    assert_eq!(alpha_over(C::RED, C::GREEN.with_alpha(0)), C::RED); // no change
    assert_eq!(alpha_over(C::RED, C::GREEN), C::GREEN); // alpha overwrite
    assert_eq!(alpha_over(C::NULL, C::NULL), C::NULL);
}

#[test]
fn blurred_uniform_image_is_unchanged() {
    let mut image = Image::new(8, 8);
    image.clear(C::from_rgb8(10, 20, 30));
    let blurred = image.blurred(2.0);
    assert_eq!(blurred.resolution(), image.resolution());
    let center = blurred.get(4, 4);
    for (got, want) in [(center.r(), 10), (center.g(), 20), (center.b(), 30)] {
        assert!(got.abs_diff(want) <= 1, "{:?}", center);
    }
}

#[test]
fn resized() {
    let image = Image::from_fn(8, 6, |_, _| C::BLUE);
    let small = image.resized(Resolution::new(4, 3));
    assert_eq!(small.resolution(), Resolution::new(4, 3));
    assert_eq!(small.get(2, 1), C::BLUE);
}
