//! Color blending in linear light.

use super::Color;

/// Mixes `fg` over `bg`, with `coverage` being the fraction of the pixel covered by `fg`.
///
/// `coverage` is clamped to `[0.0, 1.0]`. A coverage of `1.0` yields `fg` unchanged, a coverage of
/// `0.0` yields `bg` unchanged. Intermediate values interpolate in linear RGB, so that soft edges
/// don't darken. Alpha is interpolated linearly.
pub fn mix(fg: Color, bg: Color, coverage: f32) -> Color {
    let t = coverage.clamp(0.0, 1.0);
    if t >= 1.0 {
        return fg;
    }
    if t <= 0.0 {
        return bg;
    }

    let fg = LinearColor::new(fg);
    let bg = LinearColor::new(bg);
    let lerp = |a: f32, b: f32| a * t + b * (1.0 - t);
    LinearColor([
        lerp(fg.r(), bg.r()),
        lerp(fg.g(), bg.g()),
        lerp(fg.b(), bg.b()),
        lerp(fg.a(), bg.a()),
    ])
    .to_color()
}

/// Performs alpha blending between `src` and `dest` to make `src` appear in front of `dest`.
pub fn alpha_over(dest: Color, src: Color) -> Color {
    fn blend_color(dest: f32, src: f32, dest_alpha: f32, src_alpha: f32, result_alpha: f32) -> f32 {
        (src * src_alpha + dest * dest_alpha * (1.0 - src_alpha)) / result_alpha
    }

    let dest = LinearColor::new(dest);
    let src = LinearColor::new(src);

    let result_alpha = src.a() + dest.a() * (1.0 - src.a());
    if result_alpha <= 0.0 {
        return Color::NULL;
    }
    let r = blend_color(dest.r(), src.r(), dest.a(), src.a(), result_alpha);
    let g = blend_color(dest.g(), src.g(), dest.a(), src.a(), result_alpha);
    let b = blend_color(dest.b(), src.b(), dest.a(), src.a(), result_alpha);

    LinearColor([r, g, b, result_alpha]).to_color()
}

struct LinearColor([f32; 4]);

impl LinearColor {
    fn new(color: Color) -> Self {
        fn to_linear(srgb: f32) -> f32 {
            if srgb <= 0.04045 {
                srgb / 12.92
            } else {
                ((srgb + 0.055) / 1.055).powf(2.4)
            }
        }

        let [r, g, b, a] = color.0.map(|c| f32::from(c) / 255.0);
        Self([to_linear(r), to_linear(g), to_linear(b), a])
    }

    fn to_color(&self) -> Color {
        fn to_srgb(rgb: f32) -> f32 {
            if rgb <= 0.0031308 {
                rgb * 12.92
            } else {
                1.055 * rgb.powf(1.0 / 2.4) - 0.055
            }
        }

        let [r, g, b, a] = self.0;
        let [r, g, b] = [to_srgb(r), to_srgb(g), to_srgb(b)];
        Color([r, g, b, a].map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8))
    }

    fn r(&self) -> f32 {
        self.0[0]
    }

    fn g(&self) -> f32 {
        self.0[1]
    }

    fn b(&self) -> f32 {
        self.0[2]
    }

    fn a(&self) -> f32 {
        self.0[3]
    }
}
