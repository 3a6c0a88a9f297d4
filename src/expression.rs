//! Avatar expression weights derived from time and face landmarks.

use std::{fmt, time::Duration};

use crate::landmark::{Annotations, Contour, LandmarkError, Position};

/// Length of one blink cycle, in seconds.
pub const BLINK_PERIOD: f64 = 4.0;
/// Slope of the blink waveform. Higher values make the blink shorter.
pub const BLINK_SHARPNESS: f64 = 10.0;
/// Inner lip distance (in frame pixels) that counts as a fully open mouth.
pub const MOUTH_OPEN_SCALE: f32 = 10.0;
/// Index of the center point in the inner lip contours.
pub const LIP_CENTER: usize = 5;

/// An avatar expression preset (a blend shape channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {
    Neutral,
    /// Mouth open, as when pronouncing "a".
    A,
    I,
    U,
    E,
    O,
    Blink,
    BlinkL,
    BlinkR,
    Joy,
    Angry,
    Sorrow,
    Fun,
}

impl Expression {
    /// Returns the preset name used by avatar files.
    pub fn name(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::A => "a",
            Expression::I => "i",
            Expression::U => "u",
            Expression::E => "e",
            Expression::O => "o",
            Expression::Blink => "blink",
            Expression::BlinkL => "blink_l",
            Expression::BlinkR => "blink_r",
            Expression::Joy => "joy",
            Expression::Angry => "angry",
            Expression::Sorrow => "sorrow",
            Expression::Fun => "fun",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computes the scripted blink weight at `elapsed` time since the avatar was started.
///
/// This is a triangular pulse repeating every [`BLINK_PERIOD`] seconds: `0.0` for most of the
/// cycle, rising to `1.0` in the middle of each cycle. It does not depend on the tracked eyes.
pub fn blink_weight(elapsed: Duration) -> f32 {
    let phase = elapsed.as_secs_f64().rem_euclid(BLINK_PERIOD);
    let half = BLINK_PERIOD / 2.0;
    (1.0 - BLINK_SHARPNESS * (phase - half).abs()).max(0.0) as f32
}

/// Computes how far the mouth is open from the center points of the inner lips.
///
/// The result is clamped to `[0.0, 1.0]`. A lower lip above the upper one (as can happen with noisy
/// landmarks) counts as closed.
pub fn mouth_open_weight(upper: Position, lower: Position) -> f32 {
    ((lower[1] - upper[1]) / MOUTH_OPEN_SCALE).clamp(0.0, 1.0)
}

/// Computes [`mouth_open_weight`] for a face.
pub fn mouth_open_from_annotations(annotations: &Annotations) -> Result<f32, LandmarkError> {
    let upper = annotations.point(Contour::LipsUpperInner, LIP_CENTER)?;
    let lower = annotations.point(Contour::LipsLowerInner, LIP_CENTER)?;
    Ok(mouth_open_weight(upper, lower))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn blink_peaks_mid_cycle() {
        assert_eq!(blink_weight(secs(2.0)), 1.0);
        assert_eq!(blink_weight(secs(6.0)), 1.0);
        assert_eq!(blink_weight(secs(402.0)), 1.0);
        assert_eq!(blink_weight(Duration::ZERO), 0.0);
        assert_eq!(blink_weight(secs(4.0)), 0.0);
        assert_eq!(blink_weight(secs(1.0)), 0.0);
        assert_abs_diff_eq!(blink_weight(secs(2.05)), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn mouth_open_clamps() {
        let upper = [0.0, 100.0, 0.0];
        assert_eq!(mouth_open_weight(upper, [0.0, 100.0, 0.0]), 0.0);
        assert_eq!(mouth_open_weight(upper, [0.0, 110.0, 0.0]), 1.0);
        assert_eq!(mouth_open_weight(upper, [0.0, 120.0, 0.0]), 1.0);
        assert_eq!(mouth_open_weight(upper, [0.0, 95.0, 0.0]), 0.0);
        assert_abs_diff_eq!(mouth_open_weight(upper, [3.0, 104.0, 9.0]), 0.4);
    }

    #[test]
    fn mouth_open_needs_lips() {
        let mut annotations = Annotations::new();
        annotations.insert(Contour::LipsUpperInner, vec![[0.0, 10.0, 0.0]; 11]);
        assert_eq!(
            mouth_open_from_annotations(&annotations),
            Err(LandmarkError::MissingGroup(Contour::LipsLowerInner))
        );

        annotations.insert(Contour::LipsLowerInner, vec![[0.0, 15.0, 0.0]; 11]);
        assert_eq!(mouth_open_from_annotations(&annotations), Ok(0.5));
    }

    proptest! {
        #[test]
        fn blink_in_unit_range(t in 0.0f64..10_000.0) {
            let w = blink_weight(secs(t));
            prop_assert!((0.0..=1.0).contains(&w));
        }

        #[test]
        fn blink_is_periodic(t in 0.0f64..1_000.0, k in 1u32..100) {
            let a = blink_weight(secs(t));
            let b = blink_weight(secs(t + BLINK_PERIOD * f64::from(k)));
            prop_assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }

        #[test]
        fn blink_peak_every_cycle(k in 0u32..10_000) {
            let w = blink_weight(secs(2.0 + BLINK_PERIOD * f64::from(k)));
            prop_assert!((w - 1.0).abs() < 1e-6);
        }

        #[test]
        fn mouth_open_in_unit_range(upper in -1e4f32..1e4, lower in -1e4f32..1e4) {
            let w = mouth_open_weight([0.0, upper, 0.0], [0.0, lower, 0.0]);
            prop_assert!((0.0..=1.0).contains(&w));
        }
    }
}
