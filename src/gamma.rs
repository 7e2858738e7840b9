// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gamma and vibrancy correction, and compositing over the background.

use image::Rgb;

use crate::density::LogDensityPoint;
use crate::flame::Flame;
use crate::palette::RenderColor;

/// Maps filtered density and color to display channels.
#[derive(Clone, Debug)]
pub struct GammaCorrectionFilter {
    gamma: f64,
    gamma_threshold: f64,
    scl_gamma: f64,
    vibrancy: f64,
    inverse_vibrancy: f64,
    background: RenderColor,
}

impl GammaCorrectionFilter {
    /// Reads gamma, its threshold, vibrancy and background from the
    /// scene.
    pub fn new(flame: &Flame) -> Self {
        let gamma = if flame.gamma > 0.0 {
            1.0 / flame.gamma
        } else {
            1.0
        };
        let gamma_threshold = flame.gamma_threshold.max(0.0);
        let scl_gamma = if gamma_threshold > 0.0 {
            gamma_threshold.powf(gamma - 1.0)
        } else {
            0.0
        };
        let vibrancy = num::clamp(flame.vibrancy, 0.0, 1.0);
        let [r, g, b] = flame.background;
        GammaCorrectionFilter {
            gamma,
            gamma_threshold,
            scl_gamma,
            vibrancy,
            inverse_vibrancy: 1.0 - vibrancy,
            background: RenderColor::from_rgb8(r, g, b),
        }
    }

    /// The gamma-corrected density.  Below the threshold the curve is
    /// blended towards a straight line so sparse areas are not blown up.
    #[inline]
    pub fn alpha(&self, intensity: f64) -> f64 {
        if intensity <= self.gamma_threshold {
            let frac = intensity / self.gamma_threshold;
            (1.0 - frac) * intensity * self.scl_gamma + frac * intensity.powf(self.gamma)
        } else {
            intensity.powf(self.gamma)
        }
    }

    /// Unclamped channels composited over the background, or `None`
    /// for an empty pixel.
    #[inline]
    fn channels(&self, point: &LogDensityPoint) -> Option<[f64; 3]> {
        if !(point.intensity > 0.0) {
            return None;
        }
        let alpha = self.alpha(point.intensity);
        let log_scl = self.vibrancy * alpha / point.intensity;
        let coverage = 1.0 - num::clamp(alpha, 0.0, 1.0);
        let channel = |value: f64, bg: f64| {
            let mut c = log_scl * value;
            if self.inverse_vibrancy > 0.0 {
                c += self.inverse_vibrancy * value.max(0.0).powf(self.gamma);
            }
            c + coverage * bg
        };
        Some([
            channel(point.red, self.background.red),
            channel(point.green, self.background.green),
            channel(point.blue, self.background.blue),
        ])
    }

    /// An 8-bit display pixel.
    pub fn transform_point(&self, point: &LogDensityPoint) -> Rgb<u8> {
        let [r, g, b] = match self.channels(point) {
            Some(c) => c,
            None => [
                self.background.red,
                self.background.green,
                self.background.blue,
            ],
        };
        Rgb([to_u8(r), to_u8(g), to_u8(b)])
    }

    /// A floating point pixel, not clamped above.
    pub fn transform_point_hdr(&self, point: &LogDensityPoint) -> Rgb<f32> {
        match self.channels(point) {
            Some([r, g, b]) => Rgb([r.max(0.0) as f32, g.max(0.0) as f32, b.max(0.0) as f32]),
            None => self.background_hdr(),
        }
    }

    /// The background as a floating point pixel.
    pub fn background_hdr(&self) -> Rgb<f32> {
        Rgb([
            self.background.red as f32,
            self.background.green as f32,
            self.background.blue as f32,
        ])
    }
}

#[inline]
fn to_u8(v: f64) -> u8 {
    (num::clamp(v, 0.0, 1.0) * 255.0 + 0.5) as u8
}

/// The density alone, as a gray floating point pixel.
pub fn intensity_pixel(point: &LogDensityPoint) -> Rgb<f32> {
    let i = point.intensity.max(0.0) as f32;
    Rgb([i, i, i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(background: [u8; 3], vibrancy: f64) -> GammaCorrectionFilter {
        GammaCorrectionFilter::new(&Flame {
            background,
            vibrancy,
            ..Flame::default()
        })
    }

    fn white(intensity: f64) -> LogDensityPoint {
        LogDensityPoint {
            red: intensity,
            green: intensity,
            blue: intensity,
            intensity,
        }
    }

    #[test]
    fn empty_pixels_show_the_background() {
        let f = filter([10, 20, 30], 1.0);
        let empty = LogDensityPoint::default();
        assert_eq!(f.transform_point(&empty), Rgb([10, 20, 30]));
        let hdr = f.transform_point_hdr(&empty);
        assert!((hdr[0] - 10.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn dense_white_saturates() {
        let f = filter([0, 0, 255], 1.0);
        assert_eq!(f.transform_point(&white(5.0)), Rgb([255, 255, 255]));
        let hdr = f.transform_point_hdr(&white(5.0));
        assert!(hdr[0] > 1.0);
    }

    #[test]
    fn alpha_is_continuous_at_the_threshold() {
        let f = filter([0, 0, 0], 1.0);
        let t = Flame::default().gamma_threshold;
        let below = f.alpha(t - 1e-9);
        let above = f.alpha(t + 1e-9);
        assert!((below - above).abs() < 1e-6);
        assert!(f.alpha(t / 10.0) < (t / 10.0).powf(0.25));
    }

    #[test]
    fn alpha_increases_with_density() {
        let f = filter([0, 0, 0], 1.0);
        let mut last = 0.0;
        for i in 1..100 {
            let a = f.alpha(i as f64 * 0.01);
            assert!(a > last);
            last = a;
        }
    }

    #[test]
    fn vibrancy_zero_gamma_corrects_each_channel() {
        let f = filter([0, 0, 0], 0.0);
        let p = LogDensityPoint {
            red: 0.5,
            green: 0.0,
            blue: 0.0,
            intensity: 0.5,
        };
        let Rgb([r, g, b]) = f.transform_point(&p);
        assert_eq!(r, to_u8(0.5f64.powf(0.25)));
        assert_eq!((g, b), (0, 0));
    }

    #[test]
    fn intensity_map_is_gray() {
        let Rgb([r, g, b]) = intensity_pixel(&white(0.3));
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!((r - 0.3).abs() < 1e-6);
    }
}
