//! Pointwise tone operations: grayscale conversion and gamma correction.
//!
//! Both are channel-uniform per-pixel maps, so they are offered in an
//! in-place form as well as the allocating form the registry uses.

use crate::buffer::{CHANNELS, PixelBuffer, to_byte};
use crate::params::Choice;

/// How RGB collapses to a single intensity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GrayscaleMethod {
    /// `0.299 R + 0.587 G + 0.114 B`.
    #[default]
    Luminance,
    /// Arithmetic mean of R, G and B.
    Average,
    /// Midpoint of the brightest and darkest channel.
    Lightness,
    /// Caller-supplied weights.
    Custom,
}

impl Choice for GrayscaleMethod {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("luminance", Self::Luminance),
        ("average", Self::Average),
        ("lightness", Self::Lightness),
        ("custom", Self::Custom),
    ];
}

/// Weights used by [`GrayscaleMethod::Custom`].
pub const DEFAULT_CUSTOM_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Replace R, G and B of every pixel with their combined intensity.
///
/// Alpha is left untouched. `weights` is only read for
/// [`GrayscaleMethod::Custom`].
pub fn grayscale_in_place(buf: &mut PixelBuffer, method: GrayscaleMethod, weights: [f64; 3]) {
    for px in buf.pixels_mut().chunks_exact_mut(CHANNELS) {
        let (r, g, b) = (f64::from(px[0]), f64::from(px[1]), f64::from(px[2]));
        let v = match method {
            GrayscaleMethod::Luminance => 0.114f64.mul_add(b, 0.299f64.mul_add(r, 0.587 * g)),
            GrayscaleMethod::Average => (r + g + b) / 3.0,
            GrayscaleMethod::Lightness => (r.max(g).max(b) + r.min(g).min(b)) / 2.0,
            GrayscaleMethod::Custom => weights[2].mul_add(b, weights[0].mul_add(r, weights[1] * g)),
        };
        let v = to_byte(v);
        px[0] = v;
        px[1] = v;
        px[2] = v;
    }
}

/// Allocating form of [`grayscale_in_place`].
#[must_use = "returns the grayscale buffer"]
pub fn grayscale(buf: &PixelBuffer, method: GrayscaleMethod, weights: [f64; 3]) -> PixelBuffer {
    let mut out = buf.clone();
    grayscale_in_place(&mut out, method, weights);
    out
}

/// Apply `255 * (v / 255)^(1 / gamma)` to R, G and B.
///
/// Non-positive or non-finite `gamma` leaves the buffer unchanged.
pub fn gamma_correct_in_place(buf: &mut PixelBuffer, gamma: f64) {
    if !(gamma.is_finite() && gamma > 0.0) {
        return;
    }
    let inv = 1.0 / gamma;
    let lut: Vec<u8> = (0..=255u8)
        .map(|v| to_byte(255.0 * (f64::from(v) / 255.0).powf(inv)))
        .collect();
    for px in buf.pixels_mut().chunks_exact_mut(CHANNELS) {
        for c in &mut px[..3] {
            *c = lut[usize::from(*c)];
        }
    }
}

/// Allocating form of [`gamma_correct_in_place`].
#[must_use = "returns the gamma-corrected buffer"]
pub fn gamma_correct(buf: &PixelBuffer, gamma: f64) -> PixelBuffer {
    let mut out = buf.clone();
    gamma_correct_in_place(&mut out, gamma);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_gradient() -> PixelBuffer {
        PixelBuffer::from_fn(16, 8, |x, y| {
            [
                (x * 16) as u8,
                (y * 32) as u8,
                ((x + y) * 9) as u8,
                200,
            ]
        })
    }

    #[test]
    fn pure_red_luminance() {
        let buf = PixelBuffer::from_pixel(1, 1, [255, 0, 0, 255]);
        let out = grayscale(&buf, GrayscaleMethod::Luminance, DEFAULT_CUSTOM_WEIGHTS);
        // 0.299 * 255 = 76.245
        assert_eq!(out.pixel(0, 0), [76, 76, 76, 255]);
    }

    #[test]
    fn average_and_lightness() {
        let buf = PixelBuffer::from_pixel(1, 1, [30, 60, 90, 255]);
        let avg = grayscale(&buf, GrayscaleMethod::Average, DEFAULT_CUSTOM_WEIGHTS);
        assert_eq!(avg.pixel(0, 0)[0], 60);
        let light = grayscale(&buf, GrayscaleMethod::Lightness, DEFAULT_CUSTOM_WEIGHTS);
        assert_eq!(light.pixel(0, 0)[0], 60);
    }

    #[test]
    fn custom_weights_pick_one_channel() {
        let buf = PixelBuffer::from_pixel(1, 1, [10, 20, 30, 255]);
        let out = grayscale(&buf, GrayscaleMethod::Custom, [0.0, 0.0, 1.0]);
        assert_eq!(out.pixel(0, 0), [30, 30, 30, 255]);
    }

    #[test]
    fn channels_equal_and_alpha_kept() {
        let out = grayscale(&color_gradient(), GrayscaleMethod::Luminance, DEFAULT_CUSTOM_WEIGHTS);
        for px in out.pixels().chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 200);
        }
    }

    #[test]
    fn grayscale_is_idempotent() {
        for method in [
            GrayscaleMethod::Luminance,
            GrayscaleMethod::Average,
            GrayscaleMethod::Lightness,
        ] {
            let once = grayscale(&color_gradient(), method, DEFAULT_CUSTOM_WEIGHTS);
            let twice = grayscale(&once, method, DEFAULT_CUSTOM_WEIGHTS);
            assert_eq!(once, twice, "{method:?} not idempotent");
        }
    }

    #[test]
    fn gamma_one_is_identity() {
        let buf = color_gradient();
        assert_eq!(gamma_correct(&buf, 1.0), buf);
    }

    #[test]
    fn gamma_above_one_brightens_midtones() {
        let buf = PixelBuffer::from_pixel(1, 1, [64, 128, 192, 255]);
        let out = gamma_correct(&buf, 2.2);
        let [r, g, b, a] = out.pixel(0, 0);
        assert!(r > 64 && g > 128 && b > 192);
        assert_eq!(a, 255);
    }

    #[test]
    fn gamma_keeps_black_and_white_fixed() {
        let buf = PixelBuffer::from_fn(2, 1, |x, _| if x == 0 { [0, 0, 0, 255] } else { [255; 4] });
        for g in [0.3, 0.7, 1.5, 2.2] {
            let out = gamma_correct(&buf, g);
            assert_eq!(out.pixel(0, 0), [0, 0, 0, 255]);
            assert_eq!(out.pixel(1, 0), [255; 4]);
        }
    }

    #[test]
    fn non_positive_gamma_is_ignored() {
        let buf = color_gradient();
        assert_eq!(gamma_correct(&buf, 0.0), buf);
        assert_eq!(gamma_correct(&buf, -1.0), buf);
    }
}
