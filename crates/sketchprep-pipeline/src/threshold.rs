//! Global and local thresholding.
//!
//! Every function reads luminance and returns an opaque gray buffer in
//! which the "above threshold" side is 255 (paper, for a dark-on-light
//! sketch) unless the threshold type is inverted.

use image::GrayImage;

use crate::buffer::{BoxStats, PixelBuffer, clamp_coord, clamped_luma, luma_from_fn};
use crate::params::{Choice, odd};

/// Which side of the threshold becomes white.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThresholdType {
    /// `v > t` → high value.
    #[default]
    Binary,
    /// `v > t` → 0.
    BinaryInv,
}

impl Choice for ThresholdType {
    const OPTIONS: &'static [(&'static str, Self)] =
        &[("binary", Self::Binary), ("binary_inv", Self::BinaryInv)];
}

impl ThresholdType {
    const fn pick(self, above: bool, high: u8) -> u8 {
        match (self, above) {
            (Self::Binary, true) | (Self::BinaryInv, false) => high,
            _ => 0,
        }
    }
}

/// How the local reference level is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdaptiveMethod {
    /// Unweighted window mean.
    Mean,
    /// Gaussian-weighted window mean with `sigma = block_size / 6`.
    #[default]
    Gaussian,
}

impl Choice for AdaptiveMethod {
    const OPTIONS: &'static [(&'static str, Self)] =
        &[("mean", Self::Mean), ("gaussian", Self::Gaussian)];
}

/// 256-bin histogram of an image.
#[must_use]
pub fn histogram(img: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[usize::from(p.0[0])] += 1;
    }
    hist
}

/// Otsu's threshold: the level maximizing between-class variance
/// `wB * wF * (mB - mF)²`, with class 0 being `v <= t`.
///
/// When several consecutive levels share the maximum (empty bins between
/// two peaks) the middle of that run is returned. A histogram with fewer
/// than two occupied bins yields 0.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn otsu_level(hist: &[u64; 256]) -> u8 {
    let total: u64 = hist.iter().sum();
    let sum: f64 = hist
        .iter()
        .zip(0u32..)
        .map(|(&n, v)| f64::from(v) * n as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut w_b = 0u64;
    let mut best = 0.0;
    let mut run = (0u8, 0u8);
    for (t, &n) in (0u8..=255).zip(hist.iter()) {
        w_b += n;
        if w_b == 0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0 {
            break;
        }
        sum_b += f64::from(t) * n as f64;
        let m_b = sum_b / w_b as f64;
        let m_f = (sum - sum_b) / w_f as f64;
        let between = w_b as f64 * w_f as f64 * (m_b - m_f) * (m_b - m_f);
        if between > best {
            best = between;
            run = (t, t);
        } else if between == best && best > 0.0 && run.1.checked_add(1) == Some(t) {
            // Identical inputs give bit-identical variance across a gap.
            run.1 = t;
        }
    }
    run.0 + (run.1 - run.0) / 2
}

/// Global Otsu binarization.
#[must_use = "returns the thresholded buffer"]
pub fn otsu_threshold(buf: &PixelBuffer, kind: ThresholdType) -> PixelBuffer {
    let gray = buf.to_luma();
    let t = otsu_level(&histogram(&gray));
    let out = luma_from_fn(gray.width(), gray.height(), |x, y| {
        kind.pick(gray.get_pixel(x, y).0[0] > t, 255)
    });
    PixelBuffer::from_luma(&out)
}

/// Two thresholds `(t1, t2)` maximizing the three-class between-class
/// variance, searched exhaustively over `1 <= t1 < t2 < 255`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn multi_otsu_levels(hist: &[u64; 256]) -> (u8, u8) {
    // Prefix counts and prefix intensity sums, index i covers bins 0..i.
    let mut count = [0.0f64; 257];
    let mut mass = [0.0f64; 257];
    for (i, &n) in hist.iter().enumerate() {
        count[i + 1] = count[i] + n as f64;
        mass[i + 1] = (i as f64).mul_add(n as f64, mass[i]);
    }
    let total = count[256];
    if total == 0.0 {
        return (0, 0);
    }
    let mu_t = mass[256] / total;
    let class = |lo: usize, hi: usize| {
        let w = count[hi] - count[lo];
        if w == 0.0 {
            return None;
        }
        let mu = (mass[hi] - mass[lo]) / w;
        Some(w * (mu - mu_t) * (mu - mu_t))
    };

    let mut best = 0.0;
    let mut levels = (0u8, 0u8);
    for t1 in 1u8..254 {
        for t2 in t1 + 1..255 {
            let (a, b) = (usize::from(t1) + 1, usize::from(t2) + 1);
            let (Some(c0), Some(c1), Some(c2)) = (class(0, a), class(a, b), class(b, 256)) else {
                continue;
            };
            let variance = c0 + c1 + c2;
            if variance > best {
                best = variance;
                levels = (t1, t2);
            }
        }
    }
    levels
}

/// Multi-level Otsu quantization.
///
/// Three or more classes produce the three-class result (0 / 128 / 255);
/// larger class counts are not implemented and fall back to three. Two or
/// fewer classes produce a plain Otsu binarization.
#[must_use = "returns the quantized buffer"]
pub fn multi_otsu(buf: &PixelBuffer, classes: u32) -> PixelBuffer {
    if classes <= 2 {
        return otsu_threshold(buf, ThresholdType::Binary);
    }
    let gray = buf.to_luma();
    let (t1, t2) = multi_otsu_levels(&histogram(&gray));
    let out = luma_from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        if v <= t1 {
            0
        } else if v <= t2 {
            128
        } else {
            255
        }
    });
    PixelBuffer::from_luma(&out)
}

/// Local threshold: a pixel is "above" when it exceeds its
/// neighbourhood mean minus `c`.
#[must_use = "returns the thresholded buffer"]
pub fn adaptive_threshold(
    buf: &PixelBuffer,
    max_value: u8,
    method: AdaptiveMethod,
    kind: ThresholdType,
    block_size: u32,
    c: f64,
) -> PixelBuffer {
    let gray = buf.to_luma();
    let block = odd(block_size);
    let half = block / 2;
    let out = match method {
        AdaptiveMethod::Mean => {
            let stats = BoxStats::new(&gray, half);
            luma_from_fn(gray.width(), gray.height(), |x, y| {
                let v = f64::from(gray.get_pixel(x, y).0[0]);
                kind.pick(v > stats.mean(x, y) - c, max_value)
            })
        }
        AdaptiveMethod::Gaussian => {
            let weights = crate::blur::gaussian_kernel_1d(block, f64::from(block) / 6.0);
            let (w, h) = gray.dimensions();
            let rows: Vec<f64> = (0..h)
                .flat_map(|y| (0..w).map(move |x| (x, y)))
                .map(|(x, y)| {
                    crate::blur::convolve_1d(&weights, i64::from(x), |i| {
                        f64::from(clamped_luma(&gray, i, i64::from(y)))
                    })
                })
                .collect();
            luma_from_fn(w, h, |x, y| {
                let mean = crate::blur::convolve_1d(&weights, i64::from(y), |i| {
                    rows[clamp_coord(i, h) as usize * w as usize + x as usize]
                });
                let v = f64::from(gray.get_pixel(x, y).0[0]);
                kind.pick(v > mean - c, max_value)
            })
        }
    };
    PixelBuffer::from_luma(&out)
}

/// Sauvola binarization with dynamic range 128.
///
/// The local threshold is `mean * (1 + k * (stddev / 128 - 1))` over a
/// `window x window` neighbourhood; pixels above it become 255.
#[must_use = "returns the thresholded buffer"]
pub fn sauvola_threshold(buf: &PixelBuffer, window: u32, k: f64) -> PixelBuffer {
    let gray = buf.to_luma();
    let stats = BoxStats::new(&gray, odd(window) / 2);
    let out = luma_from_fn(gray.width(), gray.height(), |x, y| {
        let mean = stats.mean(x, y);
        let t = mean * k.mul_add(stats.variance(x, y).sqrt() / 128.0 - 1.0, 1.0);
        if f64::from(gray.get_pixel(x, y).0[0]) > t { 255 } else { 0 }
    });
    PixelBuffer::from_luma(&out)
}
