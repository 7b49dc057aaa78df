//! Shading and texture suppression.
//!
//! Each filter measures a local statistic over a clamped window and
//! repaints pixels that look like flat or textured fill as paper (255),
//! leaving line pixels at their gray value.

use image::GrayImage;

use crate::buffer::{BoxStats, PixelBuffer, clamped_luma, luma_from_fn, to_byte};
use crate::components::BinaryMask;
use crate::morphology::{MorphologyOp, StructuringElement, apply_gray};
use crate::params::{Choice, odd};

/// Local statistic used by [`shading_removal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShadingMetric {
    /// Window variance, compared against `threshold * 100`.
    #[default]
    Variance,
    /// Shannon entropy of the window histogram in bits, compared against
    /// `threshold * 4`.
    Entropy,
    /// Mean absolute step between raster-adjacent window samples,
    /// compared against `threshold * 100`.
    Gradient,
}

impl Choice for ShadingMetric {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("variance", Self::Variance),
        ("entropy", Self::Entropy),
        ("gradient", Self::Gradient),
    ];
}

/// Window samples around `(x, y)` in raster order.
fn window(gray: &GrayImage, x: u32, y: u32, half: i64, out: &mut Vec<u8>) {
    out.clear();
    for dy in -half..=half {
        for dx in -half..=half {
            out.push(clamped_luma(gray, i64::from(x) + dx, i64::from(y) + dy));
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn entropy(samples: &[u8]) -> f64 {
    let mut hist = [0u32; 256];
    for &v in samples {
        hist[usize::from(v)] += 1;
    }
    let n = samples.len() as f64;
    hist.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / n;
            -p * p.log2()
        })
        .sum()
}

#[allow(clippy::cast_precision_loss)]
fn mean_step(samples: &[u8]) -> f64 {
    let total: u32 = samples
        .windows(2)
        .map(|w| u32::from(w[0].abs_diff(w[1])))
        .sum();
    f64::from(total) / samples.len() as f64
}

/// Repaint low-activity regions as paper.
///
/// A pixel whose window metric falls below the scaled `threshold` becomes
/// 255. When `morph_close > 1` the result is passed through a single
/// `morph_close`-square closing pass, which thickens the surviving ink.
#[must_use = "returns the filtered buffer"]
pub fn shading_removal(
    buf: &PixelBuffer,
    metric: ShadingMetric,
    window_size: u32,
    threshold: f64,
    morph_close: u32,
) -> PixelBuffer {
    let gray = buf.to_luma();
    let size = odd(window_size);
    let half = i64::from(size / 2);

    let out = match metric {
        ShadingMetric::Variance => {
            let stats = BoxStats::new(&gray, size / 2);
            luma_from_fn(gray.width(), gray.height(), |x, y| {
                if stats.variance(x, y) < threshold * 100.0 {
                    255
                } else {
                    gray.get_pixel(x, y).0[0]
                }
            })
        }
        ShadingMetric::Entropy | ShadingMetric::Gradient => {
            let mut samples = Vec::with_capacity((size * size) as usize);
            luma_from_fn(gray.width(), gray.height(), |x, y| {
                window(&gray, x, y, half, &mut samples);
                let flat = if metric == ShadingMetric::Entropy {
                    entropy(&samples) < threshold * 4.0
                } else {
                    mean_step(&samples) < threshold * 100.0
                };
                if flat { 255 } else { gray.get_pixel(x, y).0[0] }
            })
        }
    };

    let out = if morph_close > 1 {
        apply_gray(&out, MorphologyOp::Closing, &StructuringElement::square(morph_close))
    } else {
        out
    };
    PixelBuffer::from_luma(&out)
}

/// Variance filter.
///
/// With `preserve_edges` flat pixels (variance below `threshold`) become
/// paper and the rest keep their value; otherwise the output is the
/// variance map itself, saturated at 255.
#[must_use = "returns the filtered buffer"]
pub fn intensity_variance(buf: &PixelBuffer, kernel_size: u32, threshold: f64, preserve_edges: bool) -> PixelBuffer {
    let gray = buf.to_luma();
    let stats = BoxStats::new(&gray, odd(kernel_size) / 2);
    let out = luma_from_fn(gray.width(), gray.height(), |x, y| {
        let variance = stats.variance(x, y);
        if !preserve_edges {
            to_byte(variance)
        } else if variance < threshold {
            255
        } else {
            gray.get_pixel(x, y).0[0]
        }
    });
    PixelBuffer::from_luma(&out)
}

/// Local energy filter.
///
/// Energy is the sum of squared differences between the centre and every
/// sample of a `filter_size` window, normalized to a 3x3 window so the
/// threshold keeps its meaning across sizes. Pixels with energy below
/// `energy_threshold * 10000` become paper.
#[must_use = "returns the filtered buffer"]
pub fn texture_segmentation(buf: &PixelBuffer, filter_size: u32, energy_threshold: f64) -> PixelBuffer {
    let gray = buf.to_luma();
    let stats = BoxStats::new(&gray, odd(filter_size) / 2);
    let limit = energy_threshold * 10_000.0;
    let out = luma_from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        let offset = stats.mean(x, y) - f64::from(v);
        // Σ(s - c)² / n = variance + (mean - c)²
        let energy = 9.0 * offset.mul_add(offset, stats.variance(x, y));
        if energy < limit { 255 } else { v }
    });
    PixelBuffer::from_luma(&out)
}

/// Pixels darker than `intensity_ceiling` whose local variance is below
/// `variance_threshold`: the flat gray fill of pencil shading.
#[must_use]
pub fn flat_dark_mask(gray: &GrayImage, window_size: u32, variance_threshold: f64, intensity_ceiling: u8) -> BinaryMask {
    let stats = BoxStats::new(gray, odd(window_size) / 2);
    let mut mask = BinaryMask::new(gray.width(), gray.height());
    for (x, y, p) in gray.enumerate_pixels() {
        if p.0[0] < intensity_ceiling && stats.variance(x, y) < variance_threshold {
            mask.set(x, y, true);
        }
    }
    mask
}
