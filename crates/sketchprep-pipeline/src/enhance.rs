//! Contrast enhancement: unsharp masking and CLAHE.

use crate::blur::gaussian_blur;
use crate::buffer::{PixelBuffer, luma_from_fn, to_byte};

/// Sharpen by adding back the difference from a blurred copy.
///
/// The blur uses `sigma = radius` and a kernel of `ceil(2 * radius)`
/// rounded up to odd. A channel changes only where
/// `|orig - blurred| > threshold`. Alpha is kept.
#[must_use = "returns the sharpened buffer"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn unsharp_mask(buf: &PixelBuffer, radius: f64, amount: f64, threshold: f64) -> PixelBuffer {
    if !(radius.is_finite() && radius > 0.0) {
        return buf.clone();
    }
    let size = ((radius * 2.0).ceil().clamp(1.0, 255.0) as u32) | 1;
    let blurred = gaussian_blur(buf, size, radius);
    let mut out = buf.clone();
    for (o, b) in out
        .pixels_mut()
        .chunks_exact_mut(4)
        .zip(blurred.pixels().chunks_exact(4))
    {
        for c in 0..3 {
            let diff = f64::from(o[c]) - f64::from(b[c]);
            if diff.abs() > threshold {
                o[c] = to_byte(amount.mul_add(diff, f64::from(o[c])));
            }
        }
    }
    out
}

/// Contrast Limited Adaptive Histogram Equalization on luminance.
///
/// The image is split into a `tile_grid x tile_grid` grid (fewer tiles
/// when the image is smaller than the grid). Tile edges come from integer
/// division, so remainder pixels join the last row or column of tiles.
/// Each tile's 256-bin histogram is clipped at
/// `floor(clip_limit * pixels / 256)` (at least 1), the clipped excess is
/// spread evenly over all bins, and pixels are mapped through the tile's
/// cumulative distribution. No interpolation between tiles. Returns a gray
/// buffer.
#[must_use = "returns the equalized buffer"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn clahe(buf: &PixelBuffer, clip_limit: f64, tile_grid: u32) -> PixelBuffer {
    let (w, h) = (buf.width(), buf.height());
    let gray = buf.to_luma();
    let grid_x = tile_grid.clamp(1, w.max(1));
    let grid_y = tile_grid.clamp(1, h.max(1));
    let edge = |i: u32, grid: u32, len: u32| (u64::from(i) * u64::from(len) / u64::from(grid)) as u32;

    let mut out = gray.clone();
    for ty in 0..grid_y {
        let (y0, y1) = (edge(ty, grid_y, h), edge(ty + 1, grid_y, h));
        for tx in 0..grid_x {
            let (x0, x1) = (edge(tx, grid_x, w), edge(tx + 1, grid_x, w));
            let count = u64::from(x1 - x0) * u64::from(y1 - y0);
            if count == 0 {
                continue;
            }

            let mut hist = [0u64; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[usize::from(gray.get_pixel(x, y).0[0])] += 1;
                }
            }

            let clip = ((clip_limit.max(0.0) * count as f64 / 256.0).floor() as u64).max(1);
            let mut excess = 0;
            for bin in &mut hist {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let share = excess as f64 / 256.0;
            let mut lut = [0u8; 256];
            let mut cdf = 0.0;
            for (v, &bin) in hist.iter().enumerate() {
                cdf += bin as f64 + share;
                lut[v] = to_byte(cdf / count as f64 * 255.0);
            }

            for y in y0..y1 {
                for x in x0..x1 {
                    let v = gray.get_pixel(x, y).0[0];
                    out.put_pixel(x, y, image::Luma([lut[usize::from(v)]]));
                }
            }
        }
    }
    PixelBuffer::from_luma(&luma_from_fn(w, h, |x, y| out.get_pixel(x, y).0[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            let v = f(x, y);
            [v, v, v, 255]
        })
    }

    // ─────────────────────────── unsharp ───────────────────────────

    #[test]
    fn unsharp_increases_edge_contrast() {
        let buf = gray(10, 10, |x, _| if x < 5 { 80 } else { 170 });
        let out = unsharp_mask(&buf, 1.5, 1.5, 3.0);
        assert!(out.pixel(4, 5)[0] < 80);
        assert!(out.pixel(5, 5)[0] > 170);
    }

    #[test]
    fn unsharp_leaves_flat_regions() {
        let buf = gray(10, 10, |x, _| if x < 5 { 80 } else { 170 });
        let out = unsharp_mask(&buf, 1.0, 1.5, 3.0);
        assert_eq!(out.pixel(0, 0), buf.pixel(0, 0));
        assert_eq!(out.pixel(9, 9), buf.pixel(9, 9));
    }

    #[test]
    fn unsharp_high_threshold_is_identity() {
        let buf = gray(10, 10, |x, _| if x < 5 { 80 } else { 170 });
        assert_eq!(unsharp_mask(&buf, 1.5, 2.0, 255.0), buf);
    }

    // ─────────────────────────── clahe ───────────────────────────

    #[test]
    fn clahe_stretches_low_contrast_tile() {
        let buf = gray(16, 16, |x, y| 100 + ((x + y) % 8) as u8);
        let out = clahe(&buf, 40.0, 1);
        let lo = out.pixels().chunks_exact(4).map(|p| p[0]).min().unwrap_or(0);
        let hi = out.pixels().chunks_exact(4).map(|p| p[0]).max().unwrap_or(0);
        assert!(hi - lo > 150, "range {lo}..{hi}");
    }

    #[test]
    fn clahe_covers_remainder_pixels() {
        // 10 is not divisible by 3; every pixel must still be mapped.
        let buf = gray(10, 10, |_, _| 200);
        let out = clahe(&buf, 2.0, 3);
        assert!(out.pixels().chunks_exact(4).all(|p| p[0] > 0));
    }

    #[test]
    fn clahe_grid_larger_than_image() {
        let buf = gray(3, 2, |x, _| (x * 100) as u8);
        let out = clahe(&buf, 3.0, 8);
        assert_eq!(out.dimensions(), buf.dimensions());
    }

    #[test]
    fn clahe_output_is_gray() {
        let buf = PixelBuffer::from_fn(8, 8, |x, y| [(x * 30) as u8, (y * 30) as u8, 90, 255]);
        let out = clahe(&buf, 3.0, 2);
        for p in out.pixels().chunks_exact(4) {
            assert!(p[0] == p[1] && p[1] == p[2]);
        }
    }
}
