//! Smoothing filters: Gaussian, median, bilateral and anisotropic diffusion.
//!
//! All window reads use clamp-to-edge addressing. Gaussian, median and
//! bilateral filters work on the colour channels directly; anisotropic
//! diffusion works on luminance and returns a gray buffer.

use image::{ImageBuffer, Luma};

use crate::buffer::{CHANNELS, PixelBuffer, clamp_coord, to_byte};
use crate::params::odd;

/// A normalized 1-D Gaussian kernel of `size` taps.
///
/// `size` is forced odd. A non-positive or non-finite `sigma` yields a
/// delta kernel (identity filter).
#[must_use = "returns the kernel weights"]
#[allow(clippy::cast_possible_wrap)]
pub fn gaussian_kernel_1d(size: u32, sigma: f64) -> Vec<f64> {
    let size = odd(size);
    let half = i64::from(size / 2);
    if !(sigma.is_finite() && sigma > 0.0) {
        let mut delta = vec![0.0; size as usize];
        delta[size as usize / 2] = 1.0;
        return delta;
    }
    let two_sigma_sq = 2.0 * sigma * sigma;
    #[allow(clippy::cast_precision_loss)]
    let mut kernel: Vec<f64> = (-half..=half)
        .map(|x| (-((x * x) as f64) / two_sigma_sq).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// A normalized `size x size` Gaussian kernel in row-major order: the
/// outer product of [`gaussian_kernel_1d`] with itself.
#[must_use = "returns the kernel weights"]
pub fn gaussian_kernel(size: u32, sigma: f64) -> Vec<f64> {
    let row = gaussian_kernel_1d(size, sigma);
    row.iter().flat_map(|&wy| row.iter().map(move |&wx| wx * wy)).collect()
}

/// Weighted sum of `sample(i)` over `centre - half ..= centre + half`.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn convolve_1d(kernel: &[f64], centre: i64, mut sample: impl FnMut(i64) -> f64) -> f64 {
    let half = (kernel.len() / 2) as i64;
    kernel
        .iter()
        .zip(centre - half..)
        .map(|(&w, i)| w * sample(i))
        .sum()
}

/// Convolve every channel (alpha included) with a Gaussian kernel.
///
/// Runs as a horizontal then a vertical 1-D pass, which is the same
/// clamp-to-edge 2-D convolution since both the kernel and the edge
/// clamping separate by axis.
#[must_use = "returns the blurred buffer"]
pub fn gaussian_blur(buf: &PixelBuffer, kernel_size: u32, sigma: f64) -> PixelBuffer {
    let size = odd(kernel_size);
    if size == 1 || buf.is_empty() {
        return buf.clone();
    }
    let kernel = gaussian_kernel_1d(size, sigma);
    let (w, h) = (buf.width(), buf.height());
    let at = |x: u32, y: i64| clamp_coord(y, h) as usize * w as usize + x as usize;

    let mut rows = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f64; 4];
            for (c, a) in acc.iter_mut().enumerate() {
                *a = convolve_1d(&kernel, i64::from(x), |i| f64::from(buf.clamped_pixel(i, i64::from(y))[c]));
            }
            rows.push(acc);
        }
    }

    PixelBuffer::from_fn(w, h, |x, y| {
        let mut out = [0u8; 4];
        for (c, o) in out.iter_mut().enumerate() {
            *o = to_byte(convolve_1d(&kernel, i64::from(y), |i| rows[at(x, i)][c]));
        }
        out
    })
}

/// Replace each colour channel by the median of its window.
///
/// Delegates to [`imageproc::filter::median_filter`] with a radius of
/// `kernel_size / 2`; alpha is kept from the source pixel.
#[must_use = "returns the filtered buffer"]
pub fn median_filter(buf: &PixelBuffer, kernel_size: u32) -> PixelBuffer {
    let size = odd(kernel_size);
    if size == 1 || buf.is_empty() {
        return buf.clone();
    }
    let radius = size / 2;
    let filtered = imageproc::filter::median_filter(&buf.to_rgba_image(), radius, radius);
    let mut out = PixelBuffer::from(filtered);
    for (dst, src) in out
        .pixels_mut()
        .chunks_exact_mut(CHANNELS)
        .zip(buf.pixels().chunks_exact(CHANNELS))
    {
        dst[3] = src[3];
    }
    out
}

/// Edge-preserving smoothing weighted by spatial and colour distance.
///
/// The weight of a neighbour is
/// `exp(-spatial² / 2σs²) · exp(-colour² / 2σc²)` where `colour` is the
/// Euclidean RGB distance to the centre pixel. Alpha is kept.
#[must_use = "returns the filtered buffer"]
pub fn bilateral_filter(
    buf: &PixelBuffer,
    diameter: u32,
    sigma_color: f64,
    sigma_space: f64,
) -> PixelBuffer {
    let half = i64::from(diameter / 2);
    if half == 0 || sigma_color <= 0.0 || sigma_space <= 0.0 {
        return buf.clone();
    }
    let two_space = 2.0 * sigma_space * sigma_space;
    let two_color = 2.0 * sigma_color * sigma_color;
    PixelBuffer::from_fn(buf.width(), buf.height(), |x, y| {
        let centre = buf.pixel(x, y);
        let mut acc = [0.0f64; 3];
        let mut total = 0.0;
        for dy in -half..=half {
            for dx in -half..=half {
                let p = buf.clamped_pixel(i64::from(x) + dx, i64::from(y) + dy);
                #[allow(clippy::cast_precision_loss)]
                let spatial = (dx * dx + dy * dy) as f64;
                let color: f64 = (0..3)
                    .map(|c| {
                        let d = f64::from(p[c]) - f64::from(centre[c]);
                        d * d
                    })
                    .sum();
                let w = (-spatial / two_space).exp() * (-color / two_color).exp();
                for (a, &c) in acc.iter_mut().zip(&p[..3]) {
                    *a += f64::from(c) * w;
                }
                total += w;
            }
        }
        // The centre pixel always contributes weight 1, so total > 0.
        [
            to_byte(acc[0] / total),
            to_byte(acc[1] / total),
            to_byte(acc[2] / total),
            centre[3],
        ]
    })
}

/// Perona-Malik diffusion on luminance.
///
/// Each iteration moves every interior pixel by `gamma` times the sum of
/// its four neighbour differences, each weighted by the conductance
/// `exp(-(∇/kappa)²)`. The outermost rows and columns stay fixed. Returns
/// a gray buffer. A non-positive `kappa` returns the luminance unchanged.
#[must_use = "returns the diffused buffer"]
pub fn anisotropic_diffusion(buf: &PixelBuffer, iterations: u32, kappa: f64, gamma: f64) -> PixelBuffer {
    let (w, h) = (buf.width(), buf.height());
    let gray = buf.to_luma();
    let mut cur: ImageBuffer<Luma<f64>, Vec<f64>> =
        ImageBuffer::from_fn(w, h, |x, y| Luma([f64::from(gray.get_pixel(x, y).0[0])]));
    if kappa > 0.0 && w > 2 && h > 2 {
        let conduct = |d: f64| (-(d / kappa) * (d / kappa)).exp();
        for _ in 0..iterations {
            let prev = cur.clone();
            for y in 1..h - 1 {
                for x in 1..w - 1 {
                    let c = prev.get_pixel(x, y).0[0];
                    let n = prev.get_pixel(x, y - 1).0[0] - c;
                    let s = prev.get_pixel(x, y + 1).0[0] - c;
                    let e = prev.get_pixel(x + 1, y).0[0] - c;
                    let wst = prev.get_pixel(x - 1, y).0[0] - c;
                    let flux = conduct(n) * n + conduct(s) * s + conduct(e) * e + conduct(wst) * wst;
                    cur.put_pixel(x, y, Luma([gamma.mul_add(flux, c)]));
                }
            }
        }
    }
    let out = crate::buffer::luma_from_fn(w, h, |x, y| to_byte(cur.get_pixel(x, y).0[0]));
    PixelBuffer::from_luma(&out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Black left half, white right half, split at x=5.
    fn sharp_edge_image() -> PixelBuffer {
        PixelBuffer::from_fn(10, 10, |x, _y| if x < 5 { [0, 0, 0, 255] } else { [255; 4] })
    }

    // ─────────────────────────── gaussian ───────────────────────────

    #[test]
    fn kernel_sums_to_one() {
        for size in [1, 3, 5, 7, 11, 15] {
            for sigma in [0.1, 0.3, 1.0, 1.4, 2.0, 4.0, 5.0] {
                let sum: f64 = gaussian_kernel(size, sigma).iter().sum();
                assert!((sum - 1.0).abs() < 1e-6, "size {size} sigma {sigma}: {sum}");
            }
        }
    }

    #[test]
    fn kernel_even_size_rounds_up() {
        assert_eq!(gaussian_kernel(4, 1.0).len(), 25);
    }

    #[test]
    fn kernel_is_symmetric_and_peaks_in_centre() {
        let k = gaussian_kernel(5, 1.0);
        assert!((k[0] - k[24]).abs() < 1e-12);
        assert!((k[4] - k[20]).abs() < 1e-12);
        assert!(k.iter().all(|&w| w <= k[12]));
    }

    #[test]
    fn zero_sigma_kernel_is_delta() {
        let k = gaussian_kernel(3, 0.0);
        assert!((k[4] - 1.0).abs() < f64::EPSILON);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn blur_smooths_sharp_edge() {
        let out = gaussian_blur(&sharp_edge_image(), 5, 1.4);
        let left = out.pixel(4, 5)[0];
        let right = out.pixel(5, 5)[0];
        assert!(left > 0 && left < 128, "left of edge: {left}");
        assert!(right > 128 && right < 255, "right of edge: {right}");
    }

    #[test]
    fn blur_matches_direct_2d_convolution() {
        let buf = PixelBuffer::from_fn(8, 6, |x, y| [((x * 31 + y * 47) % 256) as u8, (y * 40) as u8, (x * 30) as u8, 255]);
        let kernel = gaussian_kernel(5, 1.2);
        let out = gaussian_blur(&buf, 5, 1.2);
        for y in 0..6u32 {
            for x in 0..8u32 {
                let mut acc = [0.0f64; 4];
                let mut k = kernel.iter();
                for dy in -2..=2i64 {
                    for dx in -2..=2i64 {
                        let w = k.next().unwrap();
                        let p = buf.clamped_pixel(i64::from(x) + dx, i64::from(y) + dy);
                        for (a, &c) in acc.iter_mut().zip(&p) {
                            *a += f64::from(c) * w;
                        }
                    }
                }
                for (c, a) in acc.iter().enumerate() {
                    let got = i32::from(out.pixel(x, y)[c]);
                    assert!((got - i32::from(to_byte(*a))).abs() <= 1, "({x},{y}) channel {c}");
                }
            }
        }
    }

    #[test]
    fn one_dimensional_kernel_is_normalized() {
        let k = gaussian_kernel_1d(40_001, 6_667.0);
        assert_eq!(k.len(), 40_001);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blur_uniform_unchanged() {
        let buf = PixelBuffer::from_pixel(9, 9, [100, 150, 200, 250]);
        assert_eq!(gaussian_blur(&buf, 7, 2.0), buf);
    }

    #[test]
    fn blur_size_one_is_identity() {
        let buf = sharp_edge_image();
        assert_eq!(gaussian_blur(&buf, 1, 3.0), buf);
    }

    // ─────────────────────────── median ───────────────────────────

    #[test]
    fn median_removes_salt_noise() {
        let mut buf = PixelBuffer::from_pixel(7, 7, [50, 50, 50, 255]);
        buf.put_pixel(3, 3, [255, 255, 255, 255]);
        let out = median_filter(&buf, 3);
        assert_eq!(out.pixel(3, 3), [50, 50, 50, 255]);
    }

    #[test]
    fn median_channels_are_independent() {
        let buf = PixelBuffer::from_fn(3, 3, |x, y| {
            if (x, y) == (1, 1) {
                [200, 0, 0, 77]
            } else {
                [10, 20, 30, 255]
            }
        });
        assert_eq!(median_filter(&buf, 3).pixel(1, 1), [10, 20, 30, 77]);
    }

    #[test]
    fn median_matches_window_sort() {
        let buf = PixelBuffer::from_fn(9, 7, |x, y| {
            [((x * 53 + y * 29) % 256) as u8, ((x * x + 7 * y) % 256) as u8, (x * 20) as u8, 200]
        });
        for size in [3, 5, 7] {
            let half = i64::from(size / 2);
            let out = median_filter(&buf, size);
            for y in 0..7u32 {
                for x in 0..9u32 {
                    let mut expected = buf.pixel(x, y);
                    for c in 0..3 {
                        let mut window: Vec<u8> = (-half..=half)
                            .flat_map(|dy| (-half..=half).map(move |dx| (dx, dy)))
                            .map(|(dx, dy)| buf.clamped_pixel(i64::from(x) + dx, i64::from(y) + dy)[c])
                            .collect();
                        window.sort_unstable();
                        expected[c] = window[window.len() / 2];
                    }
                    assert_eq!(out.pixel(x, y), expected, "size {size} at ({x},{y})");
                }
            }
        }
    }

    // ─────────────────────────── bilateral ───────────────────────────

    #[test]
    fn bilateral_preserves_strong_edge() {
        let out = bilateral_filter(&sharp_edge_image(), 9, 25.0, 75.0);
        assert!(out.pixel(4, 5)[0] < 10);
        assert!(out.pixel(5, 5)[0] > 245);
    }

    #[test]
    fn bilateral_smooths_small_noise() {
        let buf = PixelBuffer::from_fn(9, 9, |x, y| {
            let v = if (x + y) % 2 == 0 { 100 } else { 110 };
            [v, v, v, 255]
        });
        let out = bilateral_filter(&buf, 5, 75.0, 75.0);
        let v = out.pixel(4, 4)[0];
        assert!((102..=108).contains(&v), "got {v}");
    }

    // ─────────────────────────── diffusion ───────────────────────────

    #[test]
    fn diffusion_keeps_border_fixed() {
        let buf = PixelBuffer::from_fn(8, 8, |x, y| {
            let v = ((x * 31 + y * 17) % 256) as u8;
            [v, v, v, 255]
        });
        let out = anisotropic_diffusion(&buf, 10, 30.0, 0.2);
        for i in 0..8 {
            assert_eq!(out.pixel(i, 0), buf.pixel(i, 0));
            assert_eq!(out.pixel(0, i), buf.pixel(0, i));
            assert_eq!(out.pixel(i, 7), buf.pixel(i, 7));
            assert_eq!(out.pixel(7, i), buf.pixel(7, i));
        }
    }

    #[test]
    fn diffusion_flattens_low_contrast_noise() {
        let buf = PixelBuffer::from_fn(12, 12, |x, y| {
            let v = if (x + y) % 2 == 0 { 120 } else { 130 };
            [v, v, v, 255]
        });
        let out = anisotropic_diffusion(&buf, 10, 30.0, 0.2);
        let before = i32::from(buf.pixel(6, 6)[0]) - i32::from(buf.pixel(6, 7)[0]);
        let after = i32::from(out.pixel(6, 6)[0]) - i32::from(out.pixel(6, 7)[0]);
        assert!(after.abs() < before.abs());
    }

    #[test]
    fn diffusion_zero_iterations_is_gray_copy() {
        let buf = sharp_edge_image();
        assert_eq!(anisotropic_diffusion(&buf, 0, 30.0, 0.2), buf);
    }
}
