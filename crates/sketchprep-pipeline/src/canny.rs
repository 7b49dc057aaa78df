//! Canny edge detection.
//!
//! Luminance → Gaussian blur → Sobel gradients → non-maximum suppression
//! over four direction classes → hysteresis with 8-neighbour linking.
//!
//! The gradient and suppression steps follow `imageproc::edges::canny`;
//! hysteresis bounds-checks every neighbour and visits all eight of them
//! (the upstream version wraps at `x = 0` and skips two neighbours, see
//! <https://github.com/image-rs/imageproc/issues/705>).

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

use crate::blur::gaussian_blur;
use crate::buffer::PixelBuffer;

/// Sigma of the pre-blur.
pub const BLUR_SIGMA: f64 = 1.4;

/// Run the full detector and return a binary (0/255) gray buffer.
///
/// `gaussian_kernel` is the pre-blur kernel size (forced odd). With
/// `l2_gradient` the gradient magnitude is `sqrt(gx² + gy²)`, otherwise
/// `|gx| + |gy|`. Thresholds are swapped if given in the wrong order.
#[must_use = "returns the edge map"]
pub fn canny(buf: &PixelBuffer, low: f32, high: f32, gaussian_kernel: u32, l2_gradient: bool) -> PixelBuffer {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let blurred = gaussian_blur(buf, gaussian_kernel, BLUR_SIGMA).to_luma();

    let gx: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_VERTICAL_3X3);
    let g: Image<Luma<f32>> = Image::from_fn(blurred.width(), blurred.height(), |x, y| {
        let h = f32::from(gx.get_pixel(x, y).0[0]);
        let v = f32::from(gy.get_pixel(x, y).0[0]);
        Luma([if l2_gradient { h.hypot(v) } else { h.abs() + v.abs() }])
    });

    let thinned = non_maximum_suppression(&g, &gx, &gy);
    PixelBuffer::from_luma(&hysteresis(&thinned, low, high))
}

/// Keep only pixels that are local maxima along their gradient direction.
fn non_maximum_suppression(
    g: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
) -> Image<Luma<f32>> {
    let (w, h) = (g.width(), g.height());
    let mut out = Image::from_pixel(w, h, Luma([0.0]));
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut angle = f32::from(gy.get_pixel(x, y).0[0])
                .atan2(f32::from(gx.get_pixel(x, y).0[0]))
                .to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            // Neighbours across the edge, for each 45° direction class.
            let (a, b) = if !(22.5..157.5).contains(&angle) {
                ((x - 1, y), (x + 1, y))
            } else if angle < 67.5 {
                ((x + 1, y + 1), (x - 1, y - 1))
            } else if angle < 112.5 {
                ((x, y - 1), (x, y + 1))
            } else {
                ((x - 1, y + 1), (x + 1, y - 1))
            };
            let pixel = g.get_pixel(x, y).0[0];
            if pixel >= g.get_pixel(a.0, a.1).0[0] && pixel >= g.get_pixel(b.0, b.1).0[0] {
                out.put_pixel(x, y, Luma([pixel]));
            }
        }
    }
    out
}

/// Double threshold with iterative 8-neighbour linking of weak edges.
fn hysteresis(input: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    let (w, h) = (input.width(), input.height());
    let mut out = GrayImage::new(w, h);
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if input.get_pixel(x, y).0[0] < high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, Luma([255]));
            stack.push((x, y));
            while let Some((nx, ny)) = stack.pop() {
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (Ok(px), Ok(py)) = (
                            u32::try_from(i64::from(nx) + dx),
                            u32::try_from(i64::from(ny) + dy),
                        ) else {
                            continue;
                        };
                        if px >= w || py >= h {
                            continue;
                        }
                        if input.get_pixel(px, py).0[0] >= low && out.get_pixel(px, py).0[0] == 0 {
                            out.put_pixel(px, py, Luma([255]));
                            stack.push((px, py));
                        }
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(width: u32, at: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, width, |x, _| if x < at { [0, 0, 0, 255] } else { [255; 4] })
    }

    fn count_edges(buf: &PixelBuffer) -> usize {
        buf.pixels().chunks_exact(4).filter(|p| p[0] > 0).count()
    }

    /// Hysteresis reaching the image border must not underflow.
    #[test]
    fn border_edge_does_not_panic() {
        let buf = PixelBuffer::from_fn(10, 10, |x, _| if x == 1 { [255; 4] } else { [0, 0, 0, 255] });
        let _edges = canny(&buf, 1.0, 2.0, 3, true);
    }

    #[test]
    fn output_dimensions_match_input() {
        let out = canny(&PixelBuffer::new(17, 31), 50.0, 150.0, 5, true);
        assert_eq!(out.width(), 17);
        assert_eq!(out.height(), 31);
    }

    #[test]
    fn sharp_edge_detected() {
        let out = canny(&split(20, 10), 50.0, 150.0, 5, true);
        assert!(count_edges(&out) > 0);
    }

    #[test]
    fn edge_is_thin() {
        let out = canny(&split(20, 10), 50.0, 150.0, 5, true);
        // Away from the top and bottom rows, each row has a narrow edge.
        for y in 3..17 {
            let row = (0..20).filter(|&x| out.pixel(x, y)[0] > 0).count();
            assert!((1..=2).contains(&row), "row {y} has {row} edge pixels");
        }
    }

    #[test]
    fn flat_image_has_no_edges() {
        let out = canny(&PixelBuffer::from_pixel(12, 12, [128, 128, 128, 255]), 10.0, 20.0, 5, false);
        assert_eq!(count_edges(&out), 0);
    }

    #[test]
    fn swapped_thresholds_are_tolerated() {
        let a = canny(&split(20, 10), 150.0, 50.0, 5, true);
        let b = canny(&split(20, 10), 50.0, 150.0, 5, true);
        assert_eq!(a, b);
    }

    #[test]
    fn l1_magnitude_finds_at_least_as_many_edges() {
        let l1 = canny(&split(20, 10), 50.0, 150.0, 5, false);
        let l2 = canny(&split(20, 10), 50.0, 150.0, 5, true);
        assert!(count_edges(&l1) >= count_edges(&l2));
    }
}
