//! First- and second-derivative edge maps (Sobel, Laplacian).
//!
//! Both detectors read luminance and return an opaque gray buffer. See
//! [`crate::canny`] for the full Canny detector.

use image::GrayImage;

use crate::buffer::{PixelBuffer, clamped_luma, luma_from_fn};
use crate::params::Choice;

/// Which gradient components contribute to the Sobel magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeDirection {
    /// `sqrt(gx² + gy²)`.
    #[default]
    Both,
    /// `|gx|`: the horizontal derivative, strongest on vertical edges.
    Horizontal,
    /// `|gy|`: the vertical derivative, strongest on horizontal edges.
    Vertical,
}

impl Choice for EdgeDirection {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("both", Self::Both),
        ("horizontal", Self::Horizontal),
        ("vertical", Self::Vertical),
    ];
}

const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];
const CENTRAL_X: [[i32; 3]; 3] = [[0, 0, 0], [-1, 0, 1], [0, 0, 0]];
const CENTRAL_Y: [[i32; 3]; 3] = [[0, -1, 0], [0, 0, 0], [0, 1, 0]];
const LAPLACE_4: [[i32; 3]; 3] = [[0, 1, 0], [1, -4, 1], [0, 1, 0]];
const LAPLACE_8: [[i32; 3]; 3] = [[1, 1, 1], [1, -8, 1], [1, 1, 1]];

/// Correlate a 3x3 integer kernel at `(x, y)` with clamp-to-edge reads.
fn apply3(gray: &GrayImage, kernel: &[[i32; 3]; 3], x: u32, y: u32) -> i32 {
    let mut acc = 0;
    for (ky, row) in kernel.iter().enumerate() {
        for (kx, &k) in row.iter().enumerate() {
            if k == 0 {
                continue;
            }
            #[allow(clippy::cast_possible_wrap)]
            let v = clamped_luma(
                gray,
                i64::from(x) + kx as i64 - 1,
                i64::from(y) + ky as i64 - 1,
            );
            acc += k * i32::from(v);
        }
    }
    acc
}

/// Graded Sobel edge map.
///
/// Magnitude above `high` maps to 255, above `low` to 128, otherwise 0.
/// `ksize == 1` swaps the 3x3 Sobel kernels for plain central differences.
/// The outermost rows and columns are not evaluated and stay 0.
#[must_use = "returns the edge map"]
pub fn sobel_edges(
    buf: &PixelBuffer,
    ksize: u32,
    low: f64,
    high: f64,
    direction: EdgeDirection,
) -> PixelBuffer {
    let (w, h) = (buf.width(), buf.height());
    let gray = buf.to_luma();
    let (kx, ky) = if ksize <= 1 {
        (&CENTRAL_X, &CENTRAL_Y)
    } else {
        (&SOBEL_X, &SOBEL_Y)
    };
    let out = luma_from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return 0;
        }
        let gx = f64::from(apply3(&gray, kx, x, y));
        let gy = f64::from(apply3(&gray, ky, x, y));
        let magnitude = match direction {
            EdgeDirection::Both => gx.hypot(gy),
            EdgeDirection::Horizontal => gx.abs(),
            EdgeDirection::Vertical => gy.abs(),
        };
        if magnitude > high {
            255
        } else if magnitude > low {
            128
        } else {
            0
        }
    });
    PixelBuffer::from_luma(&out)
}

/// Binary Laplacian edge map: 255 where `|∇²| > threshold`.
///
/// `ksize == 1` uses the 4-neighbour kernel, anything larger the
/// 8-neighbour kernel.
#[must_use = "returns the edge map"]
pub fn laplacian_edges(buf: &PixelBuffer, ksize: u32, threshold: f64) -> PixelBuffer {
    let gray = buf.to_luma();
    let kernel = if ksize <= 1 { &LAPLACE_4 } else { &LAPLACE_8 };
    let out = luma_from_fn(buf.width(), buf.height(), |x, y| {
        if f64::from(apply3(&gray, kernel, x, y).abs()) > threshold {
            255
        } else {
            0
        }
    });
    PixelBuffer::from_luma(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half 0, right half 255, split between x=4 and x=5.
    fn vertical_split() -> PixelBuffer {
        PixelBuffer::from_fn(10, 10, |x, _| if x < 5 { [0, 0, 0, 255] } else { [255; 4] })
    }

    #[test]
    fn sobel_marks_both_columns_of_split() {
        let out = sobel_edges(&vertical_split(), 3, 50.0, 100.0, EdgeDirection::Both);
        for y in 0..10 {
            for x in 0..10 {
                let interior = (1..9).contains(&y);
                let expected = if interior && (x == 4 || x == 5) { 255 } else { 0 };
                assert_eq!(out.pixel(x, y)[0], expected, "({x},{y})");
            }
        }
    }

    #[test]
    fn sobel_vertical_direction_ignores_vertical_edge() {
        let out = sobel_edges(&vertical_split(), 3, 50.0, 100.0, EdgeDirection::Vertical);
        assert!(out.pixels().chunks_exact(4).all(|p| p[0] == 0));
    }

    #[test]
    fn sobel_grades_weak_edges() {
        // Step of 30: Sobel magnitude 120 sits between 100 and 150.
        let buf = PixelBuffer::from_fn(6, 6, |x, _| if x < 3 { [0, 0, 0, 255] } else { [30, 30, 30, 255] });
        let out = sobel_edges(&buf, 3, 100.0, 150.0, EdgeDirection::Both);
        assert_eq!(out.pixel(2, 3)[0], 128);
    }

    #[test]
    fn sobel_central_difference() {
        // Central difference across the split: 255 at x=4 and x=5.
        let out = sobel_edges(&vertical_split(), 1, 50.0, 200.0, EdgeDirection::Horizontal);
        assert_eq!(out.pixel(4, 5)[0], 255);
        assert_eq!(out.pixel(5, 5)[0], 255);
        assert_eq!(out.pixel(3, 5)[0], 0);
    }

    #[test]
    fn sobel_output_is_opaque() {
        let out = sobel_edges(&vertical_split(), 3, 50.0, 100.0, EdgeDirection::Both);
        assert!(out.pixels().chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn laplacian_flat_is_empty() {
        let buf = PixelBuffer::from_pixel(8, 8, [90, 90, 90, 255]);
        let out = laplacian_edges(&buf, 3, 30.0);
        assert!(out.pixels().chunks_exact(4).all(|p| p[0] == 0));
    }

    #[test]
    fn laplacian_detects_split() {
        let out = laplacian_edges(&vertical_split(), 1, 30.0);
        assert_eq!(out.pixel(4, 5)[0], 255);
        assert_eq!(out.pixel(5, 5)[0], 255);
        assert_eq!(out.pixel(1, 5)[0], 0);
        assert_eq!(out.pixel(8, 5)[0], 0);
    }
}
