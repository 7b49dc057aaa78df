//! Region-level contour operations on binarized images.
//!
//! [`contour_detection`] treats bright pixels (> 128) as foreground and
//! draws white on black. [`boundary_extraction`] treats dark pixels
//! (< 128) as filled shapes and draws black outlines on white.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::blur::gaussian_blur;
use crate::buffer::PixelBuffer;
use crate::components::{BinaryMask, Connectivity, Labeling, label_components};
use crate::params::Choice;

/// Paint a `(2 * half + 1)`-square centred on `(x, y)`, clipped to the image.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn stamp(canvas: &mut GrayImage, x: u32, y: u32, half: u32, value: u8) {
    let side = 2 * half + 1;
    let rect = Rect::at(x as i32 - half as i32, y as i32 - half as i32).of_size(side, side);
    draw_filled_rect_mut(canvas, rect, Luma([value]));
}

/// Pixels of `component` lying on its border under `conn`.
fn boundary_pixels(labeling: &Labeling, index: usize, conn: Connectivity) -> impl Iterator<Item = (u32, u32)> + '_ {
    labeling.components[index]
        .pixels
        .iter()
        .copied()
        .filter(move |&(x, y)| labeling.is_boundary(x, y, conn))
}

/// Keep bright 8-connected regions whose size and outline length fall in
/// range, and redraw them white on black.
///
/// The outline length is the number of member pixels with fewer than
/// eight member neighbours. With `fill` the kept regions are painted
/// solid; otherwise their boundary pixels are stamped as
/// `(2 * thickness + 1)` squares.
#[must_use = "returns the contour image"]
pub fn contour_detection(
    buf: &PixelBuffer,
    min_area: usize,
    max_area: usize,
    min_perimeter: usize,
    thickness: u32,
    fill: bool,
) -> PixelBuffer {
    let gray = buf.to_luma();
    let mask = BinaryMask::from_gray(&gray, |v| v > 128);
    let labeling = label_components(&mask, Connectivity::Eight);
    let mut canvas = GrayImage::new(gray.width(), gray.height());

    for (i, component) in labeling.components.iter().enumerate() {
        let area = component.area();
        let perimeter = component
            .pixels
            .iter()
            .filter(|&&(x, y)| labeling.same_neighbours(x, y, Connectivity::Eight) < 8)
            .count();
        if area < min_area || area > max_area || perimeter < min_perimeter {
            continue;
        }
        if fill {
            for &(x, y) in &component.pixels {
                canvas.put_pixel(x, y, Luma([255]));
            }
        } else {
            for (x, y) in boundary_pixels(&labeling, i, Connectivity::Eight) {
                stamp(&mut canvas, x, y, thickness, 255);
            }
        }
    }
    PixelBuffer::from_luma(&canvas)
}

/// Outline extraction followed by a light smoothing blur.
///
/// This is simplification by smoothing, not polyline reduction: contours
/// are detected with fixed loose limits, drawn one pixel thick, and
/// blurred with a 3x3 Gaussian of `sigma = epsilon * 10`. `closed` is
/// accepted for schema compatibility and does not change the result.
#[must_use = "returns the smoothed contour image"]
pub fn contour_simplification(buf: &PixelBuffer, epsilon: f64, _closed: bool) -> PixelBuffer {
    let outlines = contour_detection(buf, 10, 50_000, 10, 1, false);
    gaussian_blur(&outlines, 3, epsilon * 10.0)
}

/// Which outlines [`boundary_extraction`] draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundaryKind {
    /// Outlines facing the open background.
    #[default]
    External,
    /// Outlines facing enclosed holes.
    Internal,
    /// Both.
    Both,
}

impl Choice for BoundaryKind {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("external", Self::External),
        ("internal", Self::Internal),
        ("both", Self::Both),
    ];
}

/// Outline dark filled shapes.
///
/// Shapes are 4-connected dark regions of at least `min_shape_area`
/// pixels. Background regions (8-connected) that do not touch the image
/// border are holes. A shape's boundary pixel is internal when it touches
/// a hole and external otherwise. Internal outlines are drawn only when
/// `preserve_holes` is set. Outlines are stamped black at `thickness` on
/// white; a positive `smoothing` then blurs with `sigma = smoothing / 2`.
#[must_use = "returns the outline image"]
pub fn boundary_extraction(
    buf: &PixelBuffer,
    kind: BoundaryKind,
    min_shape_area: usize,
    smoothing: f64,
    thickness: u32,
    preserve_holes: bool,
) -> PixelBuffer {
    let gray = buf.to_luma();
    let (w, h) = (gray.width(), gray.height());
    let shapes = BinaryMask::from_gray(&gray, |v| v < 128);
    let shape_labels = label_components(&shapes, Connectivity::Four);

    let background = BinaryMask::from_gray(&gray, |v| v >= 128);
    let bg_labels = label_components(&background, Connectivity::Eight);
    let hole: Vec<bool> = bg_labels
        .components
        .iter()
        .map(|c| c.bounds.0 > 0 && c.bounds.1 > 0 && c.bounds.2 + 1 < w && c.bounds.3 + 1 < h)
        .collect();
    let touches_hole = |x: u32, y: u32| {
        Connectivity::Eight.offsets().iter().any(|&(dx, dy)| {
            bg_labels
                .label(i64::from(x) + dx, i64::from(y) + dy)
                .is_some_and(|l| hole[l as usize])
        })
    };

    let draw_external = matches!(kind, BoundaryKind::External | BoundaryKind::Both);
    let draw_internal = preserve_holes && matches!(kind, BoundaryKind::Internal | BoundaryKind::Both);

    let mut canvas = GrayImage::from_pixel(w, h, Luma([255]));
    for (i, component) in shape_labels.components.iter().enumerate() {
        if component.area() < min_shape_area {
            continue;
        }
        for (x, y) in boundary_pixels(&shape_labels, i, Connectivity::Eight) {
            let internal = touches_hole(x, y);
            if (internal && draw_internal) || (!internal && draw_external) {
                stamp(&mut canvas, x, y, thickness, 0);
            }
        }
    }

    let out = PixelBuffer::from_luma(&canvas);
    if smoothing > 0.0 {
        gaussian_blur(&out, 3, smoothing * 0.5)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_count(buf: &PixelBuffer) -> usize {
        buf.pixels().chunks_exact(4).filter(|p| p[0] == 255).count()
    }

    fn black_count(buf: &PixelBuffer) -> usize {
        buf.pixels().chunks_exact(4).filter(|p| p[0] == 0).count()
    }

    /// White `size`-square at `(at, at)` plus a white dot at (1, 1), on black.
    fn square_and_dot(size: u32, at: u32) -> PixelBuffer {
        PixelBuffer::from_fn(40, 40, |x, y| {
            let in_square = (at..at + size).contains(&x) && (at..at + size).contains(&y);
            if in_square || (x, y) == (1, 1) {
                [255; 4]
            } else {
                [0, 0, 0, 255]
            }
        })
    }

    // ─────────────────────────── detection ───────────────────────────

    #[test]
    fn fill_keeps_only_large_regions() {
        let out = contour_detection(&square_and_dot(10, 10), 50, 10_000, 10, 1, true);
        assert_eq!(white_count(&out), 100);
        assert_eq!(out.pixel(1, 1)[0], 0);
    }

    #[test]
    fn outline_with_thickness_zero_is_ring() {
        let out = contour_detection(&square_and_dot(10, 10), 50, 10_000, 10, 0, false);
        // 10x10 square: 36 border pixels.
        assert_eq!(white_count(&out), 36);
        assert_eq!(out.pixel(15, 15)[0], 0);
    }

    #[test]
    fn outline_thickness_expands_stroke() {
        let thin = contour_detection(&square_and_dot(10, 10), 50, 10_000, 10, 0, false);
        let thick = contour_detection(&square_and_dot(10, 10), 50, 10_000, 10, 2, false);
        assert!(white_count(&thick) > white_count(&thin));
    }

    #[test]
    fn max_area_and_perimeter_filter() {
        assert_eq!(white_count(&contour_detection(&square_and_dot(10, 10), 1, 99, 1, 0, true)), 1);
        assert_eq!(white_count(&contour_detection(&square_and_dot(10, 10), 50, 10_000, 37, 0, true)), 0);
    }

    #[test]
    fn stamp_clips_at_image_edge() {
        let mut canvas = GrayImage::new(5, 5);
        stamp(&mut canvas, 0, 0, 2, 255);
        assert_eq!(canvas.pixels().filter(|p| p.0[0] == 255).count(), 9);
    }

    // ─────────────────────────── simplification ───────────────────────────

    #[test]
    fn simplification_is_softened_outline() {
        let out = contour_simplification(&square_and_dot(10, 10), 0.1, true);
        assert_eq!(out.dimensions(), square_and_dot(10, 10).dimensions());
        // The 3-pixel outline band spans x = 9..=11; the blur bleeds it one
        // pixel inward while the square's centre stays dark.
        let v = out.pixel(12, 15)[0];
        assert!(v > 0 && v < 255, "got {v}");
        assert_eq!(out.pixel(15, 15)[0], 0);
    }

    // ─────────────────────────── boundary extraction ───────────────────────────

    /// A black 20x20 ring (5 px wide) with a white hole, on white.
    fn ring() -> PixelBuffer {
        PixelBuffer::from_fn(40, 40, |x, y| {
            let outer = (10..30).contains(&x) && (10..30).contains(&y);
            let inner = (15..25).contains(&x) && (15..25).contains(&y);
            if outer && !inner { [0, 0, 0, 255] } else { [255; 4] }
        })
    }

    #[test]
    fn external_boundary_only() {
        let out = boundary_extraction(&ring(), BoundaryKind::External, 50, 0.0, 0, true);
        assert_eq!(out.pixel(10, 20)[0], 0);
        assert_eq!(out.pixel(14, 20)[0], 255);
        assert_eq!(out.pixel(12, 20)[0], 255);
    }

    #[test]
    fn internal_boundary_requires_preserve_holes() {
        let with = boundary_extraction(&ring(), BoundaryKind::Internal, 50, 0.0, 0, true);
        assert_eq!(with.pixel(14, 20)[0], 0);
        assert_eq!(with.pixel(10, 20)[0], 255);
        let without = boundary_extraction(&ring(), BoundaryKind::Internal, 50, 0.0, 0, false);
        assert_eq!(black_count(&without), 0);
    }

    #[test]
    fn both_boundaries() {
        let out = boundary_extraction(&ring(), BoundaryKind::Both, 50, 0.0, 0, true);
        assert_eq!(out.pixel(10, 20)[0], 0);
        assert_eq!(out.pixel(14, 20)[0], 0);
        // 20x20 outer ring border plus 12x12 ring around the hole.
        assert_eq!(black_count(&out), 76 + 44);
    }

    #[test]
    fn small_shapes_are_ignored() {
        let out = boundary_extraction(&ring(), BoundaryKind::Both, 1_000, 0.0, 1, true);
        assert_eq!(black_count(&out), 0);
    }

    #[test]
    fn smoothing_softens_outline() {
        let out = boundary_extraction(&ring(), BoundaryKind::External, 50, 2.0, 0, true);
        let v = out.pixel(10, 20)[0];
        assert!(v > 0 && v < 255, "got {v}");
    }
}
