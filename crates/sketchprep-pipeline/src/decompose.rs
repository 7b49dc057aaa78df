//! Rule-based separation of pen strokes from filled regions.
//!
//! Dark (< 128) 8-connected components are measured by bounding box,
//! fill density and the share of "edge" pixels (fewer than six dark
//! neighbours), then classified as strokes, fills, or outline-like
//! "important" shapes. The output mode decides which classes are drawn
//! and whether fills appear solid or as outlines. Output is black on
//! white.

use image::{GrayImage, Luma};

use crate::buffer::PixelBuffer;
use crate::components::{BinaryMask, Component, Connectivity, Labeling, label_components};
use crate::contour::stamp;
use crate::params::Choice;

/// Threshold preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecompositionMode {
    /// Favour keeping shapes: wider strokes, larger fills, more outlines.
    Conservative,
    /// Thresholds as given.
    #[default]
    Balanced,
    /// Favour removing fills: thin strokes only, small fills, few outlines.
    Aggressive,
    /// Thresholds as given.
    Custom,
}

impl Choice for DecompositionMode {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("conservative", Self::Conservative),
        ("balanced", Self::Balanced),
        ("aggressive", Self::Aggressive),
        ("custom", Self::Custom),
    ];
}

/// Which classes are rendered, and how.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecompositionOutput {
    /// Strokes (and important shapes when edge preservation > 3).
    LinesOnly,
    /// Fills only.
    FillsOnly,
    /// Fill outlines plus strokes and important shapes.
    BoundariesOnly,
    /// `LinesOnly` and `FillsOnly` together.
    Combined,
    /// Strokes solid, fills outlined with size-dependent weight.
    #[default]
    SmartBoundaries,
}

impl Choice for DecompositionOutput {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("lines_only", Self::LinesOnly),
        ("fills_only", Self::FillsOnly),
        ("boundaries_only", Self::BoundariesOnly),
        ("combined", Self::Combined),
        ("smart_boundaries", Self::SmartBoundaries),
    ];
}

/// Classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionParams {
    /// Largest bounding-box short side of a stroke.
    pub stroke_thickness: f64,
    /// Smallest area of a fill.
    pub fill_threshold: f64,
    /// Smallest elongation of a stroke.
    pub aspect_ratio_limit: f64,
    /// Smallest bounding-box fill ratio of a fill.
    pub density_threshold: f64,
    /// How eagerly outline-like shapes are kept (0 disables them).
    pub edge_preservation: f64,
}

impl DecompositionParams {
    /// Apply a preset. Presets bound the given values rather than
    /// replacing them.
    #[must_use]
    pub const fn adjusted(self, mode: DecompositionMode) -> Self {
        match mode {
            DecompositionMode::Balanced | DecompositionMode::Custom => self,
            DecompositionMode::Conservative => Self {
                stroke_thickness: self.stroke_thickness.max(8.0),
                fill_threshold: self.fill_threshold.max(1200.0),
                aspect_ratio_limit: self.aspect_ratio_limit.max(4.0),
                density_threshold: self.density_threshold.min(0.4),
                edge_preservation: self.edge_preservation.max(5.0),
            },
            DecompositionMode::Aggressive => Self {
                stroke_thickness: self.stroke_thickness.min(3.0),
                fill_threshold: self.fill_threshold.min(400.0),
                aspect_ratio_limit: self.aspect_ratio_limit.max(12.0),
                density_threshold: self.density_threshold.max(0.8),
                edge_preservation: self.edge_preservation.min(1.0),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeClass {
    Stroke,
    Fill,
    Important,
}

/// Measurements of one component.
#[derive(Debug, Clone, Copy)]
struct Shape {
    index: usize,
    class: ShapeClass,
    area: f64,
    density: f64,
}

#[allow(clippy::cast_precision_loss)]
fn classify(labeling: &Labeling, mask: &BinaryMask, p: &DecompositionParams) -> Vec<Shape> {
    labeling
        .components
        .iter()
        .enumerate()
        .filter_map(|(index, c)| {
            let area = c.area() as f64;
            let (w, h) = (f64::from(c.bbox_width()), f64::from(c.bbox_height()));
            let density = area / (w * h);
            let aspect = (w / h).max(h / w);
            let thickness = w.min(h);
            let edge_ratio = edge_ratio(c, mask);

            let class = if thickness <= p.stroke_thickness
                && aspect >= p.aspect_ratio_limit
                && area < p.fill_threshold
            {
                ShapeClass::Stroke
            } else if area >= p.fill_threshold && density >= p.density_threshold {
                ShapeClass::Fill
            } else if p.edge_preservation > 0.0
                && area >= p.fill_threshold / 3.0
                && area < p.fill_threshold
                && edge_ratio > 0.6
                && thickness > 2.0
                && aspect < p.aspect_ratio_limit * 2.0
            {
                ShapeClass::Important
            } else {
                return None;
            };
            Some(Shape { index, class, area, density })
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn edge_ratio(c: &Component, mask: &BinaryMask) -> f64 {
    let edges = c
        .pixels
        .iter()
        .filter(|&&(x, y)| mask.neighbours(x, y, Connectivity::Eight) < 6)
        .count();
    edges as f64 / c.area() as f64
}

struct Canvas<'a> {
    img: GrayImage,
    labeling: &'a Labeling,
}

impl Canvas<'_> {
    fn fill(&mut self, shape: &Shape) {
        for &(x, y) in &self.labeling.components[shape.index].pixels {
            self.img.put_pixel(x, y, Luma([0]));
        }
    }

    /// Stamp every 4-boundary pixel of the shape at `±thickness`.
    fn outline(&mut self, shape: &Shape, thickness: u32) {
        for &(x, y) in &self.labeling.components[shape.index].pixels {
            if self.labeling.is_boundary(x, y, Connectivity::Four) {
                stamp(&mut self.img, x, y, thickness, 0);
            }
        }
    }
}

/// Classify dark components and render the selected classes.
#[must_use = "returns the decomposed image"]
pub fn shape_decomposition(
    buf: &PixelBuffer,
    mode: DecompositionMode,
    params: DecompositionParams,
    output: DecompositionOutput,
) -> PixelBuffer {
    let p = params.adjusted(mode);
    let gray = buf.to_luma();
    let mask = BinaryMask::from_gray(&gray, |v| v < 128);
    let labeling = label_components(&mask, Connectivity::Eight);
    let shapes = classify(&labeling, &mask, &p);
    let of = |class: ShapeClass| shapes.iter().filter(move |s| s.class == class);

    let mut canvas = Canvas {
        img: GrayImage::from_pixel(gray.width(), gray.height(), Luma([255])),
        labeling: &labeling,
    };

    match output {
        DecompositionOutput::LinesOnly | DecompositionOutput::FillsOnly | DecompositionOutput::Combined => {
            if output != DecompositionOutput::FillsOnly {
                of(ShapeClass::Stroke).for_each(|s| canvas.fill(s));
                if p.edge_preservation > 3.0 {
                    of(ShapeClass::Important).for_each(|s| canvas.fill(s));
                }
            }
            if output != DecompositionOutput::LinesOnly {
                of(ShapeClass::Fill).for_each(|s| canvas.fill(s));
            }
        }
        DecompositionOutput::BoundariesOnly => {
            of(ShapeClass::Fill).for_each(|s| canvas.outline(s, 1));
            of(ShapeClass::Stroke).for_each(|s| canvas.fill(s));
            of(ShapeClass::Important).for_each(|s| canvas.fill(s));
        }
        DecompositionOutput::SmartBoundaries => {
            of(ShapeClass::Stroke).for_each(|s| canvas.fill(s));
            for s in of(ShapeClass::Fill) {
                let large = s.area > p.fill_threshold * 1.5;
                canvas.outline(s, if large { 2 } else { 1 });
            }
            if p.edge_preservation > 5.0 {
                of(ShapeClass::Important).for_each(|s| canvas.fill(s));
            } else if p.edge_preservation > 2.0 {
                of(ShapeClass::Important).for_each(|s| canvas.outline(s, 1));
            }
            for s in of(ShapeClass::Fill) {
                if s.area < p.fill_threshold * 1.5 && s.density < 0.7 {
                    canvas.outline(s, 1);
                }
            }
        }
    }

    tracing::trace!(
        strokes = of(ShapeClass::Stroke).count(),
        fills = of(ShapeClass::Fill).count(),
        important = of(ShapeClass::Important).count(),
        "shapes classified"
    );
    PixelBuffer::from_luma(&canvas.img)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BALANCED: DecompositionParams = DecompositionParams {
        stroke_thickness: 5.0,
        fill_threshold: 800.0,
        aspect_ratio_limit: 6.0,
        density_threshold: 0.6,
        edge_preservation: 3.0,
    };

    /// A 2x40 stroke at y = 5..7, a solid 40x40 block at (10, 20) and a
    /// 2-pixel-wide 24x24 ring at (60, 20), all black on white.
    fn sketch() -> PixelBuffer {
        PixelBuffer::from_fn(100, 70, |x, y| {
            let stroke = (10..50).contains(&x) && (5..7).contains(&y);
            let block = (10..50).contains(&x) && (20..60).contains(&y);
            let outer = (60..84).contains(&x) && (20..44).contains(&y);
            let inner = (62..82).contains(&x) && (22..42).contains(&y);
            if stroke || block || (outer && !inner) { [0, 0, 0, 255] } else { [255; 4] }
        })
    }

    fn black(buf: &PixelBuffer, x: u32, y: u32) -> bool {
        buf.pixel(x, y)[0] == 0
    }

    fn with_ring_as_important(edge_preservation: f64) -> DecompositionParams {
        // Ring area 176 sits in [fill / 3, fill).
        DecompositionParams {
            fill_threshold: 300.0,
            edge_preservation,
            ..BALANCED
        }
    }

    // ─────────────────────────── presets ───────────────────────────

    #[test]
    fn presets_bound_values() {
        let c = BALANCED.adjusted(DecompositionMode::Conservative);
        assert!((c.stroke_thickness - 8.0).abs() < f64::EPSILON);
        assert!((c.fill_threshold - 1200.0).abs() < f64::EPSILON);
        assert!((c.density_threshold - 0.4).abs() < f64::EPSILON);
        let a = BALANCED.adjusted(DecompositionMode::Aggressive);
        assert!((a.stroke_thickness - 3.0).abs() < f64::EPSILON);
        assert!((a.aspect_ratio_limit - 12.0).abs() < f64::EPSILON);
        assert!((a.edge_preservation - 1.0).abs() < f64::EPSILON);
        assert_eq!(BALANCED.adjusted(DecompositionMode::Custom), BALANCED);
    }

    #[test]
    fn presets_keep_more_extreme_user_values() {
        let wide = DecompositionParams { stroke_thickness: 12.0, ..BALANCED };
        let c = wide.adjusted(DecompositionMode::Conservative);
        assert!((c.stroke_thickness - 12.0).abs() < f64::EPSILON);
    }

    // ─────────────────────────── output modes ───────────────────────────

    #[test]
    fn lines_only_drops_fills() {
        let out = shape_decomposition(&sketch(), DecompositionMode::Balanced, BALANCED, DecompositionOutput::LinesOnly);
        assert!(black(&out, 20, 5));
        assert!(!black(&out, 30, 40));
    }

    #[test]
    fn fills_only_drops_strokes() {
        let out = shape_decomposition(&sketch(), DecompositionMode::Balanced, BALANCED, DecompositionOutput::FillsOnly);
        assert!(!black(&out, 20, 5));
        assert!(black(&out, 30, 40));
    }

    #[test]
    fn combined_draws_both() {
        let out = shape_decomposition(&sketch(), DecompositionMode::Balanced, BALANCED, DecompositionOutput::Combined);
        assert!(black(&out, 20, 5));
        assert!(black(&out, 30, 40));
    }

    #[test]
    fn boundaries_only_hollows_fills() {
        let out = shape_decomposition(&sketch(), DecompositionMode::Balanced, BALANCED, DecompositionOutput::BoundariesOnly);
        assert!(black(&out, 20, 5));
        assert!(black(&out, 10, 40));
        assert!(black(&out, 11, 40));
        assert!(!black(&out, 12, 40));
        assert!(!black(&out, 30, 40));
    }

    #[test]
    fn smart_boundaries_weights_large_fills() {
        // Area 1600 > 1.5 * 800: outline stamped at ±2.
        let out = shape_decomposition(&sketch(), DecompositionMode::Balanced, BALANCED, DecompositionOutput::SmartBoundaries);
        assert!(black(&out, 12, 40));
        assert!(!black(&out, 13, 40));
        assert!(black(&out, 8, 40));
        assert!(!black(&out, 30, 40));
        assert!(black(&out, 20, 5));
    }

    // ─────────────────────────── important shapes ───────────────────────────

    #[test]
    fn important_shape_filled_above_three() {
        let p = with_ring_as_important(4.0);
        let out = shape_decomposition(&sketch(), DecompositionMode::Custom, p, DecompositionOutput::LinesOnly);
        assert!(black(&out, 60, 30));
        assert!(!black(&out, 70, 30));
        let p = with_ring_as_important(3.0);
        let out = shape_decomposition(&sketch(), DecompositionMode::Custom, p, DecompositionOutput::LinesOnly);
        assert!(!black(&out, 60, 30));
    }

    #[test]
    fn smart_boundaries_outline_or_fill_important_shapes() {
        let outlined = shape_decomposition(
            &sketch(),
            DecompositionMode::Custom,
            with_ring_as_important(3.0),
            DecompositionOutput::SmartBoundaries,
        );
        // The ±1 outline of the ring reaches one pixel outside it.
        assert!(black(&outlined, 59, 30));
        let filled = shape_decomposition(
            &sketch(),
            DecompositionMode::Custom,
            with_ring_as_important(7.0),
            DecompositionOutput::SmartBoundaries,
        );
        assert!(black(&filled, 60, 30));
        assert!(!black(&filled, 59, 30));
    }

    #[test]
    fn zero_edge_preservation_ignores_outline_shapes() {
        let p = with_ring_as_important(0.0);
        let out = shape_decomposition(&sketch(), DecompositionMode::Custom, p, DecompositionOutput::BoundariesOnly);
        assert!(!black(&out, 60, 30));
    }

    #[test]
    fn white_page_stays_white() {
        let out = shape_decomposition(
            &PixelBuffer::from_pixel(30, 30, [255; 4]),
            DecompositionMode::Balanced,
            BALANCED,
            DecompositionOutput::SmartBoundaries,
        );
        assert!(out.pixels().chunks_exact(4).all(|p| p[0] == 255));
    }
}
