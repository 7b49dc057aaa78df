//! Gray-level morphology over a square, elliptical or cross window.
//!
//! `Opening` and `Closing` are the single-pass approximations used by the
//! sketch dashboard: opening is one max pass and closing one min pass.
//! `TrueOpening` and `TrueClosing` are the textbook two-pass operators.

use image::{GrayImage, Luma};

use crate::buffer::{PixelBuffer, clamped_luma};
use crate::params::Choice;

/// Morphological operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MorphologyOp {
    /// Window minimum.
    Erosion,
    /// Window maximum.
    Dilation,
    /// Single max pass.
    Opening,
    /// Single min pass.
    #[default]
    Closing,
    /// `max - min`.
    Gradient,
    /// `v - min`.
    TopHat,
    /// `max - v`.
    BlackHat,
    /// Erosion followed by dilation.
    TrueOpening,
    /// Dilation followed by erosion.
    TrueClosing,
}

impl Choice for MorphologyOp {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("opening", Self::Opening),
        ("closing", Self::Closing),
        ("gradient", Self::Gradient),
        ("tophat", Self::TopHat),
        ("blackhat", Self::BlackHat),
        ("dilation", Self::Dilation),
        ("erosion", Self::Erosion),
        ("trueOpening", Self::TrueOpening),
        ("trueClosing", Self::TrueClosing),
    ];
}

/// Structuring element outline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KernelShape {
    /// Full square window.
    #[default]
    Rectangle,
    /// Disc inscribed in the square.
    Ellipse,
    /// Centre row and centre column.
    Cross,
}

impl Choice for KernelShape {
    const OPTIONS: &'static [(&'static str, Self)] = &[
        ("rectangle", Self::Rectangle),
        ("ellipse", Self::Ellipse),
        ("cross", Self::Cross),
    ];
}

/// The window offsets of a structuring element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    offsets: Vec<(i64, i64)>,
}

impl StructuringElement {
    /// A `size x size` element of the given shape. Even sizes round up.
    #[must_use]
    pub fn new(shape: KernelShape, size: u32) -> Self {
        let half = i64::from(crate::params::odd(size) / 2);
        let mut offsets = Vec::new();
        for dy in -half..=half {
            for dx in -half..=half {
                let inside = match shape {
                    KernelShape::Rectangle => true,
                    KernelShape::Cross => dx == 0 || dy == 0,
                    // Integer disc test: (dx/half)² + (dy/half)² <= 1.
                    KernelShape::Ellipse => dx * dx + dy * dy <= half * half,
                };
                if inside {
                    offsets.push((dx, dy));
                }
            }
        }
        Self { offsets }
    }

    /// A square element.
    #[must_use]
    pub fn square(size: u32) -> Self {
        Self::new(KernelShape::Rectangle, size)
    }

    fn reduce(&self, img: &GrayImage, x: u32, y: u32, pick: fn(u8, u8) -> u8, init: u8) -> u8 {
        self.offsets.iter().fold(init, |acc, &(dx, dy)| {
            pick(acc, clamped_luma(img, i64::from(x) + dx, i64::from(y) + dy))
        })
    }

    /// Window minimum at `(x, y)`.
    #[must_use]
    pub fn min_at(&self, img: &GrayImage, x: u32, y: u32) -> u8 {
        self.reduce(img, x, y, u8::min, u8::MAX)
    }

    /// Window maximum at `(x, y)`.
    #[must_use]
    pub fn max_at(&self, img: &GrayImage, x: u32, y: u32) -> u8 {
        self.reduce(img, x, y, u8::max, u8::MIN)
    }
}

/// Window minimum of every pixel.
#[must_use = "returns the eroded image"]
pub fn erode(img: &GrayImage, se: &StructuringElement) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| Luma([se.min_at(img, x, y)]))
}

/// Window maximum of every pixel.
#[must_use = "returns the dilated image"]
pub fn dilate(img: &GrayImage, se: &StructuringElement) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| Luma([se.max_at(img, x, y)]))
}

/// Apply `op` once to a gray image.
#[must_use = "returns the transformed image"]
pub fn apply_gray(img: &GrayImage, op: MorphologyOp, se: &StructuringElement) -> GrayImage {
    match op {
        MorphologyOp::Erosion | MorphologyOp::Closing => erode(img, se),
        MorphologyOp::Dilation | MorphologyOp::Opening => dilate(img, se),
        MorphologyOp::TrueOpening => dilate(&erode(img, se), se),
        MorphologyOp::TrueClosing => erode(&dilate(img, se), se),
        MorphologyOp::Gradient => GrayImage::from_fn(img.width(), img.height(), |x, y| {
            Luma([se.max_at(img, x, y) - se.min_at(img, x, y)])
        }),
        MorphologyOp::TopHat => GrayImage::from_fn(img.width(), img.height(), |x, y| {
            Luma([img.get_pixel(x, y).0[0] - se.min_at(img, x, y)])
        }),
        MorphologyOp::BlackHat => GrayImage::from_fn(img.width(), img.height(), |x, y| {
            Luma([se.max_at(img, x, y) - img.get_pixel(x, y).0[0]])
        }),
    }
}

/// Apply `op` to the luminance of `buf`, `iterations` times.
///
/// Returns a gray buffer. Zero iterations still converts to gray.
#[must_use = "returns the transformed buffer"]
pub fn morphology(
    buf: &PixelBuffer,
    op: MorphologyOp,
    kernel_size: u32,
    shape: KernelShape,
    iterations: u32,
) -> PixelBuffer {
    let se = StructuringElement::new(shape, kernel_size);
    let mut img = buf.to_luma();
    for _ in 0..iterations {
        img = apply_gray(&img, op, &se);
    }
    PixelBuffer::from_luma(&img)
}
