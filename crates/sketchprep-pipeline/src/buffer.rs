//! The RGBA pixel buffer that flows between pipeline stages.
//!
//! Every kernel reads and writes [`PixelBuffer`]. Grayscale results are
//! stored with equal R, G and B values and an opaque alpha; nothing in the
//! crate assumes single-channel storage.
//!
//! Neighbourhood operations never index out of range: coordinates are
//! clamped to the nearest valid pixel ([`PixelBuffer::clamped_pixel`],
//! [`clamped_luma`]).

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError};

/// Number of interleaved channels per pixel.
pub const CHANNELS: usize = 4;

/// An owned RGBA image: `width * height` pixels, channel order R, G, B, A.
///
/// The length invariant `pixels.len() == width * height * 4` is enforced
/// by every constructor, including deserialization.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPixelBuffer")]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Unvalidated wire form of [`PixelBuffer`].
#[derive(Deserialize)]
struct RawPixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TryFrom<RawPixelBuffer> for PixelBuffer {
    type Error = PipelineError;

    fn try_from(raw: RawPixelBuffer) -> Result<Self, Self::Error> {
        Self::from_raw(raw.width, raw.height, raw.pixels)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

const fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

impl PixelBuffer {
    /// An opaque black buffer.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_pixel(width, height, [0, 0, 0, 255])
    }

    /// A buffer with every pixel set to `rgba`.
    #[must_use]
    pub fn from_pixel(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(byte_len(width, height))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Build a buffer by evaluating `f(x, y)` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(byte_len(width, height));
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Wrap an interleaved RGBA byte vector.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidBuffer`] if `pixels.len()` is not
    /// `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, PipelineError> {
        let expected = byte_len(width, height);
        if pixels.len() != expected {
            return Err(PipelineError::InvalidBuffer {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Expand a single-channel image into an opaque gray buffer.
    #[must_use]
    pub fn from_luma(gray: &GrayImage) -> Self {
        let mut pixels = Vec::with_capacity(byte_len(gray.width(), gray.height()));
        for &v in gray.as_raw() {
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
        Self {
            width: gray.width(),
            height: gray.height(),
            pixels,
        }
    }

    /// Decode PNG, JPEG, BMP or WebP bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] for an empty slice and
    /// [`PipelineError::ImageDecode`] if the format is unrecognized or the
    /// data is corrupt.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let img = image::load_from_memory(bytes).map_err(PipelineError::ImageDecode)?;
        Ok(Self::from(img.to_rgba8()))
    }

    /// Encode as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ImageEncode`] if the encoder fails.
    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        let mut out = Cursor::new(Vec::new());
        self.to_rgba_image()
            .write_to(&mut out, ImageFormat::Png)
            .map_err(PipelineError::ImageEncode)?;
        Ok(out.into_inner())
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Width and height together.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Returns `true` if the buffer has no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The interleaved RGBA bytes.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable access to the interleaved bytes. The length cannot change.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consume the buffer and return its bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    const fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    /// The RGBA value at `(x, y)`.
    ///
    /// Coordinates outside the buffer are clamped to the nearest edge.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.clamped_pixel(i64::from(x), i64::from(y))
    }

    /// The RGBA value at `(x, y)` with clamp-to-edge addressing.
    ///
    /// An empty buffer yields transparent black.
    #[must_use]
    pub fn clamped_pixel(&self, x: i64, y: i64) -> [u8; 4] {
        if self.is_empty() {
            return [0; 4];
        }
        let cx = clamp_coord(x, self.width);
        let cy = clamp_coord(y, self.height);
        let i = self.offset(cx, cy);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Overwrite the pixel at `(x, y)`. Out-of-range writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.offset(x, y);
        self.pixels[i..i + CHANNELS].copy_from_slice(&rgba);
    }

    /// Rounded luminance (`0.299 R + 0.587 G + 0.114 B`) at `(x, y)`.
    ///
    /// On a gray buffer this is the stored value.
    #[must_use]
    pub fn intensity(&self, x: u32, y: u32) -> u8 {
        let [r, g, b, _] = self.pixel(x, y);
        luminance(r, g, b)
    }

    /// Collapse to a single-channel luminance image.
    #[must_use]
    pub fn to_luma(&self) -> GrayImage {
        let data = self
            .pixels
            .chunks_exact(CHANNELS)
            .map(|p| luminance(p[0], p[1], p[2]))
            .collect();
        GrayImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Copy into an `image` crate RGBA image.
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Convert into an `image` crate RGBA image without copying.
    #[must_use]
    pub fn into_rgba_image(self) -> RgbaImage {
        let (w, h) = (self.width, self.height);
        RgbaImage::from_raw(w, h, self.pixels).unwrap_or_else(|| RgbaImage::new(w, h))
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }
}

/// ITU-R 601 luma weights, rounded to the nearest byte.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let v = 0.114f64.mul_add(
        f64::from(b),
        0.299f64.mul_add(f64::from(r), 0.587 * f64::from(g)),
    );
    v.round().clamp(0.0, 255.0) as u8
}

/// Round and saturate a float sample to a byte.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_byte(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// Clamp a signed coordinate into `0..len`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_coord(v: i64, len: u32) -> u32 {
    v.clamp(0, i64::from(len.saturating_sub(1))) as u32
}

/// Clamp-to-edge read of a single-channel image.
#[must_use]
pub fn clamped_luma(img: &GrayImage, x: i64, y: i64) -> u8 {
    if img.width() == 0 || img.height() == 0 {
        return 0;
    }
    img.get_pixel(clamp_coord(x, img.width()), clamp_coord(y, img.height()))
        .0[0]
}

/// Build a gray image by evaluating `f(x, y)` for every pixel.
pub fn luma_from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u8) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| Luma([f(x, y)]))
}

/// Windowed sums over a gray image with clamp-to-edge padding.
///
/// Answers box mean/variance queries in constant time with the same
/// clamp-to-edge semantics as a direct window scan. The integral tables
/// cover the image only; samples a window takes from beyond the border
/// are counted as extra copies of the border row or column, so memory
/// does not grow with the radius.
#[derive(Debug, Clone)]
pub struct BoxStats {
    width: u32,
    height: u32,
    /// Image width plus one.
    stride: usize,
    radius: u32,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl BoxStats {
    /// Precompute integral images for windows of `2 * radius + 1`.
    #[must_use]
    pub fn new(img: &GrayImage, radius: u32) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];
        for (y, row_pixels) in img.rows().enumerate() {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for (x, p) in row_pixels.enumerate() {
                let v = f64::from(p.0[0]);
                row += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sum_sq[i] = sum_sq[i - stride] + row_sq;
            }
        }
        Self {
            width: img.width(),
            height: img.height(),
            stride,
            radius,
            sum,
            sum_sq,
        }
    }

    /// Number of samples in every window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn area(&self) -> f64 {
        let side = 2.0f64.mul_add(f64::from(self.radius), 1.0);
        side * side
    }

    /// Sum over the inclusive rectangle `x0..=x1`, `y0..=y1`.
    fn rect(&self, table: &[f64], x0: u32, x1: u32, y0: u32, y1: u32) -> f64 {
        let (x0, x1) = (x0 as usize, x1 as usize + 1);
        let (y0, y1) = (y0 as usize, y1 as usize + 1);
        table[y1 * self.stride + x1] - table[y0 * self.stride + x1] - table[y1 * self.stride + x0]
            + table[y0 * self.stride + x0]
    }

    /// Sum over the clamp-to-edge window centred on `(x, y)`.
    #[allow(clippy::cast_precision_loss)]
    fn window(&self, table: &[f64], x: u32, y: u32) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let r = self.radius;
        let (right_edge, bottom_edge) = (self.width - 1, self.height - 1);
        let (x0, x1) = (x.saturating_sub(r), x.saturating_add(r).min(right_edge));
        let (y0, y1) = (y.saturating_sub(r), y.saturating_add(r).min(bottom_edge));

        // Copies of the border column/row the window reads past each edge.
        let left = f64::from(r.saturating_sub(x));
        let right = (u64::from(x) + u64::from(r)).saturating_sub(u64::from(right_edge)) as f64;
        let top = f64::from(r.saturating_sub(y));
        let bottom = (u64::from(y) + u64::from(r)).saturating_sub(u64::from(bottom_edge)) as f64;

        let corner = |cx: u32, cy: u32| self.rect(table, cx, cx, cy, cy);
        self.rect(table, x0, x1, y0, y1)
            + left * self.rect(table, 0, 0, y0, y1)
            + right * self.rect(table, right_edge, right_edge, y0, y1)
            + top * self.rect(table, x0, x1, 0, 0)
            + bottom * self.rect(table, x0, x1, bottom_edge, bottom_edge)
            + left * top * corner(0, 0)
            + left * bottom * corner(0, bottom_edge)
            + right * top * corner(right_edge, 0)
            + right * bottom * corner(right_edge, bottom_edge)
    }

    /// Mean of the window centred on `(x, y)`.
    #[must_use]
    pub fn mean(&self, x: u32, y: u32) -> f64 {
        self.window(&self.sum, x, y) / self.area()
    }

    /// Population variance `E[x²] - E[x]²` of the window centred on `(x, y)`.
    #[must_use]
    pub fn variance(&self, x: u32, y: u32) -> f64 {
        let mean = self.mean(x, y);
        (self.window(&self.sum_sq, x, y) / self.area() - mean * mean).max(0.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ─────────────────────────── construction ───────────────────────────

    #[test]
    fn new_is_opaque_black() {
        let buf = PixelBuffer::new(3, 2);
        assert_eq!(buf.pixels().len(), 24);
        assert!(buf.pixels().chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        let err = PixelBuffer::from_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidBuffer {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn from_fn_is_row_major() {
        let buf = PixelBuffer::from_fn(3, 2, |x, y| [x as u8, y as u8, 0, 255]);
        assert_eq!(buf.pixel(2, 1), [2, 1, 0, 255]);
        assert_eq!(&buf.pixels()[4..8], &[1, 0, 0, 255]);
    }

    #[test]
    fn from_luma_expands_to_gray() {
        let gray = luma_from_fn(2, 2, |x, y| (x * 10 + y) as u8);
        let buf = PixelBuffer::from_luma(&gray);
        assert_eq!(buf.pixel(1, 1), [11, 11, 11, 255]);
        assert_eq!(buf.to_luma(), gray);
    }

    // ─────────────────────────── addressing ───────────────────────────

    #[test]
    fn clamped_pixel_uses_nearest_edge() {
        let buf = PixelBuffer::from_fn(4, 4, |x, y| [(x * 10) as u8, (y * 10) as u8, 0, 255]);
        assert_eq!(buf.clamped_pixel(-5, -5), buf.pixel(0, 0));
        assert_eq!(buf.clamped_pixel(10, 2), buf.pixel(3, 2));
        assert_eq!(buf.clamped_pixel(1, 99), buf.pixel(1, 3));
    }

    #[test]
    fn clamped_pixel_on_empty_buffer_is_zero() {
        let buf = PixelBuffer::new(0, 0);
        assert_eq!(buf.clamped_pixel(0, 0), [0; 4]);
    }

    #[test]
    fn put_pixel_out_of_range_is_ignored() {
        let mut buf = PixelBuffer::new(2, 2);
        let before = buf.clone();
        buf.put_pixel(2, 0, [255; 4]);
        assert_eq!(buf, before);
    }

    #[test]
    fn intensity_of_gray_is_stored_value() {
        for v in [0u8, 1, 77, 128, 254, 255] {
            let buf = PixelBuffer::from_pixel(1, 1, [v, v, v, 255]);
            assert_eq!(buf.intensity(0, 0), v);
        }
    }

    // ─────────────────────────── conversion ───────────────────────────

    #[test]
    fn rgba_image_round_trip() {
        let buf = PixelBuffer::from_fn(5, 3, |x, y| [x as u8, y as u8, 7, 200]);
        let img = buf.to_rgba_image();
        assert_eq!(PixelBuffer::from(img), buf);
    }

    #[test]
    fn decode_empty_is_error() {
        assert!(matches!(
            PixelBuffer::decode(&[]),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn decode_garbage_is_error() {
        assert!(matches!(
            PixelBuffer::decode(b"not an image"),
            Err(PipelineError::ImageDecode(_))
        ));
    }

    #[test]
    fn png_encode_then_decode_preserves_pixels() {
        let buf = PixelBuffer::from_fn(6, 4, |x, y| [(x * 40) as u8, (y * 60) as u8, 3, 255]);
        let png = buf.encode_png().unwrap();
        assert_eq!(PixelBuffer::decode(&png).unwrap(), buf);
    }

    #[test]
    fn deserialize_validates_length() {
        let json = r#"{"width":2,"height":1,"pixels":[0,0,0,255]}"#;
        assert!(serde_json::from_str::<PixelBuffer>(json).is_err());
        let json = r#"{"width":1,"height":1,"pixels":[0,0,0,255]}"#;
        assert!(serde_json::from_str::<PixelBuffer>(json).is_ok());
    }

    // ─────────────────────────── box statistics ───────────────────────────

    fn assert_matches_direct_scan(img: &GrayImage, radius: u32) {
        let stats = BoxStats::new(img, radius);
        let r = i64::from(radius);
        let n = ((2 * r + 1) * (2 * r + 1)) as f64;
        for y in 0..img.height() {
            for x in 0..img.width() {
                let mut sum = 0.0;
                let mut sum_sq = 0.0;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let v = f64::from(clamped_luma(img, i64::from(x) + dx, i64::from(y) + dy));
                        sum += v;
                        sum_sq += v * v;
                    }
                }
                let mean = sum / n;
                let var = sum_sq / n - mean * mean;
                assert!((stats.mean(x, y) - mean).abs() < 1e-6, "mean at ({x},{y}) r={radius}");
                assert!((stats.variance(x, y) - var).abs() < 1e-6, "variance at ({x},{y}) r={radius}");
            }
        }
    }

    #[test]
    fn box_stats_match_direct_scan() {
        let img = luma_from_fn(7, 5, |x, y| ((x * 37 + y * 91) % 256) as u8);
        assert_matches_direct_scan(&img, 2);
    }

    #[test]
    fn box_stats_window_larger_than_image() {
        let img = luma_from_fn(4, 3, |x, y| ((x * 61 + y * 17 + 5) % 256) as u8);
        for radius in [3, 6, 11] {
            assert_matches_direct_scan(&img, radius);
        }
    }

    #[test]
    fn box_stats_memory_follows_image_not_radius() {
        let img = luma_from_fn(10, 10, |x, y| ((x + y) * 12) as u8);
        let stats = BoxStats::new(&img, 20_000);
        assert_eq!(stats.sum.len(), 11 * 11);
        let v = stats.mean(5, 5);
        assert!((0.0..=255.0).contains(&v));
    }

    #[test]
    fn box_stats_uniform_has_zero_variance() {
        let img = GrayImage::from_pixel(4, 4, Luma([90]));
        let stats = BoxStats::new(&img, 3);
        assert!((stats.mean(0, 0) - 90.0).abs() < 1e-9);
        assert!(stats.variance(3, 3).abs() < 1e-9);
    }
}
