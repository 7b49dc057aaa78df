//! Zhang-Suen thinning.

use crate::buffer::PixelBuffer;
use crate::components::BinaryMask;

/// `p2..p9`: north, then clockwise.
const RING: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Thin `mask` in place to one-pixel-wide lines.
///
/// Runs at most `max_iterations` passes of two sub-iterations each and
/// stops early once a pass removes nothing. Only pixels off the outermost
/// ring are candidates. Returns the number of passes executed.
pub fn zhang_suen(mask: &mut BinaryMask, max_iterations: u32) -> u32 {
    let (w, h) = (mask.width(), mask.height());
    if w < 3 || h < 3 {
        return 0;
    }
    let mut doomed = Vec::new();
    let mut passes = 0;
    while passes < max_iterations {
        passes += 1;
        let mut changed = false;
        for second in [false, true] {
            doomed.clear();
            for y in 1..h - 1 {
                for x in 1..w - 1 {
                    if mask.get(i64::from(x), i64::from(y)) && removable(mask, x, y, second) {
                        doomed.push((x, y));
                    }
                }
            }
            changed |= !doomed.is_empty();
            for &(x, y) in &doomed {
                mask.set(x, y, false);
            }
        }
        if !changed {
            break;
        }
    }
    passes
}

fn removable(mask: &BinaryMask, x: u32, y: u32, second: bool) -> bool {
    let p = RING.map(|(dx, dy)| mask.get(i64::from(x) + dx, i64::from(y) + dy));
    let b = p.iter().filter(|&&v| v).count();
    if !(2..=6).contains(&b) {
        return false;
    }
    let a = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
    if a != 1 {
        return false;
    }
    let [p2, _, p4, _, p6, _, p8, _] = p;
    if second {
        !(p2 && p4 && p8) && !(p2 && p6 && p8)
    } else {
        !(p2 && p4 && p6) && !(p4 && p6 && p8)
    }
}

/// Skeletonize the bright (> 128) regions of `buf`; output is 255 on 0.
#[must_use = "returns the skeleton"]
pub fn skeletonize(buf: &PixelBuffer, max_iterations: u32) -> PixelBuffer {
    let gray = buf.to_luma();
    let mut mask = BinaryMask::from_gray(&gray, |v| v > 128);
    let passes = zhang_suen(&mut mask, max_iterations);
    tracing::trace!(passes, "thinning finished");
    PixelBuffer::from_luma(&mask.to_gray(255, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Connectivity, label_components};

    fn filled_square(size: u32, at: u32, canvas: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(canvas, canvas);
        for y in at..at + size {
            for x in at..at + size {
                mask.set(x, y, true);
            }
        }
        mask
    }

    fn has_full_block(mask: &BinaryMask) -> bool {
        (0..mask.height()).any(|y| {
            (0..mask.width()).any(|x| {
                (0..3).all(|dy| (0..3).all(|dx| mask.get(i64::from(x + dx), i64::from(y + dy))))
            })
        })
    }

    #[test]
    fn square_thins_to_connected_lines() {
        let mut mask = filled_square(20, 5, 30);
        let passes = zhang_suen(&mut mask, 50);
        assert!(passes < 50, "did not converge: {passes}");
        assert!(mask.count() > 0);
        assert!(!has_full_block(&mask));
        assert_eq!(label_components(&mask, Connectivity::Eight).components.len(), 1);
    }

    #[test]
    fn one_pixel_line_is_stable() {
        let mut mask = BinaryMask::new(20, 5);
        for x in 2..18 {
            mask.set(x, 2, true);
        }
        let before = mask.clone();
        let passes = zhang_suen(&mut mask, 10);
        assert_eq!(passes, 1);
        // Only the line's two end pixels may erode.
        assert!(mask.count() >= before.count() - 2);
    }

    #[test]
    fn max_iterations_bounds_work() {
        let mut mask = filled_square(20, 5, 30);
        assert_eq!(zhang_suen(&mut mask, 1), 1);
        assert!(has_full_block(&mask));
    }

    #[test]
    fn tiny_masks_are_untouched() {
        let mut mask = BinaryMask::new(2, 2);
        mask.set(0, 0, true);
        assert_eq!(zhang_suen(&mut mask, 5), 0);
        assert!(mask.get(0, 0));
    }

    #[test]
    fn skeletonize_reads_bright_foreground() {
        let buf = PixelBuffer::from_fn(30, 30, |x, y| {
            if (5..25).contains(&x) && (12..18).contains(&y) { [255; 4] } else { [0, 0, 0, 255] }
        });
        let out = skeletonize(&buf, 30);
        let lit = out.pixels().chunks_exact(4).filter(|p| p[0] == 255).count();
        assert!(lit > 5 && lit < 6 * 20, "{lit} skeleton pixels");
        assert!(out.pixels().chunks_exact(4).all(|p| p[0] == 0 || p[0] == 255));
    }
}
