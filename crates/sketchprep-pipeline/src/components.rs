//! Binary masks and connected-component labelling.
//!
//! Components are found with an explicit stack, so large filled regions
//! cannot overflow the call stack.

use image::GrayImage;

/// Neighbourhood used to link foreground pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Edge-adjacent neighbours only.
    Four,
    /// Edge- and corner-adjacent neighbours.
    Eight,
}

const N4: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
const N8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Connectivity {
    /// Neighbour offsets.
    #[must_use]
    pub const fn offsets(self) -> &'static [(i64, i64)] {
        match self {
            Self::Four => &N4,
            Self::Eight => &N8,
        }
    }
}

/// A row-major boolean image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    /// An all-background mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Mark pixels of a gray image for which `is_foreground` holds.
    #[must_use]
    pub fn from_gray(img: &GrayImage, is_foreground: impl Fn(u8) -> bool) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            bits: img.pixels().map(|p| is_foreground(p.0[0])).collect(),
        }
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

    /// Foreground test; out-of-range coordinates are background.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_some_and(|i| self.bits[i])
    }

    /// Set a pixel. Out-of-range writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if let Some(i) = self.index(i64::from(x), i64::from(y)) {
            self.bits[i] = value;
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Number of foreground pixels among the given neighbours of `(x, y)`.
    #[must_use]
    pub fn neighbours(&self, x: u32, y: u32, conn: Connectivity) -> usize {
        conn.offsets()
            .iter()
            .filter(|&&(dx, dy)| self.get(i64::from(x) + dx, i64::from(y) + dy))
            .count()
    }

    /// Render foreground as `fg` and background as `bg`.
    #[must_use]
    pub fn to_gray(&self, fg: u8, bg: u8) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.get(i64::from(x), i64::from(y)) { fg } else { bg }])
        })
    }
}

/// One connected set of foreground pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Member pixels in discovery order.
    pub pixels: Vec<(u32, u32)>,
    /// Inclusive bounding box `(min_x, min_y, max_x, max_y)`.
    pub bounds: (u32, u32, u32, u32),
}

impl Component {
    /// Pixel count.
    #[must_use]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    /// Bounding-box width in pixels.
    #[must_use]
    pub const fn bbox_width(&self) -> u32 {
        self.bounds.2 - self.bounds.0 + 1
    }

    /// Bounding-box height in pixels.
    #[must_use]
    pub const fn bbox_height(&self) -> u32 {
        self.bounds.3 - self.bounds.1 + 1
    }
}

/// Labelled components plus a per-pixel label map.
#[derive(Debug, Clone)]
pub struct Labeling {
    /// Components in raster order of their first pixel.
    pub components: Vec<Component>,
    labels: Vec<Option<u32>>,
    width: u32,
    height: u32,
}

impl Labeling {
    /// Label of the component owning `(x, y)`, if any.
    #[must_use]
    pub fn label(&self, x: i64, y: i64) -> Option<u32> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        self.labels[y as usize * self.width as usize + x as usize]
    }

    /// Whether `(x, y)` has a neighbour (under `conn`) outside its own
    /// component, counting off-image positions as outside.
    #[must_use]
    pub fn is_boundary(&self, x: u32, y: u32, conn: Connectivity) -> bool {
        let own = self.label(i64::from(x), i64::from(y));
        conn.offsets()
            .iter()
            .any(|&(dx, dy)| self.label(i64::from(x) + dx, i64::from(y) + dy) != own)
    }

    /// Number of in-component neighbours of `(x, y)` under `conn`.
    #[must_use]
    pub fn same_neighbours(&self, x: u32, y: u32, conn: Connectivity) -> usize {
        let own = self.label(i64::from(x), i64::from(y));
        conn.offsets()
            .iter()
            .filter(|&&(dx, dy)| self.label(i64::from(x) + dx, i64::from(y) + dy) == own)
            .count()
    }
}

/// Find all connected components of the mask.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn label_components(mask: &BinaryMask, conn: Connectivity) -> Labeling {
    let (w, h) = (mask.width, mask.height);
    let mut labels: Vec<Option<u32>> = vec![None; mask.bits.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let start = y as usize * w as usize + x as usize;
            if !mask.bits[start] || labels[start].is_some() {
                continue;
            }
            let label = components.len() as u32;
            labels[start] = Some(label);
            stack.push((x, y));
            let mut pixels = Vec::new();
            let mut bounds = (x, y, x, y);
            while let Some((cx, cy)) = stack.pop() {
                pixels.push((cx, cy));
                bounds = (
                    bounds.0.min(cx),
                    bounds.1.min(cy),
                    bounds.2.max(cx),
                    bounds.3.max(cy),
                );
                for &(dx, dy) in conn.offsets() {
                    let (nx, ny) = (i64::from(cx) + dx, i64::from(cy) + dy);
                    if let Some(i) = mask.index(nx, ny)
                        && mask.bits[i]
                        && labels[i].is_none()
                    {
                        labels[i] = Some(label);
                        #[allow(clippy::cast_sign_loss)]
                        stack.push((nx as u32, ny as u32));
                    }
                }
            }
            components.push(Component { pixels, bounds });
        }
    }

    Labeling {
        components,
        labels,
        width: w,
        height: h,
    }
}
