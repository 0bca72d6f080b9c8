//! The occupancy grid and its pixel-space operations (spec.md §3, §4.3, §4.4).
//!
//! Storage is a row-major `Vec<u8>`, replaced wholesale on every update (spec.md
//! §3: "The grid is replaced atomically on each update"). Pixel operations borrow
//! the teacher's preference for the `image` crate over hand-rolled raster code
//! (`flight_control::common::bitmap` does the same for its bit-packed map).

use super::vec2d::Vec2D;
use image::GrayImage;

/// A world-frame occupancy grid: origin `(ox, oy)`, resolution in world units per
/// cell, and `width * height` occupancy values in row-major order.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    width: u32,
    height: u32,
    pub origin: Vec2D<f64>,
    pub resolution: f64,
    data: Vec<u8>,
}

impl OccupancyGrid {
    pub fn new(width: u32, height: u32, origin: Vec2D<f64>, resolution: f64, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), (width * height) as usize, "grid data does not match width*height");
        Self { width, height, origin, resolution, data }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    pub fn get(&self, col: u32, row: u32) -> Option<u8> {
        if col >= self.width || row >= self.height { return None; }
        Some(self.data[(row * self.width + col) as usize])
    }

    /// World point to pixel indices `(col, row)`, truncating toward zero.
    ///
    /// Negative or otherwise off-grid results are not clamped here; callers
    /// (`is_feasible`, the shaper) treat an out-of-range pixel as infeasible
    /// rather than silently projecting it back onto the grid (spec.md §4.4,
    /// §7 "Grid bounds violation").
    pub fn world_to_pixel(&self, p: Vec2D<f64>) -> (i64, i64) {
        let col = ((p.x() - self.origin.x()) / self.resolution).floor() as i64;
        let row = ((p.y() - self.origin.y()) / self.resolution).floor() as i64;
        (col, row)
    }

    pub fn pixel_to_world(&self, col: i64, row: i64) -> Vec2D<f64> {
        Vec2D::new(
            self.origin.x() + (col as f64 + 0.5) * self.resolution,
            self.origin.y() + (row as f64 + 0.5) * self.resolution,
        )
    }

    pub fn in_bounds(&self, col: i64, row: i64) -> bool {
        col >= 0 && row >= 0 && (col as u32) < self.width && (row as u32) < self.height
    }

    /// Threshold to a binary image: `value > threshold` becomes 255, else 0
    /// (spec.md §4.3 step 1).
    pub fn threshold(&self, threshold: u8) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                let v = if self.data[(row * self.width + col) as usize] > threshold { 255 } else { 0 };
                img.put_pixel(col, row, image::Luma([v]));
            }
        }
        img
    }
}

/// Dilates a binary occupied-pixel image with a square kernel of side `radius_px * 2 + 1`.
///
/// Kernel radius is derived by callers from the vehicle footprint and grid
/// resolution (spec.md §4.3 step 2: "square kernel sized from vehicle
/// width/resolution").
pub fn dilate_square(img: &GrayImage, radius_px: u32) -> GrayImage {
    if radius_px == 0 { return img.clone(); }
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    let r = i64::from(radius_px);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut hit = false;
            'scan: for dy in -r..=r {
                let sy = y + dy;
                if sy < 0 || sy >= h as i64 { continue; }
                for dx in -r..=r {
                    let sx = x + dx;
                    if sx < 0 || sx >= w as i64 { continue; }
                    if img.get_pixel(sx as u32, sy as u32).0[0] == 255 {
                        hit = true;
                        break 'scan;
                    }
                }
            }
            out.put_pixel(x as u32, y as u32, image::Luma([if hit { 255 } else { 0 }]));
        }
    }
    out
}

/// Flood-fills 4-connected zero-valued pixels reachable from `seed`, marking them
/// with `marker`. Returns `false` (no fill performed) if `seed` itself is
/// occupied or out of bounds — the caller treats that as "did not reach".
pub fn flood_fill(img: &mut GrayImage, seed: (u32, u32), marker: u8) -> bool {
    let (w, h) = img.dimensions();
    if seed.0 >= w || seed.1 >= h || img.get_pixel(seed.0, seed.1).0[0] != 0 { return false; }
    let mut stack = vec![seed];
    img.put_pixel(seed.0, seed.1, image::Luma([marker]));
    while let Some((x, y)) = stack.pop() {
        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= w || ny >= h { continue; }
            if img.get_pixel(nx, ny).0[0] == 0 {
                img.put_pixel(nx, ny, image::Luma([marker]));
                stack.push((nx, ny));
            }
        }
    }
    true
}

/// True iff a flood-fill from `goal` (in a fresh 0/255 copy of `img`) reaches `seed`.
///
/// This is the base case that stops the shaper's iterative expansion (spec.md
/// §4.3 step 5, §8 invariant: "`boundary_analysis` returns empty iff a flood-fill
/// from goal reaches seed").
pub fn reaches(img: &GrayImage, goal: (u32, u32), seed: (u32, u32)) -> bool {
    let mut work = img.clone();
    if !flood_fill(&mut work, goal, 128) { return false; }
    let (w, h) = work.dimensions();
    seed.0 < w && seed.1 < h && work.get_pixel(seed.0, seed.1).0[0] == 128
}

/// Finds the pixels on the image's inner border that belong to the obstacle
/// contour dividing `seed` from `goal` (spec.md §4.3's `boundary_analysis`,
/// ported from the three-flood sequence of `lqrrt_node.py:761-812`):
///
/// 1. Flood-fill from `goal` with marker A; if `seed` is already marked A,
///    they're connected and there is no dividing boundary.
/// 2. Threshold to keep *only* the marker-A region as free — this converts
///    every other pixel (real walls and unrelated free pockets alike) into
///    background, so the next flood can't leak through an unrelated pocket.
/// 3. Flood-fill that restricted image from `seed` with marker B, then
///    threshold again to keep only marker-B pixels — anything the seed
///    flood didn't reach, including leftover marker-A pixels, reads as
///    plain background from here on.
/// 4. Any occupied pixel (in the original image) on the inner border whose
///    3x3 neighborhood in the marker-B flood contains both marker B and
///    background is a boundary pixel.
pub fn boundary_analysis(img: &GrayImage, seed: (u32, u32), goal: (u32, u32)) -> Vec<(u32, u32)> {
    const MARKER_GOAL: u8 = 96;
    const MARKER_SEED: u8 = 69;
    let (w, h) = img.dimensions();

    let mut goal_flood = img.clone();
    flood_fill(&mut goal_flood, goal, MARKER_GOAL);

    if seed.0 < w && seed.1 < h && goal_flood.get_pixel(seed.0, seed.1).0[0] == MARKER_GOAL {
        return Vec::new();
    }

    let mut goal_restricted = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = if goal_flood.get_pixel(x, y).0[0] == MARKER_GOAL { MARKER_GOAL } else { 0 };
            goal_restricted.put_pixel(x, y, image::Luma([v]));
        }
    }

    let mut seed_flood = goal_restricted;
    flood_fill(&mut seed_flood, seed, MARKER_SEED);

    // Threshold again, keeping only the seed-reached region: any leftover
    // goal-marker pixels the seed flood didn't reach must read as background
    // in the neighborhood scan below, not as a third distinct value.
    for y in 0..h {
        for x in 0..w {
            if seed_flood.get_pixel(x, y).0[0] != MARKER_SEED {
                seed_flood.put_pixel(x, y, image::Luma([0]));
            }
        }
    }

    let mut boundary = Vec::new();
    if w < 3 || h < 3 { return boundary; }
    for row in 0..h {
        for col in 0..w {
            let on_inner_border = row == 1 || row == h - 2 || col == 1 || col == w - 2;
            if !on_inner_border { continue; }
            if img.get_pixel(col, row).0[0] != 255 { continue; }
            let mut has_marker = false;
            let mut has_background = false;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = col as i64 + dx;
                    let ny = row as i64 + dy;
                    if nx < 0 || ny < 0 || nx as u32 >= w || ny as u32 >= h { continue; }
                    let v = seed_flood.get_pixel(nx as u32, ny as u32).0[0];
                    if v == MARKER_SEED { has_marker = true; }
                    if v == 0 { has_background = true; }
                }
            }
            if has_marker && has_background {
                boundary.push((col, row));
            }
        }
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(w: u32, h: u32) -> OccupancyGrid {
        OccupancyGrid::new(w, h, Vec2D::new(0.0, 0.0), 1.0, vec![0; (w * h) as usize])
    }

    #[test]
    fn threshold_splits_on_value() {
        let mut g = open_grid(2, 1);
        g.data[0] = 50;
        g.data[1] = 200;
        let img = g.threshold(90);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn dilate_grows_single_pixel_into_kernel() {
        let mut img = GrayImage::new(5, 5);
        img.put_pixel(2, 2, image::Luma([255]));
        let out = dilate_square(&img, 1);
        for y in 1..=3u32 {
            for x in 1..=3u32 {
                assert_eq!(out.get_pixel(x, y).0[0], 255, "({x},{y})");
            }
        }
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn reaches_true_when_open_reaches_false_when_walled() {
        let open = GrayImage::new(5, 5);
        assert!(reaches(&open, (0, 0), (4, 4)));

        let mut walled = GrayImage::new(5, 5);
        for x in 0..5 { walled.put_pixel(x, 2, image::Luma([255])); }
        assert!(!reaches(&walled, (0, 0), (0, 4)));
    }

    #[test]
    fn boundary_analysis_empty_when_seed_reaches_goal() {
        let open = GrayImage::new(6, 6);
        let boundary = boundary_analysis(&open, (0, 0), (5, 5));
        assert!(boundary.is_empty());
    }

    #[test]
    fn boundary_analysis_ignores_unrelated_pocket() {
        // Two free pockets split by a full-width wall at row 3, plus an
        // unrelated walled-off pocket in the bottom-right corner. seed sits
        // in the top pocket, goal in the middle of the bottom pocket; the
        // unrelated pocket must not contribute boundary candidates.
        let mut img = GrayImage::new(9, 9);
        for x in 0..9 { img.put_pixel(x, 3, image::Luma([255])); }
        for y in 6..9 {
            for x in 6..9 {
                img.put_pixel(x, y, image::Luma([255]));
            }
        }
        let seed = (1, 1);
        let goal = (1, 5);
        assert!(!reaches(&img, goal, seed));

        let boundary = boundary_analysis(&img, seed, goal);
        assert!(!boundary.is_empty());
        for (col, row) in &boundary {
            assert!(
                !(6..9).contains(col) || !(6..9).contains(row),
                "boundary pixel ({col},{row}) came from the unrelated pocket"
            );
        }
    }
}
