//! The Exploration Shaper (spec.md §4.3): builds the sample space, goal bias,
//! and guide point for the next `update_plan` call, driving the grid's
//! dilation and flood-fill boundary analysis.

use crate::common::grid::{self, OccupancyGrid};
use crate::common::vec2d::Vec2D;
use crate::config::BehaviorParams;
use crate::planning::behavior::{Behavior, BehaviorKind};
use crate::planning::planner::{GoalBias, SampleSpace};

pub struct ShapeResult {
    pub goal_bias: GoalBias,
    pub sample_space: SampleSpace,
    pub guide: Vec2D<f64>,
    /// The behavior actually used to shape — may differ from the requested
    /// behavior when the grid forces an escape-shape fallback (spec.md §4.3
    /// step 4).
    pub shaped_as: BehaviorKind,
}

/// Builds `(goal_bias, sample_space, guide_point)` for the upcoming planning
/// update (spec.md §4.3).
pub fn shape(
    behavior: &Behavior,
    escape: &Behavior,
    params: &BehaviorParams,
    grid_opt: Option<&OccupancyGrid>,
    seed: Vec2D<f64>,
    goal: Vec2D<f64>,
) -> ShapeResult {
    if behavior.is(BehaviorKind::Escape) {
        return escape_shape(escape, params, seed, goal);
    }

    let Some(ogrid) = grid_opt else {
        // No grid at all: treat as fully open, zero push, plain gen_ss.
        let sample_space = behavior.planner.gen_ss(seed, goal, 4.0 * params.ss_start);
        return ShapeResult { goal_bias: bias_for(behavior.kind, 1.0, seed, goal, params), sample_space, guide: goal, shaped_as: behavior.kind };
    };

    let (seed_px, goal_px) = (ogrid.world_to_pixel(seed), ogrid.world_to_pixel(goal));
    if !ogrid.in_bounds(seed_px.0, seed_px.1) || !ogrid.in_bounds(goal_px.0, goal_px.1) {
        return escape_shape(escape, params, seed, goal);
    }

    let threshold_img = ogrid.threshold(params.ogrid_threshold);
    let kernel_radius = {
        let side = (params.boat_width / ogrid.resolution).ceil();
        let even_side = if (side as u64) % 2 == 0 { side } else { side + 1.0 };
        (even_side / 2.0) as u32
    };
    let dilated = grid::dilate_square(&threshold_img, kernel_radius);

    let initial_ss = behavior.planner.gen_ss(seed, goal, 0.0);
    let (mut pmin, mut pmax) = world_ss_to_pixels(ogrid, initial_ss);

    let (w, h) = dilated.dimensions();
    let mut push_px: f64 = 0.0;
    let mut n_push: u32 = 0;
    let mut guide = goal;

    loop {
        let crop = crop_bounds(pmin, pmax, push_px, w, h);
        let cropped = image::imageops::crop_imm(&dilated, crop.0, crop.1, crop.2, crop.3).to_image();

        let seed_local = (seed_px.0 as i64 - i64::from(crop.0), seed_px.1 as i64 - i64::from(crop.1));
        let goal_local = (goal_px.0 as i64 - i64::from(crop.0), goal_px.1 as i64 - i64::from(crop.1));

        if !in_image(&cropped, seed_local) || !in_image(&cropped, goal_local) {
            return escape_shape(escape, params, seed, goal);
        }
        let seed_u = (seed_local.0 as u32, seed_local.1 as u32);
        let goal_u = (goal_local.0 as u32, goal_local.1 as u32);

        if grid::reaches(&cropped, goal_u, seed_u) {
            break;
        }

        let boundary = grid::boundary_analysis(&cropped, seed_u, goal_u);
        if boundary.is_empty() {
            break;
        }

        // Deterministic tie-break (spec.md §9 Open Question 1): take the
        // candidate nearest the seed-goal midpoint, evaluated at this step.
        let mid = ((seed_local.0 + goal_local.0) as f64 / 2.0, (seed_local.1 + goal_local.1) as f64 / 2.0);
        let chosen = boundary
            .iter()
            .min_by(|a, b| {
                let da = (f64::from(a.0) - mid.0).powi(2) + (f64::from(a.1) - mid.1).powi(2);
                let db = (f64::from(b.0) - mid.0).powi(2) + (f64::from(b.1) - mid.1).powi(2);
                da.total_cmp(&db)
            })
            .copied()
            .expect("boundary checked non-empty above");

        push_px += params.ss_step / ogrid.resolution;
        n_push += 1;
        guide = ogrid.pixel_to_world(i64::from(crop.0) + i64::from(chosen.0), i64::from(crop.1) + i64::from(chosen.1));

        if push_px > f64::from(w.max(h)) {
            break;
        }
    }

    if n_push > 0 {
        pmin = pmin - Vec2D::new(params.boat_length, params.boat_length);
        pmax = pmax + Vec2D::new(params.boat_length, params.boat_length);
    }
    let push_world = push_px * ogrid.resolution;
    let sample_space = behavior.planner.gen_ss(seed, goal, push_world + 4.0 * params.ss_start);

    let final_crop = crop_bounds(pmin, pmax, push_px, w, h);
    let final_img = image::imageops::crop_imm(&dilated, final_crop.0, final_crop.1, final_crop.2, final_crop.3).to_image();
    let free_ratio = free_cell_ratio(&final_img);
    let b = if final_img.width() == 0 || final_img.height() == 0 {
        1.0
    } else {
        (free_ratio - 0.05 * f64::from(n_push)).clamp(0.0, 0.9)
    };

    ShapeResult { goal_bias: bias_for(behavior.kind, b, seed, goal, params), sample_space, guide, shaped_as: behavior.kind }
}

/// `escape`'s shape: zero bias, `escape.gen_ss`, and a guide pushed outward
/// along seed→goal to at least `2*free_radius` to avoid local minima (spec.md
/// §4.3 "When behavior = escape").
fn escape_shape(escape: &Behavior, params: &BehaviorParams, seed: Vec2D<f64>, goal: Vec2D<f64>) -> ShapeResult {
    let sample_space = escape.planner.gen_ss(seed, goal, 0.0);
    let dist = seed.euclid_distance(&goal);
    let min_dist = 2.0 * params.free_radius;
    let guide = if dist < min_dist && dist > 1e-9 {
        let dir = seed.to(&goal).normalize();
        seed + dir * min_dist
    } else {
        goal
    };
    ShapeResult { goal_bias: [0.0; 6], sample_space, guide, shaped_as: BehaviorKind::Escape }
}

/// Per-behavior bias weighting (spec.md §4.3 "Per-behavior bias weighting").
fn bias_for(kind: BehaviorKind, b: f64, seed: Vec2D<f64>, goal: Vec2D<f64>, params: &BehaviorParams) -> GoalBias {
    match kind {
        BehaviorKind::Boat if seed.euclid_distance(&goal) < params.free_radius => [1.0, 1.0, 1.0, 0.1, 0.1, 0.0],
        BehaviorKind::Boat => [b, b, 1.0, 0.0, 0.0, 1.0],
        BehaviorKind::Car => {
            let b_prime = b.min(0.75);
            [b_prime, b_prime, 0.0, 0.0, 0.5, 0.0]
        }
        BehaviorKind::Escape => [0.0; 6],
    }
}

fn world_ss_to_pixels(grid: &OccupancyGrid, ss: SampleSpace) -> (Vec2D<f64>, Vec2D<f64>) {
    let ((xmin, xmax), (ymin, ymax)) = ss;
    let (c0, r0) = grid.world_to_pixel(Vec2D::new(xmin, ymin));
    let (c1, r1) = grid.world_to_pixel(Vec2D::new(xmax, ymax));
    (Vec2D::new(c0.min(c1) as f64, r0.min(r1) as f64), Vec2D::new(c0.max(c1) as f64, r0.max(r1) as f64))
}

fn crop_bounds(pmin: Vec2D<f64>, pmax: Vec2D<f64>, push: f64, w: u32, h: u32) -> (u32, u32, u32, u32) {
    let clamp_to_grid = |v: f64, max: u32| v.max(0.0).min(f64::from(max.saturating_sub(1))) as u32;
    let x0 = clamp_to_grid((pmin.x() - push).floor(), w);
    let y0 = clamp_to_grid((pmin.y() - push).floor(), h);
    // +1: pmax is itself an inclusive pixel coordinate (the goal/seed pixel), so
    // the crop must extend one past it to contain that pixel.
    let x1 = (((pmax.x() + push).ceil().max(0.0) as u32).saturating_add(1)).min(w);
    let y1 = (((pmax.y() + push).ceil().max(0.0) as u32).saturating_add(1)).min(h);
    let width = x1.saturating_sub(x0).max(1).min(w - x0);
    let height = y1.saturating_sub(y0).max(1).min(h - y0);
    (x0, y0, width, height)
}

fn in_image(img: &image::GrayImage, p: (i64, i64)) -> bool {
    p.0 >= 0 && p.1 >= 0 && (p.0 as u32) < img.width() && (p.1 as u32) < img.height()
}

fn free_cell_ratio(img: &image::GrayImage) -> f64 {
    let total = (img.width() * img.height()) as f64;
    if total == 0.0 {
        return 1.0;
    }
    let free = img.pixels().filter(|p| p.0[0] == 0).count() as f64;
    free / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::reference_planner::{ReferencePlanner, SteeringGains};
    use std::sync::Arc;

    fn make_behavior(kind: BehaviorKind) -> Behavior {
        let planner = Arc::new(ReferencePlanner::new(0.1, [2.0, 2.0, 1.0], SteeringGains { k_pos: 1.0, k_theta: 2.0 }, 0.3, 200));
        Behavior::new(kind, planner)
    }

    #[test]
    fn escape_pushes_guide_out_when_goal_is_near() {
        let escape = make_behavior(BehaviorKind::Escape);
        let params = BehaviorParams::default();
        let seed = Vec2D::new(0.0, 0.0);
        let goal = Vec2D::new(0.5, 0.0);
        let result = escape_shape(&escape, &params, seed, goal);
        assert!(result.guide.euclid_distance(&seed) >= 2.0 * params.free_radius - 1e-6);
        assert_eq!(result.goal_bias, [0.0; 6]);
    }

    #[test]
    fn shape_with_no_grid_uses_full_goal_bias_on_boat() {
        let boat = make_behavior(BehaviorKind::Boat);
        let escape = make_behavior(BehaviorKind::Escape);
        let params = BehaviorParams::default();
        let result = shape(&boat, &escape, &params, None, Vec2D::new(0.0, 0.0), Vec2D::new(1.0, 0.0));
        assert_eq!(result.shaped_as, BehaviorKind::Boat);
        assert_eq!(result.guide, Vec2D::new(1.0, 0.0));
    }

    #[test]
    fn shape_falls_back_to_escape_when_goal_outside_grid() {
        let car = make_behavior(BehaviorKind::Car);
        let escape = make_behavior(BehaviorKind::Escape);
        let params = BehaviorParams::default();
        let grid = OccupancyGrid::new(4, 4, Vec2D::new(0.0, 0.0), 1.0, vec![0; 16]);
        let result = shape(&car, &escape, &params, Some(&grid), Vec2D::new(1.0, 1.0), Vec2D::new(1000.0, 1000.0));
        assert_eq!(result.shaped_as, BehaviorKind::Escape);
    }

    #[test]
    fn shape_on_open_grid_reaches_immediately_no_push() {
        let boat = make_behavior(BehaviorKind::Boat);
        let escape = make_behavior(BehaviorKind::Escape);
        let params = BehaviorParams::default();
        let grid = OccupancyGrid::new(20, 20, Vec2D::new(0.0, 0.0), 1.0, vec![0; 400]);
        let result = shape(&boat, &escape, &params, Some(&grid), Vec2D::new(2.0, 2.0), Vec2D::new(10.0, 10.0));
        assert_eq!(result.shaped_as, BehaviorKind::Boat);
        assert_eq!(result.guide, Vec2D::new(10.0, 10.0));
    }
}
