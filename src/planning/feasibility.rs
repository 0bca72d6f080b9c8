//! The Feasibility Oracle (spec.md §4.4): collision testing against the
//! current occupancy grid, and re-verification of a committed plan whenever
//! the grid changes.

use crate::common::grid::OccupancyGrid;
use crate::common::state::{Effort, State};
use crate::common::vec2d::Vec2D;
use crate::config::BehaviorParams;
use crate::planning::behavior::BehaviorKind;
use crate::planning::segment::PlanSegment;

/// Outcome of [`reevaluate_plan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReevalOutcome {
    /// Nothing changed: no committed plan.
    NoOp,
    /// The plan is unaffected out to its horizon.
    StillGood,
    /// Found an infeasible sample at this many seconds past `t_update`.
    IssueAt(f64),
    /// Escaping, but the straight line to goal is now clear: resume `drive`.
    RecoveredToDrive,
}

/// Tests `(x, u)` for collision against `grid` by rotating the body-frame
/// footprint `vps` by `x.theta`, translating to `x.xy`, and looking each point
/// up as a grid pixel.
///
/// A missing grid means "no known world", which is vacuously feasible (spec.md
/// §4.4: "if no grid, true"). An out-of-bounds footprint point is infeasible,
/// never an error (spec.md §7 "Grid bounds violation").
pub fn is_feasible(grid: Option<&OccupancyGrid>, params: &BehaviorParams, x: &State, _u: &Effort) -> bool {
    let Some(grid) = grid else { return true };
    for p in &params.vps {
        let world = Vec2D::new(x.x, x.y) + p.rotated(x.theta);
        let (col, row) = grid.world_to_pixel(world);
        if !grid.in_bounds(col, row) {
            return false;
        }
        let Some(value) = grid.get(col as u32, row as u32) else { return false };
        if value >= params.ogrid_threshold {
            return false;
        }
    }
    true
}

/// Re-verifies the committed segment against the current grid (spec.md §4.4).
///
/// No-op if an issue is already pending (`time_till_issue` is `Some`) or if no
/// plan is committed — a second call while already escaping must not re-run
/// the scan and risk flipping the outcome mid-escape.
///
/// `now` and `t_update` pin down `iters_passed = floor((now - t_update)/dt)`;
/// the remainder of `x_seq` is scanned with zero effort and zero velocity
/// components, matching the original's `reevaluate_plan` sampling the
/// footprint at rest rather than at the planned speed. The escape-recovery
/// straight-line check only runs once that scan reports no collision —
/// otherwise a clear straight line to goal would mask a genuine collision
/// landing on the remaining `x_seq`.
pub fn reevaluate_plan(
    grid: Option<&OccupancyGrid>,
    params: &BehaviorParams,
    committed: Option<&PlanSegment>,
    committed_behavior: Option<BehaviorKind>,
    time_till_issue: Option<f64>,
    now_seconds_since_update: f64,
    goal: Vec2D<f64>,
    current_ref: State,
) -> ReevalOutcome {
    if time_till_issue.is_some() {
        return ReevalOutcome::NoOp;
    }
    let Some(seg) = committed else { return ReevalOutcome::NoOp };

    let iters_passed = (now_seconds_since_update / seg.dt).floor().max(0.0) as usize;
    for (offset, state) in seg.x_seq.iter().skip(iters_passed).enumerate() {
        let resting = state.zero_vel();
        if !is_feasible(grid, params, &resting, &Effort::ZERO) {
            return ReevalOutcome::IssueAt(offset as f64 * seg.dt);
        }
    }

    if committed_behavior == Some(BehaviorKind::Escape)
        && straight_line_feasible(grid, params, current_ref.pos(), goal)
    {
        return ReevalOutcome::RecoveredToDrive;
    }

    ReevalOutcome::StillGood
}

/// Samples the straight line from `from` to `to` every `vps_spacing` world
/// units; feasible iff every sample passes [`is_feasible`] (spec.md §4.4
/// escape-recovery check).
fn straight_line_feasible(grid: Option<&OccupancyGrid>, params: &BehaviorParams, from: Vec2D<f64>, to: Vec2D<f64>) -> bool {
    let total = from.euclid_distance(&to);
    if total < 1e-9 {
        return is_feasible(grid, params, &State::as_goal(from, 0.0), &Effort::ZERO);
    }
    let steps = (total / params.vps_spacing).ceil().max(1.0) as usize;
    let heading = (to.y() - from.y()).atan2(to.x() - from.x());
    for i in 0..=steps {
        let frac = i as f64 / steps as f64;
        let point = Vec2D::new(from.x() + (to.x() - from.x()) * frac, from.y() + (to.y() - from.y()) * frac);
        if !is_feasible(grid, params, &State::as_goal(point, heading), &Effort::ZERO) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BehaviorParams;

    fn open_params() -> BehaviorParams { BehaviorParams::default() }

    #[test]
    fn no_grid_is_always_feasible() {
        let p = open_params();
        let x = State::new(1000.0, 1000.0, 0.0, 0.0, 0.0, 0.0);
        assert!(is_feasible(None, &p, &x, &Effort::ZERO));
    }

    #[test]
    fn out_of_bounds_footprint_is_infeasible() {
        let p = open_params();
        let grid = OccupancyGrid::new(4, 4, Vec2D::new(0.0, 0.0), 1.0, vec![0; 16]);
        let x = State::new(1000.0, 1000.0, 0.0, 0.0, 0.0, 0.0);
        assert!(!is_feasible(Some(&grid), &p, &x, &Effort::ZERO));
    }

    #[test]
    fn occupied_cell_under_footprint_is_infeasible() {
        let mut p = open_params();
        p.vps = vec![Vec2D::new(0.0, 0.0)];
        let mut data = vec![0u8; 16];
        data[2 * 4 + 2] = 255;
        let grid = OccupancyGrid::new(4, 4, Vec2D::new(0.0, 0.0), 1.0, data);
        let x = State::new(2.5, 2.5, 0.0, 0.0, 0.0, 0.0);
        assert!(!is_feasible(Some(&grid), &p, &x, &Effort::ZERO));
    }

    #[test]
    fn reevaluate_noop_without_committed_plan() {
        let p = open_params();
        let out = reevaluate_plan(None, &p, None, None, None, 0.0, Vec2D::zero(), State::ZERO);
        assert_eq!(out, ReevalOutcome::NoOp);
    }

    #[test]
    fn reevaluate_noop_when_issue_already_pending() {
        let p = open_params();
        let x_seq = vec![State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0); 5];
        let seg = PlanSegment {
            x_seq,
            u_seq: vec![Effort::ZERO; 5],
            dt: 0.1,
            t_update: chrono::Utc::now(),
            horizon: 0.5,
            tree_size: 10,
            reached_goal: false,
            behavior_name: "escape",
        };
        let out = reevaluate_plan(
            None,
            &p,
            Some(&seg),
            Some(BehaviorKind::Escape),
            Some(1.0),
            0.0,
            Vec2D::zero(),
            State::ZERO,
        );
        assert_eq!(out, ReevalOutcome::NoOp);
    }
}
