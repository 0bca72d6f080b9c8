//! The top-level state machine for an in-flight move goal (spec.md §4.1).
//!
//! Structured the way the teacher's own `Supervisor` is: a thin struct that
//! owns channels/notify handles and runs long-lived `async fn` loops against a
//! shared context, rather than a class hierarchy of explicit states.

use crate::common::state::{angle_diff, erf, State};
use crate::common::types::{Focus, MoveType};
use crate::common::vec2d::Vec2D;
use crate::planning::behavior::BehaviorKind;
use crate::planning::feasibility::{self, ReevalOutcome};
use crate::planning::segment::PlanSegment;
use crate::planning::selector::select_behavior;
use crate::planning::shaper;
use crate::supervisor::context::SupervisorContext;
use crate::supervisor::signal::{ChainOutcome, MoveFeedback, MoveOutcome, MoveRejection};
use crate::{chain, info, warn};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Supervisor {
    ctx: Arc<SupervisorContext>,
}

impl Supervisor {
    pub fn new(ctx: Arc<SupervisorContext>) -> Self { Self { ctx } }

    pub fn context(&self) -> &Arc<SupervisorContext> { &self.ctx }

    /// Entry point for a move request (spec.md §4.1 "Entry"/"Public contract").
    ///
    /// Runs `tree_chain` in a loop against `preempt` until the goal is reached,
    /// preemption is requested, or chaining is aborted by a precondition
    /// failure. Feedback is sent on `feedback` once per iteration.
    pub async fn mv(
        &self,
        goal: State,
        move_type_str: &str,
        focus: Option<Focus>,
        preempt: CancellationToken,
        feedback: tokio::sync::mpsc::Sender<MoveFeedback>,
    ) -> MoveOutcome {
        let Some(current) = self.ctx.state().await else {
            return MoveOutcome::Aborted(MoveRejection::Odom);
        };
        let Some(mut move_type) = MoveType::parse(move_type_str) else {
            return MoveOutcome::Aborted(MoveRejection::MoveType);
        };
        if move_type == MoveType::Circle {
            return MoveOutcome::Aborted(MoveRejection::Patience);
        }

        let params = &self.ctx.config.params;

        match move_type {
            MoveType::Hold => {
                let seg = PlanSegment::constant(current, Utc::now(), "hold");
                self.ctx.commit(seg, BehaviorKind::Car).await;
                return MoveOutcome::Succeeded;
            }
            MoveType::Skid => {
                let resolved_goal = if let Some(f) = focus {
                    if f.z.abs() > 1e-12 {
                        let heading = focus_heading(goal.pos(), f.point);
                        State::as_goal(goal.pos(), heading)
                    } else {
                        goal
                    }
                } else {
                    goal
                };
                self.ctx.set_goal(resolved_goal).await;
                self.ctx.set_focus(focus).await;
            }
            MoveType::Drive => {
                self.ctx.set_goal(goal).await;
                let heading_err = heading_to(current.pos(), goal.pos()).map(|h| angle_diff(h, current.theta));
                let distance = current.pos().euclid_distance(&goal.pos());
                if let Some(err) = heading_err {
                    if err.abs() > params.pointshoot_tol && distance > params.free_radius {
                        match self.rotation_pre_move(current, err, &preempt).await {
                            RotationOutcome::Preempted => return MoveOutcome::Preempted,
                            RotationOutcome::Infeasible(partial) => {
                                self.ctx.commit(partial, BehaviorKind::Boat).await;
                                move_type = MoveType::Skid;
                            }
                            RotationOutcome::Completed(final_state) => {
                                self.ctx
                                    .commit(PlanSegment::constant(final_state, Utc::now(), "car"), BehaviorKind::Car)
                                    .await;
                            }
                        }
                    }
                }
            }
            MoveType::Circle => unreachable!("rejected above"),
        }
        self.ctx.set_move_type(move_type).await;

        loop {
            if preempt.is_cancelled() {
                return self.preempt_and_reset().await;
            }

            let outcome = self.tree_chain().await;
            if let ChainOutcome::Clean = outcome {
                let current = self.ctx.state().await.unwrap_or(current);
                let goal = self.ctx.goal().await;
                let err = erf(&goal, &current);
                if err.iter().zip(params.real_tol).all(|(e, tol)| e.abs() <= tol) {
                    self.ctx.commit(PlanSegment::constant(goal, Utc::now(), "car"), BehaviorKind::Car).await;
                    return MoveOutcome::Succeeded;
                }
            }

            if let Some((seg, behavior)) = self.ctx.committed().await.as_ref() {
                let _ = feedback
                    .send(MoveFeedback {
                        behavior_name: behavior.name(),
                        tree_size: seg.tree_size,
                        reached_goal: seg.reached_goal,
                        tracking: self.ctx.tracking(),
                        time_until_next_chain: self.ctx.next_runtime().await.unwrap_or(params.basic_duration),
                    })
                    .await;
            }

            tokio::time::sleep(std::time::Duration::from_millis((params.dt * 1000.0) as u64)).await;
        }
    }

    /// One `tree_chain` iteration (spec.md §4.1 "Chaining loop").
    pub async fn tree_chain(&self) -> ChainOutcome {
        if !self.ctx.try_acquire_busy() {
            return ChainOutcome::AlreadyBusy;
        }

        let result = self.tree_chain_inner().await;

        for kind in [BehaviorKind::Car, BehaviorKind::Boat, BehaviorKind::Escape] {
            self.ctx.behaviors.get(kind).planner.unkill();
        }
        self.ctx.release_busy();
        result
    }

    async fn tree_chain_inner(&self) -> ChainOutcome {
        let params = self.ctx.config.params.clone();
        let goal = self.ctx.goal().await;
        let move_type = self.ctx.move_type().await;

        let committed = self.ctx.committed().await;
        let now = Utc::now();

        // Read-and-clear the latch once; both the `next_runtime` decision below
        // and the behavior selection after the match must see the same value
        // (spec.md §4.2 "Behavior Selector" is a pure function of `stuck`, not
        // of whether it's been consumed yet).
        let stuck = self.ctx.take_stuck();

        let (seed, runtime, forced_behavior) = match self.ctx.time_till_issue().await {
            None => {
                let next_runtime = if stuck {
                    None
                } else {
                    let current = self.ctx.next_runtime().await;
                    Some(current.filter(|r| *r >= params.basic_duration).unwrap_or(params.basic_duration))
                };
                let seed = match (&*committed, next_runtime) {
                    (Some((seg, _)), Some(r)) => seg.sample(seg.param_at(now).max(0.0) + r),
                    _ => self.ctx.state().await.unwrap_or(State::ZERO),
                };
                (seed, next_runtime.unwrap_or(params.basic_duration), None)
            }
            Some(t) if t > 2.0 * params.basic_duration => {
                let seed = committed.as_ref().map_or(State::ZERO, |(seg, _)| seg.sample(t));
                (seed, params.basic_duration, None)
            }
            Some(t) => {
                let runtime = (t / 2.0).max(params.dt);
                let seed = committed.as_ref().map_or(State::ZERO, |(seg, _)| seg.sample(runtime));
                (seed, runtime, Some(BehaviorKind::Escape))
            }
        };
        drop(committed);

        let distance = goal.pos().euclid_distance(&seed.pos());
        let behavior_kind = forced_behavior.unwrap_or_else(|| select_behavior(stuck, move_type, distance, params.free_radius));
        let behavior = self.ctx.behaviors.get(behavior_kind);

        let grid_guard = self.ctx.grid().await;
        let shape = if forced_behavior == Some(BehaviorKind::Escape) {
            shaper::ShapeResult {
                goal_bias: [0.0; 6],
                sample_space: behavior.planner.gen_ss(seed.pos(), goal.pos(), 0.0),
                guide: goal.pos(),
                shaped_as: BehaviorKind::Escape,
            }
        } else {
            shaper::shape(behavior, &self.ctx.behaviors.escape, &params, grid_guard.as_ref(), seed.pos(), goal.pos())
        };
        drop(grid_guard);

        behavior.planner.set_goal(goal).await;
        let ctx_for_feasibility = Arc::clone(&self.ctx);
        let params_for_feasibility = params.clone();
        behavior.planner.set_feasibility_function(Arc::new(move |x, u| {
            ctx_for_feasibility.grid_blocking_check(&params_for_feasibility, x, u)
        }));

        let clean = behavior
            .planner
            .update_plan(seed, shape.sample_space, shape.goal_bias, shape.guide, runtime)
            .await;

        if !clean {
            return ChainOutcome::Killed;
        }

        let tree_size = behavior.planner.tree_size();
        let reached_goal = behavior.planner.plan_reached_goal();
        let degenerate = (tree_size <= params.stuck_threshold || behavior.planner.horizon() <= params.dt)
            && !reached_goal
            && distance > params.free_radius;
        self.ctx.record_stuck_observation(degenerate);

        let x_seq = behavior.planner.x_seq();
        let u_seq = behavior.planner.u_seq();
        let horizon = behavior.planner.horizon();
        let segment = PlanSegment {
            x_seq,
            u_seq,
            dt: params.dt,
            t_update: now,
            horizon,
            tree_size,
            reached_goal,
            behavior_name: behavior_kind.name(),
        };

        let mut next_runtime = if horizon > params.basic_duration { Some(horizon * params.fudge_factor) } else { None };
        if let Some(r) = next_runtime {
            next_runtime = Some(r.max(params.dt));
        }
        self.ctx.set_next_runtime(next_runtime).await;
        self.ctx.commit(segment, behavior_kind).await;
        // A clean update always supersedes whatever issue deadline prompted it
        // (original `tree_chain`: `self.time_till_issue = None` on every clean
        // commit, not just the escape-recovery path) — the freshly committed
        // segment is re-verified from scratch on the next grid update.
        self.ctx.set_time_till_issue(None).await;

        if degenerate && self.ctx.is_stuck() {
            chain!("stuck latch engaged near {seed}, behavior={behavior_kind}");
        }

        ChainOutcome::Clean
    }

    /// Re-verifies the committed plan against the current grid (spec.md §4.4),
    /// called whenever a new grid arrives.
    pub async fn reevaluate_plan(&self) {
        let committed = self.ctx.committed().await;
        let Some((seg, behavior_kind)) = committed.as_ref() else { return };
        let now_s = seg.param_at(Utc::now());
        let grid_guard = self.ctx.grid().await;
        let goal = self.ctx.goal().await;
        let current_ref = seg.sample(now_s);

        let time_till_issue = self.ctx.time_till_issue().await;
        let outcome = feasibility::reevaluate_plan(
            grid_guard.as_ref(),
            &self.ctx.config.params,
            Some(seg),
            Some(*behavior_kind),
            time_till_issue,
            now_s,
            goal.pos(),
            current_ref,
        );
        drop(grid_guard);
        drop(committed);

        match outcome {
            ReevalOutcome::NoOp | ReevalOutcome::StillGood => {}
            ReevalOutcome::IssueAt(tau) => {
                warn!("reevaluate_plan: infeasibility at t+{tau:.2}s, killing in-flight updates");
                self.ctx.set_time_till_issue(Some(tau)).await;
                for kind in [BehaviorKind::Car, BehaviorKind::Boat, BehaviorKind::Escape] {
                    self.ctx.behaviors.get(kind).planner.kill_update();
                }
            }
            ReevalOutcome::RecoveredToDrive => {
                info!("reevaluate_plan: escape route clear, resuming drive");
                self.ctx.set_time_till_issue(None).await;
                self.ctx.set_move_type(MoveType::Drive).await;
                for kind in [BehaviorKind::Car, BehaviorKind::Boat, BehaviorKind::Escape] {
                    self.ctx.behaviors.get(kind).planner.kill_update();
                }
            }
        }
    }

    /// Called on every odometry update: refreshes state and the `tracking` flag
    /// (spec.md §4.5).
    pub async fn on_odometry(&self, state: State) {
        self.ctx.set_state(state).await;
        let committed = self.ctx.committed().await;
        if let Some((seg, _)) = committed.as_ref() {
            let reference = seg.sample(seg.param_at(Utc::now()));
            let err = erf(&reference, &state);
            let within = err
                .iter()
                .zip(self.ctx.config.params.real_tol)
                .all(|(e, tol)| e.abs() <= 2.0 * tol);
            self.ctx.set_tracking(within);
        }
    }

    async fn rotation_pre_move(&self, start: State, heading_err: f64, preempt: &CancellationToken) -> RotationOutcome {
        let params = &self.ctx.config.params;
        let omega_max = params.velmax_pos[2];
        let steps = ((heading_err.abs() / omega_max) / params.dt).ceil().max(1.0) as usize;
        let mut state = start;
        for i in 0..steps {
            if preempt.is_cancelled() {
                return RotationOutcome::Preempted;
            }
            let target_theta = start.theta + heading_err * (i + 1) as f64 / steps as f64;
            let omega = angle_diff(target_theta, state.theta) / params.dt;
            let next = State { theta: target_theta, omega, ..state };

            if !feasibility::is_feasible(self.ctx.grid().await.as_ref(), params, &next, &crate::common::state::Effort::ZERO) {
                // Fraction-preserved rollback: keep whatever fraction of the sweep
                // already completed (spec.md §6 "FPR ∈ (0,1)").
                let rolled_back_theta = state.theta + (target_theta - state.theta) * params.fpr;
                let partial = PlanSegment::constant(
                    State { theta: rolled_back_theta, ..state },
                    Utc::now(),
                    "car",
                );
                return RotationOutcome::Infeasible(partial);
            }
            state = next;
        }
        RotationOutcome::Completed(state)
    }

    async fn preempt_and_reset(&self) -> MoveOutcome {
        for kind in [BehaviorKind::Car, BehaviorKind::Boat, BehaviorKind::Escape] {
            self.ctx.behaviors.get(kind).planner.kill_update();
        }
        self.ctx.wait_for_busy_release().await;
        for kind in [BehaviorKind::Car, BehaviorKind::Boat, BehaviorKind::Escape] {
            self.ctx.behaviors.get(kind).planner.unkill();
        }
        self.ctx.clear_committed().await;
        self.ctx.set_time_till_issue(None).await;
        MoveOutcome::Preempted
    }
}

#[derive(Debug)]
enum RotationOutcome {
    Completed(State),
    Infeasible(PlanSegment),
    Preempted,
}

fn heading_to(from: Vec2D<f64>, to: Vec2D<f64>) -> Option<f64> {
    let d = from.to(&to);
    if d.abs() < 1e-9 { None } else { Some(d.y().atan2(d.x())) }
}

fn focus_heading(goal: Vec2D<f64>, focus: Vec2D<f64>) -> f64 {
    let d = goal.to(&focus);
    d.y().atan2(d.x())
}

impl SupervisorContext {
    /// Feasibility check used from inside the reference planner's synchronous
    /// tree expansion (spec.md §6 `set_feasibility_function`).
    fn grid_blocking_check(&self, params: &crate::config::BehaviorParams, x: &State, u: &crate::common::state::Effort) -> bool {
        match self.try_read_grid() {
            Some(guard) => feasibility::is_feasible(guard.as_ref(), params, x, u),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::grid::OccupancyGrid;
    use crate::config::Config;
    use crate::planning::behavior::{Behavior, BehaviorSet};
    use crate::planning::planner::PlannerHandle;
    use crate::planning::reference_planner::{ReferencePlanner, SteeringGains};

    fn test_behaviors() -> BehaviorSet {
        let make = |kind| {
            let planner: Arc<dyn PlannerHandle> =
                Arc::new(ReferencePlanner::new(0.1, [2.0, 2.0, 1.0], SteeringGains { k_pos: 1.0, k_theta: 2.0 }, 0.3, 400));
            Behavior::new(kind, planner)
        };
        BehaviorSet { car: make(BehaviorKind::Car), boat: make(BehaviorKind::Boat), escape: make(BehaviorKind::Escape) }
    }

    fn test_supervisor() -> Supervisor {
        Supervisor::new(Arc::new(SupervisorContext::new(Config::default(), test_behaviors())))
    }

    #[tokio::test]
    async fn rotation_completes_feasible_sweep() {
        let sup = test_supervisor();
        let start = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let outcome = sup.rotation_pre_move(start, std::f64::consts::FRAC_PI_2, &CancellationToken::new()).await;
        match outcome {
            RotationOutcome::Completed(end) => {
                assert!(angle_diff(end.theta, start.theta + std::f64::consts::FRAC_PI_2).abs() < 1e-6);
            }
            other => panic!("expected a completed rotation, got {other:?}"),
        }
    }

    // FPR rollback: a wall swept into partway through the turn makes the sweep
    // infeasible; the returned partial segment keeps only `fpr` of the
    // fraction already turned, not the full requested heading error.
    #[tokio::test]
    async fn rotation_infeasible_mid_sweep_rolls_back_by_fpr() {
        let sup = test_supervisor();
        let start = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);

        // A wall spanning y in [1.5, 2.5) across the whole grid: the boat's
        // footprint (length 4, half-length 2) swings into it well before a
        // full pi turn completes.
        let (width, height, res) = (20u32, 20u32, 0.5);
        let mut data = vec![0u8; (width * height) as usize];
        for col in 0..width {
            data[13 * width as usize + col as usize] = 255;
            data[14 * width as usize + col as usize] = 255;
        }
        let grid = OccupancyGrid::new(width, height, Vec2D::new(-5.0, -5.0), res, data);
        sup.context().set_grid(grid).await;

        let heading_err = std::f64::consts::PI;
        let outcome = sup.rotation_pre_move(start, heading_err, &CancellationToken::new()).await;
        match outcome {
            RotationOutcome::Infeasible(partial) => {
                let rolled_back_theta = partial.sample(0.0).theta;
                assert_eq!(partial.behavior_name, "car");
                assert!(rolled_back_theta.abs() > 1e-9, "expected some progress before the failing step");
                assert!(
                    rolled_back_theta < heading_err,
                    "rollback must stop short of the full requested turn, got {rolled_back_theta}"
                );
            }
            other => panic!("expected an infeasible rotation with a rolled-back partial, got {other:?}"),
        }
    }
}
