//! A concrete, in-process stand-in for the external LQR-RRT planner.
//!
//! spec.md §1 treats "the RRT tree expansion and LQR cost-to-go itself" as an
//! external collaborator specified only at its interface — this module is that
//! collaborator's one in-scope implementation, so the supervisor has something
//! real to chain against. It builds an RRT-ish tree with `kiddo` nearest-neighbor
//! queries (grounded on the teacher's `ImmutableKdTree` usage in
//! `flight_control::common::bayesian_set`, generalized here to a growing,
//! mutable tree since RRT inserts nodes incrementally) and steers each extension
//! with a simple proportional law standing in for the LQR gain.

use crate::common::state::{angle_diff, Effort, State};
use crate::common::vec2d::Vec2D;
use crate::planning::planner::{FeasibilityFn, GoalBias, PlannerHandle, SampleSpace};
use async_trait::async_trait;
use kiddo::{KdTree, SquaredEuclidean};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

struct PlanResult {
    x_seq: Vec<State>,
    u_seq: Vec<Effort>,
    horizon: f64,
    tree_size: usize,
    reached_goal: bool,
}

impl PlanResult {
    fn idle(seed: State) -> Self {
        Self { x_seq: vec![seed], u_seq: Vec::new(), horizon: 0.0, tree_size: 1, reached_goal: false }
    }
}

/// Proportional steering gains standing in for the per-behavior LQR controller.
#[derive(Debug, Clone, Copy)]
pub struct SteeringGains {
    pub k_pos: f64,
    pub k_theta: f64,
}

pub struct ReferencePlanner {
    dt: f64,
    velmax_pos: [f64; 3],
    gains: SteeringGains,
    goal_tol: f64,
    max_nodes: usize,
    goal: RwLock<State>,
    feasibility: RwLock<Option<FeasibilityFn>>,
    kill_flag: AtomicBool,
    result: RwLock<PlanResult>,
}

impl ReferencePlanner {
    pub fn new(dt: f64, velmax_pos: [f64; 3], gains: SteeringGains, goal_tol: f64, max_nodes: usize) -> Self {
        Self {
            dt,
            velmax_pos,
            gains,
            goal_tol,
            max_nodes,
            goal: RwLock::new(State::ZERO),
            feasibility: RwLock::new(None),
            kill_flag: AtomicBool::new(false),
            result: RwLock::new(PlanResult::idle(State::ZERO)),
        }
    }

    /// One proportional extension step from `from` toward `towards`, capped by
    /// `velmax_pos` and integrated over `dt` — the steering law standing in for
    /// the LQR controller's action at each tree extension.
    fn steer(&self, from: State, towards: Vec2D<f64>) -> (State, Effort) {
        let to_target = from.pos().to(&towards);
        let dist = to_target.abs();
        let desired_heading = if dist > 1e-9 { to_target.y().atan2(to_target.x()) } else { from.theta };
        let dtheta = angle_diff(desired_heading, from.theta);

        let speed = (self.gains.k_pos * dist).min(self.velmax_pos[0]);
        let omega = (self.gains.k_theta * dtheta).clamp(-self.velmax_pos[2], self.velmax_pos[2]);

        let heading = from.theta + omega * self.dt;
        let vx = speed * heading.cos();
        let vy = speed * heading.sin();

        let next = State::new(from.x + vx * self.dt, from.y + vy * self.dt, heading, vx, vy, omega);
        let effort = Effort::new(self.gains.k_pos * (vx - from.vx), self.gains.k_pos * (vy - from.vy), self.gains.k_theta * omega);
        (next, effort)
    }

    fn sample_point(&self, sample_space: SampleSpace, goal_bias: GoalBias, guide: Vec2D<f64>, goal: Vec2D<f64>) -> Vec2D<f64> {
        let mut rng = rand::rng();
        let bias = (goal_bias[0] + goal_bias[1]) / 2.0;
        let roll: f64 = rng.random();
        if roll < bias {
            return goal;
        }
        if roll < bias + 0.15 {
            return guide;
        }
        let ((xmin, xmax), (ymin, ymax)) = sample_space;
        Vec2D::new(rng.random_range(xmin..=xmax.max(xmin + 1e-6)), rng.random_range(ymin..=ymax.max(ymin + 1e-6)))
    }
}

#[async_trait]
impl PlannerHandle for ReferencePlanner {
    async fn set_goal(&self, goal: State) { *self.goal.write().unwrap() = goal; }

    fn set_feasibility_function(&self, f: FeasibilityFn) {
        *self.feasibility.write().unwrap() = Some(f);
    }

    fn unkill(&self) { self.kill_flag.store(false, Ordering::Release); }

    fn kill_update(&self) { self.kill_flag.store(true, Ordering::Release); }

    #[allow(clippy::cast_precision_loss)]
    async fn update_plan(
        &self,
        x0: State,
        sample_space: SampleSpace,
        goal_bias: GoalBias,
        guide: Vec2D<f64>,
        specific_time: f64,
    ) -> bool {
        let goal = *self.goal.read().unwrap();
        let feasible = self.feasibility.read().unwrap().clone();
        let is_feasible = |x: &State, u: &Effort| feasible.as_ref().is_none_or(|f| f(x, u));

        let steps = ((specific_time / self.dt).round() as usize).max(1);

        let mut tree = KdTree::<f64, 2>::new();
        let mut nodes: Vec<State> = vec![x0];
        tree.add(&[x0.x, x0.y], 0);

        let mut reached_goal = false;
        let mut node_count = 1usize;
        let mut attempts = 0usize;
        // Bounds wall-clock work even when every sample comes back infeasible
        // (e.g. the goal is walled off): an RRT that never grows its tree
        // would otherwise spin the executor forever instead of returning a
        // partial/unreached plan.
        let max_attempts = self.max_nodes.max(steps).saturating_mul(50);

        while node_count < self.max_nodes && node_count <= steps && attempts < max_attempts {
            if self.kill_flag.load(Ordering::Acquire) {
                return false;
            }
            attempts += 1;
            if attempts % 32 == 0 {
                tokio::task::yield_now().await;
            }

            let sample = self.sample_point(sample_space, goal_bias, guide, goal.pos());
            let nearest = tree.nearest_one::<SquaredEuclidean>(&[sample.x(), sample.y()]);
            let from = nodes[nearest.item as usize];

            let (next, effort) = self.steer(from, sample);
            if !is_feasible(&next, &effort) {
                continue;
            }

            tree.add(&[next.x, next.y], node_count as u64);
            nodes.push(next);
            node_count += 1;

            if next.pos().euclid_distance(&goal.pos()) < self.goal_tol {
                reached_goal = true;
                break;
            }
        }

        if self.kill_flag.load(Ordering::Acquire) {
            return false;
        }

        // Walk the tree back from the closest-to-goal node to x0 to produce a
        // single chained x_seq/u_seq — the "path" the committed segment follows.
        let goal_pos = goal.pos();
        let best = nodes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.pos().euclid_distance(&goal_pos).total_cmp(&b.pos().euclid_distance(&goal_pos))
            })
            .map_or(0, |(i, _)| i);

        let mut x_seq = Vec::with_capacity(best + 1);
        let mut u_seq = Vec::with_capacity(best);
        for i in 0..=best {
            x_seq.push(nodes[i]);
            if i > 0 {
                u_seq.push(self.steer(nodes[i - 1], nodes[i].pos()).1);
            }
        }
        let horizon = (x_seq.len().saturating_sub(1)) as f64 * self.dt;

        *self.result.write().unwrap() =
            PlanResult { x_seq, u_seq, horizon, tree_size: node_count, reached_goal };
        true
    }

    fn x_seq(&self) -> Vec<State> { self.result.read().unwrap().x_seq.clone() }
    fn u_seq(&self) -> Vec<Effort> { self.result.read().unwrap().u_seq.clone() }
    fn horizon(&self) -> f64 { self.result.read().unwrap().horizon }
    fn tree_size(&self) -> usize { self.result.read().unwrap().tree_size }
    fn plan_reached_goal(&self) -> bool { self.result.read().unwrap().reached_goal }

    fn get_state(&self, t: f64) -> State {
        let result = self.result.read().unwrap();
        sample_state(&result.x_seq, self.dt, t)
    }

    fn get_effort(&self, t: f64) -> Effort {
        let result = self.result.read().unwrap();
        sample_effort(&result.u_seq, self.dt, t)
    }

    fn gen_ss(&self, seed: Vec2D<f64>, goal: Vec2D<f64>, push: f64) -> SampleSpace {
        let lo = seed.min_components(&goal);
        let hi = seed.max_components(&goal);
        ((lo.x() - push, hi.x() + push), (lo.y() - push, hi.y() + push))
    }
}

fn sample_state(x_seq: &[State], dt: f64, t: f64) -> State {
    if x_seq.is_empty() { return State::ZERO; }
    if x_seq.len() == 1 { return x_seq[0]; }
    let clamped = t.clamp(0.0, dt * (x_seq.len() - 1) as f64);
    let raw = clamped / dt;
    let lo = (raw.floor() as usize).min(x_seq.len() - 1);
    let hi = (lo + 1).min(x_seq.len() - 1);
    let frac = raw - lo as f64;
    let a = x_seq[lo];
    let b = x_seq[hi];
    State {
        x: a.x + (b.x - a.x) * frac,
        y: a.y + (b.y - a.y) * frac,
        theta: a.theta + angle_diff(b.theta, a.theta) * frac,
        vx: a.vx + (b.vx - a.vx) * frac,
        vy: a.vy + (b.vy - a.vy) * frac,
        omega: a.omega + (b.omega - a.omega) * frac,
    }
}

fn sample_effort(u_seq: &[Effort], dt: f64, t: f64) -> Effort {
    if u_seq.is_empty() { return Effort::ZERO; }
    if u_seq.len() == 1 { return u_seq[0]; }
    let clamped = t.clamp(0.0, dt * (u_seq.len() - 1) as f64);
    let raw = clamped / dt;
    let lo = (raw.floor() as usize).min(u_seq.len() - 1);
    let hi = (lo + 1).min(u_seq.len() - 1);
    let frac = raw - lo as f64;
    let a = u_seq[lo];
    let b = u_seq[hi];
    Effort::new(a.fx + (b.fx - a.fx) * frac, a.fy + (b.fy - a.fy) * frac, a.tz + (b.tz - a.tz) * frac)
}
