//! The external planner contract (spec.md §6).
//!
//! The RRT tree expansion, LQR cost-to-go, and dynamics models behind a
//! concrete planner are out of scope for the supervisor (spec.md §1) — the
//! supervisor only ever talks to a `PlannerHandle`. [`reference_planner`] ships
//! one concrete implementation behind this trait.

use crate::common::state::{Effort, State};
use crate::common::vec2d::Vec2D;
use async_trait::async_trait;
use std::sync::Arc;

/// A feasibility test injected by the Feasibility Oracle (spec.md §6:
/// `constraints.set_feasibility_function(f)`) so the tree expansion prunes
/// branches that would collide with the current grid without the planner
/// needing to know anything about grids itself.
pub type FeasibilityFn = Arc<dyn Fn(&State, &Effort) -> bool + Send + Sync>;

/// An axis-aligned world-frame rectangle `((xmin, xmax), (ymin, ymax))` restricting
/// where the planner may draw new samples (spec.md Glossary: "Sample space").
pub type SampleSpace = ((f64, f64), (f64, f64));

/// Per-dimension weighting applied to random sampling (spec.md Glossary: "Goal bias").
pub type GoalBias = [f64; 6];

/// A planner behind the supervisor's `tree_chain` loop.
///
/// `update_plan` is the one blocking call in the whole system (spec.md §5): it
/// runs synchronously to completion or until `kill_update` causes it to abort
/// early and return `false`. Everything else here must complete in bounded time.
#[async_trait]
pub trait PlannerHandle: Send + Sync {
    /// Installs the goal this planner should steer future `update_plan` calls toward.
    async fn set_goal(&self, goal: State);

    /// Installs the collision test the tree expansion consults before accepting
    /// a candidate node (spec.md §6 `constraints.set_feasibility_function`).
    fn set_feasibility_function(&self, f: FeasibilityFn);

    /// Clears a pending kill request. Must be called before the next `update_plan`
    /// (spec.md §5 cancellation contract).
    fn unkill(&self);

    /// Idempotent: requests that the in-progress (or next) `update_plan` abort at
    /// its next cooperative checkpoint and return `false`.
    fn kill_update(&self);

    /// Runs one planning update from `x0` toward the installed goal, respecting
    /// `sample_space`/`goal_bias`/`guide`, targeting `specific_time` as the horizon.
    /// Returns `true` on a clean, uninterrupted completion; `false` if killed.
    async fn update_plan(
        &self,
        x0: State,
        sample_space: SampleSpace,
        goal_bias: GoalBias,
        guide: Vec2D<f64>,
        specific_time: f64,
    ) -> bool;

    /// Sample sequence of the most recently completed clean update.
    fn x_seq(&self) -> Vec<State>;
    /// Effort sequence matching `x_seq`, one entry shorter (no effort past the horizon).
    fn u_seq(&self) -> Vec<Effort>;
    /// Horizon, in seconds, of the most recently completed clean update.
    fn horizon(&self) -> f64;
    /// Node count of the RRT tree built by the most recently completed update.
    fn tree_size(&self) -> usize;
    /// Whether the most recently completed update's tree reached the goal region.
    fn plan_reached_goal(&self) -> bool;

    /// Linear-interpolated state at parameter `t` (clamped to the sequence's endpoints).
    fn get_state(&self, t: f64) -> State;
    /// Linear-interpolated effort at parameter `t` (clamped to the sequence's endpoints).
    fn get_effort(&self, t: f64) -> Effort;

    /// The sample-space rectangle this behavior would draw around `(seed, goal)`,
    /// expanded by `push` world units per axis (spec.md §4.3 step 7).
    fn gen_ss(&self, seed: Vec2D<f64>, goal: Vec2D<f64>, push: f64) -> SampleSpace;
}
