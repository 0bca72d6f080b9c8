//! The committed plan segment and its Reference Clock (spec.md §3, §4.5, §9).

use crate::common::state::{Effort, State};
use chrono::{DateTime, Utc};

/// An immutable snapshot of one committed `tree_chain` outcome.
///
/// Spec.md §9 models `get_ref`/`get_eff` as closures over the committed
/// sequences; here that's a value type with a `sample` method, swapped in as a
/// whole behind a lock on each commit rather than mutated in place (so readers
/// never see a torn `(x_seq, u_seq, t_update)` tuple — spec.md §5 ordering
/// guarantee on plan commits).
#[derive(Debug, Clone)]
pub struct PlanSegment {
    pub x_seq: Vec<State>,
    pub u_seq: Vec<Effort>,
    pub dt: f64,
    pub t_update: DateTime<Utc>,
    pub horizon: f64,
    pub tree_size: usize,
    pub reached_goal: bool,
    pub behavior_name: &'static str,
}

impl PlanSegment {
    /// A constant segment holding `state` forever — used for `hold` and for goal
    /// arrival (spec.md §4.1 "install a constant reference").
    pub fn constant(state: State, t_update: DateTime<Utc>, behavior_name: &'static str) -> Self {
        Self {
            x_seq: vec![state],
            u_seq: vec![Effort::ZERO],
            dt: 1.0,
            t_update,
            horizon: 0.0,
            tree_size: 0,
            reached_goal: true,
            behavior_name,
        }
    }

    /// Parameter `t` elapsed since `t_update` at wall-clock `now`.
    pub fn param_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.t_update).num_milliseconds() as f64 / 1000.0
    }

    /// Linear-interpolated state at parameter `t`, clamped to the sequence's
    /// endpoints outside `[0, horizon]` (spec.md §4.5).
    pub fn sample(&self, t: f64) -> State {
        let (lo, hi, frac) = self.interp_indices(t);
        let a = self.x_seq[lo];
        let b = self.x_seq[hi];
        State {
            x: lerp(a.x, b.x, frac),
            y: lerp(a.y, b.y, frac),
            theta: a.theta + crate::common::state::angle_diff(b.theta, a.theta) * frac,
            vx: lerp(a.vx, b.vx, frac),
            vy: lerp(a.vy, b.vy, frac),
            omega: lerp(a.omega, b.omega, frac),
        }
    }

    /// Linear-interpolated effort at parameter `t`, clamped to endpoints.
    pub fn sample_effort(&self, t: f64) -> Effort {
        if self.u_seq.is_empty() { return Effort::ZERO; }
        let (lo, hi, frac) = self.interp_effort_indices(t);
        let a = self.u_seq[lo];
        let b = self.u_seq[hi];
        Effort::new(lerp(a.fx, b.fx, frac), lerp(a.fy, b.fy, frac), lerp(a.tz, b.tz, frac))
    }

    fn interp_indices(&self, t: f64) -> (usize, usize, f64) {
        let n = self.x_seq.len();
        if n <= 1 { return (0, 0, 0.0); }
        let clamped = t.clamp(0.0, self.dt * (n - 1) as f64);
        let raw = clamped / self.dt;
        let lo = (raw.floor() as usize).min(n - 1);
        let hi = (lo + 1).min(n - 1);
        (lo, hi, raw - lo as f64)
    }

    fn interp_effort_indices(&self, t: f64) -> (usize, usize, f64) {
        let n = self.u_seq.len();
        if n <= 1 { return (0, 0, 0.0); }
        let clamped = t.clamp(0.0, self.dt * (n - 1) as f64);
        let raw = clamped / self.dt;
        let lo = (raw.floor() as usize).min(n - 1);
        let hi = (lo + 1).min(n - 1);
        (lo, hi, raw - lo as f64)
    }
}

fn lerp(a: f64, b: f64, frac: f64) -> f64 { a + (b - a) * frac }

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn seg() -> PlanSegment {
        PlanSegment {
            x_seq: vec![
                State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                State::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
                State::new(2.0, 0.0, 0.0, 0.0, 0.0, 0.0),
            ],
            u_seq: vec![Effort::ZERO, Effort::ZERO],
            dt: 1.0,
            t_update: Utc::now(),
            horizon: 2.0,
            tree_size: 3,
            reached_goal: true,
            behavior_name: "car",
        }
    }

    #[test]
    fn sample_interpolates_midpoint() {
        let s = seg();
        let mid = s.sample(0.5);
        assert!((mid.x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sample_clamps_past_horizon() {
        let s = seg();
        let end = s.sample(100.0);
        assert!((end.x - 2.0).abs() < 1e-9);
        let start = s.sample(-5.0);
        assert!((start.x - 0.0).abs() < 1e-9);
    }

    #[test]
    fn constant_segment_holds_forever() {
        let state = State::new(1.0, 2.0, 0.3, 0.0, 0.0, 0.0);
        let seg = PlanSegment::constant(state, Utc::now(), "car");
        assert_eq!(seg.sample(0.0), state);
        assert_eq!(seg.sample(1000.0), state);
        let later = seg.t_update + TimeDelta::seconds(5);
        assert_eq!(seg.sample(seg.param_at(later)), state);
    }
}
