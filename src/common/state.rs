//! The state/effort vectors and SO(2) error math described in spec.md §3 and the
//! `erf`/`angle_diff` helpers from the original `lqrrt_node.py`.

use super::vec2d::Vec2D;
use std::fmt::Display;

/// Planar pose plus body-frame rates: `(x, y, theta, vx, vy, omega)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl State {
    pub const ZERO: State = State { x: 0.0, y: 0.0, theta: 0.0, vx: 0.0, vy: 0.0, omega: 0.0 };

    pub fn new(x: f64, y: f64, theta: f64, vx: f64, vy: f64, omega: f64) -> Self {
        Self { x, y, theta, vx, vy, omega }
    }

    pub fn pos(&self) -> Vec2D<f64> { Vec2D::new(self.x, self.y) }

    /// A goal pose carries zero velocity components (spec.md §3).
    pub fn as_goal(pos: Vec2D<f64>, theta: f64) -> Self {
        Self { x: pos.x(), y: pos.y(), theta, vx: 0.0, vy: 0.0, omega: 0.0 }
    }

    /// Same pose, velocities zeroed — used when re-verifying a plan: collision checks
    /// don't care about speed, only footprint placement (spec.md §4.4).
    pub fn zero_vel(&self) -> Self { Self { vx: 0.0, vy: 0.0, omega: 0.0, ..*self } }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}, {:.2} | {:.2}, {:.2}, {:.2}]",
            self.x, self.y, self.theta, self.vx, self.vy, self.omega
        )
    }
}

/// Body-frame forces and torque `(fx, fy, tz)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effort {
    pub fx: f64,
    pub fy: f64,
    pub tz: f64,
}

impl Effort {
    pub const ZERO: Effort = Effort { fx: 0.0, fy: 0.0, tz: 0.0 };

    pub fn new(fx: f64, fy: f64, tz: f64) -> Self { Self { fx, fy, tz } }
}

/// The componentwise state error `xgoal - x`, with the heading component taken
/// properly on SO(2) via [`angle_diff`].
///
/// Matches the original's `erf`: `e[2] = angle_diff(xgoal[2], x[2])`.
pub fn erf(xgoal: &State, x: &State) -> [f64; 6] {
    [
        xgoal.x - x.x,
        xgoal.y - x.y,
        angle_diff(xgoal.theta, x.theta),
        xgoal.vx - x.vx,
        xgoal.vy - x.vy,
        xgoal.omega - x.omega,
    ]
}

/// Signed angular difference `agoal - a`, taken modulo 2*pi into `(-pi, pi]`.
///
/// Computed via `atan2` of the rotation between the two headings rather than a
/// naive subtraction-and-wrap, so it is exact at the branch cut (spec.md §8
/// invariant 5).
pub fn angle_diff(agoal: f64, a: f64) -> f64 {
    let (s, c) = a.sin_cos();
    let (sg, cg) = agoal.sin_cos();
    (sg * c - cg * s).atan2(cg * c + sg * s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_diff_result_in_branch() {
        let d = angle_diff(3.0, -3.0);
        assert!(d > -std::f64::consts::PI && d <= std::f64::consts::PI);
    }

    #[test]
    fn angle_diff_periodic() {
        let a = 0.4;
        let b = -1.1;
        let base = angle_diff(a, b);
        for k in -2..=2 {
            for m in -2..=2 {
                let shifted = angle_diff(
                    a + 2.0 * std::f64::consts::PI * f64::from(k),
                    b + 2.0 * std::f64::consts::PI * f64::from(m),
                );
                assert!((shifted - base).abs() < 1e-9, "k={k} m={m}");
            }
        }
    }

    #[test]
    fn erf_matches_rotation_from_b_to_a() {
        let a = State::new(1.0, 2.0, 1.2, 0.0, 0.0, 0.0);
        let b = State::new(1.0, 2.0, -0.7, 0.0, 0.0, 0.0);
        let e = erf(&a, &b);
        assert_eq!(e[0], 0.0);
        assert_eq!(e[1], 0.0);
        let d = e[2];
        assert!(d > -std::f64::consts::PI && d <= std::f64::consts::PI);
        let expected = (1.2_f64 - (-0.7)).sin();
        assert!((d.sin() - expected).abs() < 1e-9);
    }
}
