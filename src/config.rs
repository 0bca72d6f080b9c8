//! Configuration surface for the replanning supervisor: everything spec §6 lists
//! as per-behavior parameters, plus the few crate-wide constants.

use crate::common::vec2d::Vec2D;

/// Per-behavior and supervisor-wide tuning knobs.
///
/// Defaults are chosen to be reasonable for a small harbor-scale vehicle; every
/// field can be overridden individually when constructing a non-default `Config`.
#[derive(Debug, Clone)]
pub struct BehaviorParams {
    pub dt: f64,
    pub basic_duration: f64,
    pub pointshoot_tol: f64,
    pub free_radius: f64,
    pub real_tol: [f64; 6],
    pub velmax_pos: [f64; 3],
    pub stuck_threshold: usize,
    pub fudge_factor: f64,
    /// Fraction-preserved rollback applied to a rotation move that goes infeasible mid-sweep.
    pub fpr: f64,
    pub ss_step: f64,
    pub ss_start: f64,
    pub boat_width: f64,
    pub boat_length: f64,
    /// Body-frame footprint point cloud used by the feasibility oracle.
    pub vps: Vec<Vec2D<f64>>,
    pub vps_spacing: f64,
    pub ogrid_threshold: u8,
}

impl Default for BehaviorParams {
    fn default() -> Self {
        Self {
            dt: 0.1,
            basic_duration: 4.0,
            pointshoot_tol: 0.2,
            free_radius: 4.0,
            real_tol: [0.5, 0.5, 0.2, 0.5, 0.5, 0.2],
            velmax_pos: [2.0, 2.0, 1.0],
            stuck_threshold: 3,
            fudge_factor: 0.9,
            fpr: 0.9,
            ss_step: 2.0,
            ss_start: 1.0,
            boat_width: 2.0,
            boat_length: 4.0,
            vps: default_footprint(2.0, 4.0),
            vps_spacing: 0.5,
            ogrid_threshold: 90,
        }
    }
}

/// A coarse rectangular footprint point cloud, sampled along the hull perimeter.
fn default_footprint(width: f64, length: f64) -> Vec<Vec2D<f64>> {
    let hw = width / 2.0;
    let hl = length / 2.0;
    vec![
        Vec2D::new(hl, 0.0),
        Vec2D::new(hl, hw),
        Vec2D::new(0.0, hw),
        Vec2D::new(-hl, hw),
        Vec2D::new(-hl, 0.0),
        Vec2D::new(-hl, -hw),
        Vec2D::new(0.0, -hw),
        Vec2D::new(hl, -hw),
    ]
}

/// Top-level configuration, one `BehaviorParams` shared by all three behaviors.
///
/// Real deployments differ `car`/`boat`/`escape` tuning; spec §6 treats the
/// parameter surface as per-behavior but the fields that matter to the supervisor
/// (tolerances, timing, footprint) are shared, so a single struct is threaded
/// through and behaviors are free to special-case at the `gen_ss`/`dynamics` level.
#[derive(Debug, Clone)]
pub struct Config {
    pub params: BehaviorParams,
}

impl Config {
    const REVISIT_PERIOD_ENV: &'static str = "COXSWAIN_REVISIT_PERIOD_MS";

    pub fn from_env() -> Self {
        let mut params = BehaviorParams::default();
        if let Ok(v) = std::env::var(Self::REVISIT_PERIOD_ENV) {
            if let Ok(ms) = v.parse::<u64>() {
                params.dt = ms as f64 / 1000.0;
            } else {
                crate::warn!("Ignoring malformed {} value: {v}", Self::REVISIT_PERIOD_ENV);
            }
        }
        Self { params }
    }
}

impl Default for Config {
    fn default() -> Self { Self { params: BehaviorParams::default() } }
}
