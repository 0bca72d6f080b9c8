#![allow(dead_code)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]

mod common;
mod config;
mod logger;
mod planning;
mod supervisor;

use common::grid::OccupancyGrid;
use common::state::State;
use common::vec2d::Vec2D;
use config::Config;
use planning::behavior::{Behavior, BehaviorKind, BehaviorSet};
use planning::planner::PlannerHandle;
use planning::reference_planner::{ReferencePlanner, SteeringGains};
use std::sync::Arc;
use supervisor::context::SupervisorContext;
use supervisor::signal::MoveOutcome;
use supervisor::signal::MoveFeedback;
use supervisor::supervisor::Supervisor;
use tokio_util::sync::CancellationToken;

fn behavior_set(config: &Config) -> BehaviorSet {
    let params = &config.params;
    let make = |kind| {
        let planner: Arc<dyn PlannerHandle> = Arc::new(ReferencePlanner::new(
            params.dt,
            params.velmax_pos,
            SteeringGains { k_pos: 1.0, k_theta: 2.0 },
            params.pointshoot_tol,
            800,
        ));
        Behavior::new(kind, planner)
    };
    BehaviorSet { car: make(BehaviorKind::Car), boat: make(BehaviorKind::Boat), escape: make(BehaviorKind::Escape) }
}

/// A 40x40m harbor basin, origin at its southwest corner, with a single
/// rectangular pier jutting from the north wall that the vehicle has to route
/// around on its way to the far shore.
fn harbor_grid() -> OccupancyGrid {
    let (width, height, res) = (80u32, 80u32, 0.5);
    let mut data = vec![0u8; (width * height) as usize];
    for row in 40..70 {
        for col in 30..50 {
            data[(row * width + col) as usize] = 255;
        }
    }
    OccupancyGrid::new(width, height, Vec2D::new(0.0, 0.0), res, data)
}

/// Simulates odometry by feeding the supervisor's own committed reference
/// back in as truth, the way a well-tracking vehicle would report it.
async fn odometry_loop(ctx: Arc<SupervisorContext>, preempt: CancellationToken) {
    loop {
        if preempt.is_cancelled() {
            return;
        }
        if let Some((seg, _)) = ctx.committed().await.as_ref() {
            let now = seg.param_at(chrono::Utc::now());
            ctx.set_state(seg.sample(now)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = Config::from_env();
    let behaviors = behavior_set(&config);
    let ctx = Arc::new(SupervisorContext::new(config, behaviors));
    ctx.set_state(State::new(5.0, 5.0, 0.0, 0.0, 0.0, 0.0)).await;
    ctx.set_grid(harbor_grid()).await;

    let supervisor = Supervisor::new(ctx.clone());
    let preempt = CancellationToken::new();
    let odom = tokio::spawn(odometry_loop(ctx.clone(), preempt.clone()));

    let (feedback_tx, mut feedback_rx) = tokio::sync::mpsc::channel::<MoveFeedback>(16);
    let reporter = tokio::spawn(async move {
        while let Some(fb) = feedback_rx.recv().await {
            info!(
                "behavior={} tree_size={} reached_goal={} tracking={} next_chain_in={:.2}s",
                fb.behavior_name, fb.tree_size, fb.reached_goal, fb.tracking, fb.time_until_next_chain
            );
        }
    });

    info!("starting phase 0: drive across the harbor, around the pier");
    let goal = State::as_goal(Vec2D::new(35.0, 35.0), 0.0);
    let outcome = supervisor.mv(goal, "drive", None, preempt.clone(), feedback_tx.clone()).await;
    match outcome {
        MoveOutcome::Succeeded => info!("phase 0 complete: goal reached"),
        MoveOutcome::Preempted => warn!("phase 0 preempted"),
        MoveOutcome::Aborted(reason) => error!("phase 0 aborted: {reason}"),
    }

    info!("starting phase 1: hold station");
    let hold_outcome = supervisor.mv(State::ZERO, "hold", None, preempt.clone(), feedback_tx).await;
    info!("phase 1 outcome: {hold_outcome:?}");

    preempt.cancel();
    drop(odom);
    drop(reporter);
}
