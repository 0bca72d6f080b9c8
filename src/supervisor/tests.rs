use super::context::SupervisorContext;
use super::signal::{ChainOutcome, MoveOutcome, MoveRejection};
use super::supervisor::Supervisor;
use crate::common::grid::OccupancyGrid;
use crate::common::state::State;
use crate::common::types::MoveType;
use crate::common::vec2d::Vec2D;
use crate::config::Config;
use crate::planning::behavior::{Behavior, BehaviorKind, BehaviorSet};
use crate::planning::planner::PlannerHandle;
use crate::planning::reference_planner::{ReferencePlanner, SteeringGains};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn test_behaviors() -> BehaviorSet {
    let make = |kind| {
        let planner: Arc<dyn PlannerHandle> = Arc::new(ReferencePlanner::new(
            0.1,
            [2.0, 2.0, 1.0],
            SteeringGains { k_pos: 1.0, k_theta: 2.0 },
            0.3,
            400,
        ));
        Behavior::new(kind, planner)
    };
    BehaviorSet { car: make(BehaviorKind::Car), boat: make(BehaviorKind::Boat), escape: make(BehaviorKind::Escape) }
}

fn test_supervisor() -> Supervisor {
    let ctx = Arc::new(SupervisorContext::new(Config::default(), test_behaviors()));
    Supervisor::new(ctx)
}

fn feedback_channel() -> (tokio::sync::mpsc::Sender<super::signal::MoveFeedback>, tokio::sync::mpsc::Receiver<super::signal::MoveFeedback>)
{
    tokio::sync::mpsc::channel(8)
}

// E1: hold succeeds immediately with a constant reference.
#[tokio::test]
async fn e1_hold_succeeds_immediately() {
    let sup = test_supervisor();
    let start = State::new(1.0, 2.0, 0.3, 0.0, 0.0, 0.0);
    sup.context().set_state(start).await;
    let (tx, _rx) = feedback_channel();

    let outcome = sup.mv(start, "hold", None, CancellationToken::new(), tx).await;
    assert_eq!(outcome, MoveOutcome::Succeeded);

    let committed = sup.context().committed().await;
    let (seg, _) = committed.as_ref().expect("hold commits a segment");
    assert_eq!(seg.sample(0.0), start);
    assert_eq!(seg.sample(1000.0), start);
}

// E2: an unrecognized move type aborts with `move_type`, no state mutated.
#[tokio::test]
async fn e2_unknown_move_type_is_rejected() {
    let sup = test_supervisor();
    sup.context().set_state(State::ZERO).await;
    let (tx, _rx) = feedback_channel();

    let outcome = sup.mv(State::ZERO, "fly", None, CancellationToken::new(), tx).await;
    assert_eq!(outcome, MoveOutcome::Aborted(MoveRejection::MoveType));
    assert!(sup.context().committed().await.is_none());
}

// "circle" is declared but unimplemented: fails fast with `patience`.
#[tokio::test]
async fn circle_move_rejected_with_patience() {
    let sup = test_supervisor();
    sup.context().set_state(State::ZERO).await;
    let (tx, _rx) = feedback_channel();

    let outcome = sup.mv(State::ZERO, "circle", None, CancellationToken::new(), tx).await;
    assert_eq!(outcome, MoveOutcome::Aborted(MoveRejection::Patience));
}

#[tokio::test]
async fn move_without_odom_is_rejected() {
    let sup = test_supervisor();
    let (tx, _rx) = feedback_channel();
    let outcome = sup.mv(State::ZERO, "hold", None, CancellationToken::new(), tx).await;
    assert_eq!(outcome, MoveOutcome::Aborted(MoveRejection::Odom));
}

// E3: heading to goal already aligned (within pointshoot_tol) -> no rotation
// pre-move, chaining begins directly with `car` since the goal is beyond
// free_radius.
#[tokio::test]
async fn e3_aligned_heading_skips_rotation_and_selects_car() {
    let sup = test_supervisor();
    let start = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    sup.context().set_state(start).await;
    sup.context().set_goal(State::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0)).await;
    sup.context().set_move_type(MoveType::Drive).await;

    let outcome = sup.tree_chain().await;
    assert_eq!(outcome, ChainOutcome::Clean);

    let committed = sup.context().committed().await;
    let (_, behavior) = committed.as_ref().expect("chain commits a segment");
    assert_eq!(*behavior, BehaviorKind::Car);
}

// Simulates odometry by feeding the supervisor's own committed reference back
// in as truth, the way `main.rs`'s `odometry_loop` does for a well-tracking
// vehicle — without this, `mv`'s real_tol convergence check never sees the
// plan's progress since `ctx.state()` is only ever updated here.
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

// E4: heading error ~ π and distance > free_radius trigger a rotation-in-place
// pre-move before chaining begins; with an open grid the rotation is feasible
// and the drive converges to the goal.
#[tokio::test]
async fn e4_point_and_shoot_rotates_then_drives() {
    let sup = test_supervisor();
    let start = State::new(0.0, 0.0, std::f64::consts::PI, 0.0, 0.0, 0.0);
    sup.context().set_state(start).await;
    let goal = State::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    let (tx, _rx) = feedback_channel();

    let odom_preempt = CancellationToken::new();
    let odom = tokio::spawn(odometry_loop(Arc::clone(sup.context()), odom_preempt.clone()));

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        sup.mv(goal, "drive", None, CancellationToken::new(), tx),
    )
    .await
    .expect("point-and-shoot drive must not hang");

    odom_preempt.cancel();
    let _ = odom.await;

    assert_eq!(outcome, MoveOutcome::Succeeded);
}

// E5: an obstacle painted on the committed x_seq triggers reevaluate_plan to
// record time_till_issue and kill in-flight updates.
#[tokio::test]
async fn e5_obstacle_appears_sets_time_till_issue() {
    let sup = test_supervisor();
    let start = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    sup.context().set_state(start).await;
    sup.context().set_goal(State::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0)).await;

    // A committed segment driving straight along +x at 1 unit/s, dt=0.1s, 60 steps.
    let x_seq: Vec<State> = (0..60).map(|i| State::new(i as f64 * 0.1, 0.0, 0.0, 1.0, 0.0, 0.0)).collect();
    let u_seq = vec![crate::common::state::Effort::ZERO; 59];
    let seg = crate::planning::segment::PlanSegment {
        x_seq,
        u_seq,
        dt: 0.1,
        t_update: chrono::Utc::now(),
        horizon: 5.9,
        tree_size: 10,
        reached_goal: false,
        behavior_name: "car",
    };
    sup.context().commit(seg, BehaviorKind::Car).await;

    // Obstacle painted at the world point the vehicle occupies at sample index 30 (x=3.0).
    let mut data = vec![0u8; 20 * 5];
    data[2 * 20 + 3] = 255; // row=2 (y in [2,3)), col=3 (x in [3,4))
    let grid = OccupancyGrid::new(20, 5, Vec2D::new(0.0, -2.5), 1.0, data);
    sup.context().set_grid(grid).await;

    sup.reevaluate_plan().await;
    let tau = sup.context().time_till_issue().await;
    assert!(tau.is_some(), "expected an infeasibility to be detected");
}

// E6: while escaping, a now-clear straight line to goal resumes `drive` and
// clears the pending issue. The committed escape segment reflects the normal
// post-chain state: `time_till_issue` already reset to `None` by the chain
// iteration that committed it (spec.md §4.1 step 7) — a *prior* issue is not
// "still pending" once a fresh segment addressing it has been committed.
#[tokio::test]
async fn e6_escape_recovers_to_drive_on_clear_path() {
    let sup = test_supervisor();
    let start = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    sup.context().set_state(start).await;
    sup.context().set_goal(State::new(5.0, 0.0, 0.0, 0.0, 0.0, 0.0)).await;
    sup.context().set_move_type(MoveType::Skid).await; // escaping regime

    let seg = crate::planning::segment::PlanSegment::constant(start, chrono::Utc::now(), "escape");
    sup.context().commit(seg, BehaviorKind::Escape).await;

    let grid = OccupancyGrid::new(30, 30, Vec2D::new(-15.0, -15.0), 1.0, vec![0; 900]);
    sup.context().set_grid(grid).await;

    sup.reevaluate_plan().await;
    assert_eq!(sup.context().time_till_issue().await, None);
    assert_eq!(sup.context().move_type().await, MoveType::Drive);
}

// Preemption kills in-flight planners, waits for `busy` release, and resets.
#[tokio::test]
async fn preempt_before_loop_reports_preempted() {
    let sup = Arc::new(test_supervisor());
    let start = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    sup.context().set_state(start).await;
    let token = CancellationToken::new();
    token.cancel();
    let (tx, _rx) = feedback_channel();

    let outcome = sup.mv(State::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0), "drive", None, token, tx).await;
    assert_eq!(outcome, MoveOutcome::Preempted);
    assert!(sup.context().committed().await.is_none());
}

// Invariant 3 (spec.md §8): tree_chain is mutually exclusive with itself.
#[tokio::test]
async fn tree_chain_is_reentrant_safe() {
    let sup = Arc::new(test_supervisor());
    sup.context().set_state(State::ZERO).await;
    sup.context().set_goal(State::new(3.0, 0.0, 0.0, 0.0, 0.0, 0.0)).await;
    sup.context().set_move_type(MoveType::Drive).await;

    assert!(sup.context().try_acquire_busy());
    let outcome = sup.tree_chain().await;
    assert_eq!(outcome, ChainOutcome::AlreadyBusy);
    assert!(sup.context().committed().await.is_none());
    sup.context().release_busy();
}

// A larger grid with an obstacle the chosen exploration push has to route
// around: exercises the full shaper push loop and an RRT extension phase
// where many samples land infeasible, without starving the executor.
#[tokio::test]
async fn tree_chain_terminates_around_an_obstacle() {
    let sup = test_supervisor();
    sup.context().set_state(State::ZERO).await;
    sup.context().set_goal(State::new(35.0, 35.0, 0.0, 0.0, 0.0, 0.0)).await;
    sup.context().set_move_type(MoveType::Drive).await;
    let (width, height, res) = (80u32, 80u32, 0.5);
    let mut data = vec![0u8; (width * height) as usize];
    for row in 40..70 {
        for col in 30..50 {
            data[(row * width + col) as usize] = 255;
        }
    }
    let grid = OccupancyGrid::new(width, height, Vec2D::new(0.0, 0.0), res, data);
    sup.context().set_grid(grid).await;

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), sup.tree_chain()).await;
    assert_eq!(outcome.expect("tree_chain must not starve the executor"), ChainOutcome::Clean);
}
