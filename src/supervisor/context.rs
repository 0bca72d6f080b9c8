//! Shared supervisor state (spec.md §5 "Shared resources"), in the teacher's
//! `ModeContext` shape: one struct bundling the `Arc<RwLock<_>>`/`Arc<_>` fields
//! every collaborator needs, handed around as `Arc<SupervisorContext>`.

use crate::common::grid::OccupancyGrid;
use crate::common::state::State;
use crate::common::types::{Focus, MoveType};
use crate::config::Config;
use crate::planning::behavior::{BehaviorKind, BehaviorSet};
use crate::planning::segment::PlanSegment;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

pub struct SupervisorContext {
    pub config: Config,
    pub behaviors: BehaviorSet,

    state: RwLock<Option<State>>,
    grid: RwLock<Option<OccupancyGrid>>,
    goal: RwLock<State>,
    move_type: RwLock<MoveType>,
    focus: RwLock<Option<Focus>>,

    committed: RwLock<Option<(PlanSegment, BehaviorKind)>>,
    time_till_issue: RwLock<Option<f64>>,
    next_runtime: RwLock<Option<f64>>,

    /// Replaces the ad-hoc `busy` boolean with an atomic CAS on a two-state
    /// flag (spec.md §9 "Concurrency primitive").
    busy: AtomicBool,
    busy_done: Arc<Notify>,

    stuck: AtomicBool,
    stuck_count: AtomicUsize,
    tracking: AtomicBool,
}

impl SupervisorContext {
    pub fn new(config: Config, behaviors: BehaviorSet) -> Self {
        Self {
            config,
            behaviors,
            state: RwLock::new(None),
            grid: RwLock::new(None),
            goal: RwLock::new(State::ZERO),
            move_type: RwLock::new(MoveType::Hold),
            focus: RwLock::new(None),
            committed: RwLock::new(None),
            time_till_issue: RwLock::new(None),
            next_runtime: RwLock::new(None),
            busy: AtomicBool::new(false),
            busy_done: Arc::new(Notify::new()),
            stuck: AtomicBool::new(false),
            stuck_count: AtomicUsize::new(0),
            tracking: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> Option<State> { *self.state.read().await }
    pub async fn set_state(&self, s: State) { *self.state.write().await = Some(s); }

    pub async fn grid(&self) -> tokio::sync::RwLockReadGuard<'_, Option<OccupancyGrid>> { self.grid.read().await }
    pub async fn set_grid(&self, g: OccupancyGrid) { *self.grid.write().await = Some(g); }

    /// Non-blocking grid read for use from the reference planner's synchronous
    /// tree expansion. Prefers a stale-but-safe read over blocking the one
    /// cooperative-cancellation point an in-flight `update_plan` has.
    pub fn try_read_grid(&self) -> Option<tokio::sync::RwLockReadGuard<'_, Option<OccupancyGrid>>> {
        self.grid.try_read().ok()
    }

    pub async fn goal(&self) -> State { *self.goal.read().await }
    pub async fn set_goal(&self, g: State) { *self.goal.write().await = g; }

    pub async fn move_type(&self) -> MoveType { *self.move_type.read().await }
    pub async fn set_move_type(&self, m: MoveType) { *self.move_type.write().await = m; }

    pub async fn focus(&self) -> Option<Focus> { *self.focus.read().await }
    pub async fn set_focus(&self, f: Option<Focus>) { *self.focus.write().await = f; }

    pub async fn committed(&self) -> tokio::sync::RwLockReadGuard<'_, Option<(PlanSegment, BehaviorKind)>> {
        self.committed.read().await
    }

    pub async fn commit(&self, segment: PlanSegment, behavior: BehaviorKind) {
        *self.committed.write().await = Some((segment, behavior));
    }

    pub async fn clear_committed(&self) { *self.committed.write().await = None; }

    pub async fn time_till_issue(&self) -> Option<f64> { *self.time_till_issue.read().await }
    pub async fn set_time_till_issue(&self, t: Option<f64>) { *self.time_till_issue.write().await = t; }

    pub async fn next_runtime(&self) -> Option<f64> { *self.next_runtime.read().await }
    pub async fn set_next_runtime(&self, t: Option<f64>) { *self.next_runtime.write().await = t; }

    /// Try-acquire on the `busy` flag; `true` means the caller now owns it.
    pub fn try_acquire_busy(&self) -> bool {
        self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Releases `busy` and wakes anyone waiting in [`wait_for_busy_release`]
    /// (preemption's "wait until done" contract, spec.md §5).
    pub fn release_busy(&self) {
        self.busy.store(false, Ordering::Release);
        self.busy_done.notify_waiters();
    }

    pub fn is_busy(&self) -> bool { self.busy.load(Ordering::Acquire) }

    pub async fn wait_for_busy_release(&self) {
        while self.is_busy() {
            self.busy_done.notified().await;
        }
    }

    /// One-shot: `true` exactly once after the stuck latch fires, consumed by
    /// the next chain iteration (spec.md §9 Open Question 2 resolution).
    pub fn take_stuck(&self) -> bool { self.stuck.swap(false, Ordering::AcqRel) }

    pub fn is_stuck(&self) -> bool { self.stuck.load(Ordering::Acquire) }

    pub fn record_stuck_observation(&self, degenerate: bool) {
        if degenerate {
            let count = self.stuck_count.fetch_add(1, Ordering::AcqRel) + 1;
            if count >= self.config.params.stuck_threshold {
                self.stuck.store(true, Ordering::Release);
                self.stuck_count.store(0, Ordering::Release);
            }
        } else {
            self.stuck_count.store(0, Ordering::Release);
        }
    }

    pub fn set_tracking(&self, tracking: bool) { self.tracking.store(tracking, Ordering::Release); }
    pub fn tracking(&self) -> bool { self.tracking.load(Ordering::Acquire) }
}
