//! Behavior polymorphism (spec.md §3, §9): `{car, boat, escape}` as a tagged
//! variant carrying a planner handle, matching the teacher's preference for
//! enum tags plus trait objects over class hierarchies (`flight_state::FlightState`
//! does the same for orbit/transition/safe-mode dispatch).

use crate::planning::planner::PlannerHandle;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum BehaviorKind {
    Car,
    Boat,
    Escape,
}

impl BehaviorKind {
    pub fn name(self) -> &'static str {
        match self {
            BehaviorKind::Car => "car",
            BehaviorKind::Boat => "boat",
            BehaviorKind::Escape => "escape",
        }
    }
}

/// One of `{car, boat, escape}` bundled with its planner handle.
///
/// `gen_ss`/`dynamics`/`lqr` live behind [`PlannerHandle`] rather than as
/// separate fields here — spec.md §6 lists them as things the external planner
/// exposes per behavior, and the reference planner (`reference_planner.rs`)
/// is itself parameterized per-kind internally.
#[derive(Clone)]
pub struct Behavior {
    pub kind: BehaviorKind,
    pub planner: Arc<dyn PlannerHandle>,
}

impl Behavior {
    pub fn new(kind: BehaviorKind, planner: Arc<dyn PlannerHandle>) -> Self { Self { kind, planner } }

    pub fn is(&self, kind: BehaviorKind) -> bool { self.kind == kind }
}

/// A set of one `Behavior` per tag, so the supervisor can switch between them
/// without re-instantiating planners mid-chain (each carries its own tree/state).
pub struct BehaviorSet {
    pub car: Behavior,
    pub boat: Behavior,
    pub escape: Behavior,
}

impl BehaviorSet {
    pub fn get(&self, kind: BehaviorKind) -> &Behavior {
        match kind {
            BehaviorKind::Car => &self.car,
            BehaviorKind::Boat => &self.boat,
            BehaviorKind::Escape => &self.escape,
        }
    }
}
