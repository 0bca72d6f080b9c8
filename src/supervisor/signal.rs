//! Exit/rejection signals for the supervisor's `Move` entry point and chaining
//! loop, in the teacher's tagged-enum style (`mode_control::signal`) rather
//! than a `thiserror` hierarchy.

use std::fmt::{self, Display};

/// Why a `Move` request was rejected before any state was mutated (spec.md
/// §4.1 public contract, §7 "Preconditions unmet").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    /// No vehicle state has ever been received.
    Odom,
    /// `move_type` did not parse to a known variant.
    MoveType,
    /// `circle` was requested; it is declared but unimplemented (spec.md §9 Open Question 3).
    Patience,
}

impl Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            MoveRejection::Odom => "odom",
            MoveRejection::MoveType => "move_type",
            MoveRejection::Patience => "patience",
        };
        write!(f, "{code}")
    }
}

impl std::error::Error for MoveRejection {}

/// Outcome of a `Move` request once chaining begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Succeeded,
    Preempted,
    Aborted(MoveRejection),
}

/// Result of a single `tree_chain` iteration (spec.md §4.1 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// `busy` was already held; this call was a re-entrant no-op.
    AlreadyBusy,
    /// The planner update completed and a new segment was committed.
    Clean,
    /// The planner update was killed mid-flight; prior segment untouched.
    Killed,
}

/// Periodic feedback emitted while a move is in flight (spec.md §6 "Action interface").
#[derive(Debug, Clone, PartialEq)]
pub struct MoveFeedback {
    pub behavior_name: &'static str,
    pub tree_size: usize,
    pub reached_goal: bool,
    pub tracking: bool,
    pub time_until_next_chain: f64,
}
