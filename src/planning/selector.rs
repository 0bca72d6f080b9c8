//! The Behavior Selector (spec.md §4.2): a pure function of stuck state, move
//! type, and distance to the next seed.

use crate::common::types::MoveType;
use crate::planning::behavior::BehaviorKind;

/// Chooses the behavior for the next planning segment.
///
/// `skid`/`circle` carrying a non-drive move always resolve to `boat` or a
/// fatal configuration error, matching the original's `select_behavior`
/// exhaustive dispatch — there is no silent default case.
///
/// # Panics
/// Panics on a combination spec.md §4.2 calls "fatal configuration error"
/// (unreachable given a validated `MoveType`, since `circle` is rejected before
/// a behavior is ever selected).
pub fn select_behavior(stuck: bool, move_type: MoveType, distance: f64, free_radius: f64) -> BehaviorKind {
    if stuck {
        return BehaviorKind::Escape;
    }
    match move_type {
        MoveType::Drive => {
            if distance < free_radius { BehaviorKind::Boat } else { BehaviorKind::Car }
        }
        MoveType::Skid => BehaviorKind::Boat,
        MoveType::Hold | MoveType::Circle => {
            crate::fatal!("select_behavior called with non-chaining move type {move_type}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuck_always_escapes() {
        assert_eq!(select_behavior(true, MoveType::Drive, 0.1, 4.0), BehaviorKind::Escape);
    }

    #[test]
    fn drive_near_is_boat_far_is_car() {
        assert_eq!(select_behavior(false, MoveType::Drive, 1.0, 4.0), BehaviorKind::Boat);
        assert_eq!(select_behavior(false, MoveType::Drive, 10.0, 4.0), BehaviorKind::Car);
    }

    #[test]
    fn skid_is_always_boat() {
        assert_eq!(select_behavior(false, MoveType::Skid, 100.0, 4.0), BehaviorKind::Boat);
    }
}
