//! Shared small types threaded between the supervisor and its collaborators.

use std::fmt::Display;

use super::vec2d::Vec2D;

/// The move mode carried by an action request (spec.md §3, §4.1).
///
/// `Circle` is declared but intentionally unimplemented — spec.md Non-goals
/// rules it out explicitly, and `Supervisor::mv` fails it fast with
/// [`crate::supervisor::signal::MoveRejection::Patience`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum MoveType {
    Hold,
    Drive,
    Skid,
    Circle,
}

impl MoveType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hold" => Some(Self::Hold),
            "drive" => Some(Self::Drive),
            "skid" => Some(Self::Skid),
            "circle" => Some(Self::Circle),
            _ => None,
        }
    }
}

/// A `focus` point carried by `skid`/`circle` moves; `z` is a heading offset
/// applied to the goal so it looks from the goal toward the focus (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Focus {
    pub point: Vec2D<f64>,
    pub z: f64,
}

impl Display for Focus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {:.2}", self.point, self.z)
    }
}
