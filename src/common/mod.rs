pub mod grid;
pub mod state;
pub mod types;
pub mod vec2d;
