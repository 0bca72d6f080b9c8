//! A small generic 2D vector, adapted from the teacher's `flight_control::common::vec2d`.
//!
//! The teacher's version wraps coordinates around a fixed-size toroidal map (a
//! satellite orbiting a planet raster). This vehicle operates in an open plane, so
//! the wrap-around machinery is dropped; everything else — construction, norms,
//! rotation, perpendiculars, `Display` — carries over.

use num::traits::{Float, NumAssignOps, NumOps, Signed, Zero};
use std::fmt::Display;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq, Default)]
pub struct Vec2D<T> {
    x: T,
    y: T,
}

impl<T: Copy> Vec2D<T> {
    pub const fn new(x: T, y: T) -> Self { Self { x, y } }
    pub fn x(&self) -> T { self.x }
    pub fn y(&self) -> T { self.y }
}

impl<T: Display> Display for Vec2D<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

impl<T: Add<Output = T>> Add for Vec2D<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self { Self { x: self.x + rhs.x, y: self.y + rhs.y } }
}

impl<T: Sub<Output = T>> Sub for Vec2D<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self { Self { x: self.x - rhs.x, y: self.y - rhs.y } }
}

impl<T: Mul<Output = T> + Copy> Mul<T> for Vec2D<T> {
    type Output = Self;
    fn mul(self, rhs: T) -> Self { Self { x: self.x * rhs, y: self.y * rhs } }
}

impl<T: Div<Output = T> + Copy> Div<T> for Vec2D<T> {
    type Output = Self;
    fn div(self, rhs: T) -> Self { Self { x: self.x / rhs, y: self.y / rhs } }
}

impl<T: Neg<Output = T>> Neg for Vec2D<T> {
    type Output = Self;
    fn neg(self) -> Self { Self { x: -self.x, y: -self.y } }
}

impl<T> Vec2D<T>
where T: NumOps + NumAssignOps + Copy + Zero
{
    pub fn dot(&self, other: &Self) -> T { self.x * other.x + self.y * other.y }

    /// 2D "cross product" — the z-component of the 3D cross of the lifted vectors.
    pub fn cross(&self, other: &Self) -> T { self.x * other.y - self.y * other.x }

    pub fn abs_sq(&self) -> T { self.dot(self) }

    pub fn zero() -> Self { Self { x: T::zero(), y: T::zero() } }
}

impl<T> Vec2D<T>
where T: Float + NumAssignOps
{
    pub fn abs(&self) -> T { self.abs_sq().sqrt() }

    pub fn normalize(self) -> Self {
        let mag = self.abs();
        if mag.is_zero() { self } else { Self::new(self.x / mag, self.y / mag) }
    }

    /// Vector pointing from `self` to `other`.
    pub fn to(&self, other: &Self) -> Self { Self::new(other.x - self.x, other.y - self.y) }

    pub fn euclid_distance(&self, other: &Self) -> T { self.to(other).abs() }

    /// Rotates the vector by `angle_rad` radians (counterclockwise, right-handed).
    pub fn rotated(&self, angle_rad: T) -> Self {
        let (s, c) = angle_rad.sin_cos();
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    /// Unit vector perpendicular to `self`; `clockwise` selects which of the two.
    pub fn perp_unit(&self, clockwise: bool) -> Self {
        let perp = if clockwise { Self::new(self.y, -self.x) } else { Self::new(-self.y, self.x) };
        perp.normalize()
    }
}

impl<T> Vec2D<T>
where T: Signed + PartialOrd + Copy
{
    pub fn min_components(&self, other: &Self) -> Self {
        Self::new(
            if self.x < other.x { self.x } else { other.x },
            if self.y < other.y { self.y } else { other.y },
        )
    }

    pub fn max_components(&self, other: &Self) -> Self {
        Self::new(
            if self.x > other.x { self.x } else { other.x },
            if self.y > other.y { self.y } else { other.y },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_preserves_magnitude() {
        let v = Vec2D::new(3.0_f64, 4.0);
        let r = v.rotated(std::f64::consts::FRAC_PI_3);
        assert!((v.abs() - r.abs()).abs() < 1e-9);
    }

    #[test]
    fn perp_unit_is_orthogonal() {
        let v = Vec2D::new(1.0_f64, 0.0);
        let p = v.perp_unit(false);
        assert!(v.dot(&p).abs() < 1e-12);
        assert!((p.abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn to_and_distance() {
        let a = Vec2D::new(0.0_f64, 0.0);
        let b = Vec2D::new(3.0, 4.0);
        assert!((a.euclid_distance(&b) - 5.0).abs() < 1e-12);
    }
}
