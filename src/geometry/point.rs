//! Coordinate abstraction shared by every layout and index.
//!
//! Layouts are written once against [`Point`] and run on either [`Vec2`] or [`Vec3`].

use glam::{Vec2, Vec3};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A position with two or three `f32` components.
pub trait Point:
    Copy
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f32, Output = Self>
    + Div<f32, Output = Self>
    + AddAssign
    + SubAssign
    + Neg<Output = Self>
{
    /// Number of components.
    const DIMS: usize;

    /// The origin.
    const ZERO: Self;

    /// Read a single component.
    fn axis(self, axis: usize) -> f32;

    /// Build a point from a per-axis generator.
    fn from_fn(f: impl FnMut(usize) -> f32) -> Self;

    fn dot(self, other: Self) -> f32;

    fn length_squared(self) -> f32 {
        self.dot(self)
    }

    fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Component-wise minimum.
    fn min_by_axis(self, other: Self) -> Self {
        Self::from_fn(|a| self.axis(a).min(other.axis(a)))
    }

    /// Component-wise maximum.
    fn max_by_axis(self, other: Self) -> Self {
        Self::from_fn(|a| self.axis(a).max(other.axis(a)))
    }

    fn splat(value: f32) -> Self {
        Self::from_fn(|_| value)
    }

    fn is_finite(self) -> bool {
        (0..Self::DIMS).all(|a| self.axis(a).is_finite())
    }

    /// Scale the vector down so its length does not exceed `max`.
    fn clamp_length(self, max: f32) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }
}

impl Point for Vec2 {
    const DIMS: usize = 2;
    const ZERO: Self = Vec2::ZERO;

    #[inline]
    fn axis(self, axis: usize) -> f32 {
        self[axis]
    }

    #[inline]
    fn from_fn(mut f: impl FnMut(usize) -> f32) -> Self {
        let x = f(0);
        let y = f(1);
        Vec2::new(x, y)
    }

    #[inline]
    fn dot(self, other: Self) -> f32 {
        Vec2::dot(self, other)
    }
}

impl Point for Vec3 {
    const DIMS: usize = 3;
    const ZERO: Self = Vec3::ZERO;

    #[inline]
    fn axis(self, axis: usize) -> f32 {
        self[axis]
    }

    #[inline]
    fn from_fn(mut f: impl FnMut(usize) -> f32) -> Self {
        let x = f(0);
        let y = f(1);
        let z = f(2);
        Vec3::new(x, y, z)
    }

    #[inline]
    fn dot(self, other: Self) -> f32 {
        Vec3::dot(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_arithmetic_matches_glam() {
        fn len<P: Point>(p: P) -> f32 {
            p.length()
        }
        assert_eq!(len(Vec2::new(3.0, 4.0)), 5.0);
        assert_eq!(len(Vec3::new(2.0, 3.0, 6.0)), 7.0);
    }

    #[test]
    fn clamp_length_keeps_direction() {
        // glam has an inherent `clamp_length(min, max)`, so go through the trait.
        let v = Point::clamp_length(Vec2::new(30.0, 40.0), 5.0);
        assert!((v.length() - 5.0).abs() < 1e-5);
        assert!((v.x - 3.0).abs() < 1e-5);
        assert_eq!(Point::clamp_length(Vec2::new(1.0, 1.0), 10.0), Vec2::new(1.0, 1.0));
        assert_eq!(Point::clamp_length(Vec3::ZERO, 1.0), Vec3::ZERO);
    }

    #[test]
    fn component_wise_helpers() {
        let a = Vec3::new(1.0, 5.0, -2.0);
        let b = Vec3::new(2.0, 0.0, -3.0);
        assert_eq!(a.min_by_axis(b), Vec3::new(1.0, 0.0, -3.0));
        assert_eq!(a.max_by_axis(b), Vec3::new(2.0, 5.0, -2.0));
        assert!(!Vec2::new(f32::NAN, 0.0).is_finite());
    }
}
