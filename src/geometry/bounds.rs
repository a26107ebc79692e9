//! Axis-aligned regions: the layout universe and the boxes of the spatial indexes.

use super::Point;
use rand::Rng;

/// Axis-aligned bounding region, `min..=max` on every axis.
///
/// In 2D this is the layout rectangle, in 3D a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds<P> {
    pub min: P,
    pub max: P,
}

impl<P: Point> Bounds<P> {
    /// Create bounds from two opposite corners in any order.
    pub fn new(a: P, b: P) -> Self {
        Self {
            min: a.min_by_axis(b),
            max: a.max_by_axis(b),
        }
    }

    /// Region of the given size centered on the origin.
    pub fn centered(size: P) -> Self {
        let half = size * 0.5;
        Self::new(-half, half)
    }

    /// Region of the given size with its minimum corner on the origin.
    pub fn from_size(size: P) -> Self {
        Self::new(P::ZERO, size)
    }

    /// Zero-sized bounds around a single point.
    pub fn point(p: P) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest bounds containing every point, `None` for an empty input.
    pub fn enclosing(points: impl IntoIterator<Item = P>) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        Some(it.fold(Self::point(first), |b, p| b.include(p)))
    }

    pub fn center(&self) -> P {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> P {
        self.max - self.min
    }

    /// Area in 2D, volume in 3D.
    pub fn extent(&self) -> f32 {
        let size = self.size();
        (0..P::DIMS).map(|a| size.axis(a).max(0.0)).product()
    }

    /// Sum of the side lengths.
    pub fn margin(&self) -> f32 {
        let size = self.size();
        (0..P::DIMS).map(|a| size.axis(a).max(0.0)).sum()
    }

    /// Half of the smallest side.
    pub fn radius(&self) -> f32 {
        let size = self.size();
        (0..P::DIMS)
            .map(|a| size.axis(a))
            .fold(f32::INFINITY, f32::min)
            * 0.5
    }

    /// Length of the largest side.
    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        (0..P::DIMS).map(|a| size.axis(a)).fold(0.0, f32::max)
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, p: P) -> bool {
        (0..P::DIMS).all(|a| self.min.axis(a) <= p.axis(a) && p.axis(a) <= self.max.axis(a))
    }

    pub fn contains_bounds(&self, other: &Self) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    pub fn intersects(&self, other: &Self) -> bool {
        (0..P::DIMS)
            .all(|a| other.min.axis(a) <= self.max.axis(a) && other.max.axis(a) >= self.min.axis(a))
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min_by_axis(other.min),
            max: self.max.max_by_axis(other.max),
        }
    }

    /// Grow the bounds so they contain `p`.
    pub fn include(&self, p: P) -> Self {
        Self {
            min: self.min.min_by_axis(p),
            max: self.max.max_by_axis(p),
        }
    }

    /// Extent of the intersection, 0 when disjoint.
    pub fn overlap(&self, other: &Self) -> f32 {
        (0..P::DIMS)
            .map(|a| {
                let lo = self.min.axis(a).max(other.min.axis(a));
                let hi = self.max.axis(a).min(other.max.axis(a));
                (hi - lo).max(0.0)
            })
            .product()
    }

    /// Squared distance from `p` to the closest point of the bounds; 0 inside.
    pub fn distance_squared_to(&self, p: P) -> f32 {
        (0..P::DIMS)
            .map(|a| {
                let v = p.axis(a);
                let d = (self.min.axis(a) - v).max(v - self.max.axis(a)).max(0.0);
                d * d
            })
            .sum()
    }

    pub fn clamp(&self, p: P) -> P {
        P::from_fn(|a| p.axis(a).clamp(self.min.axis(a), self.max.axis(a)))
    }

    pub fn translate(&self, delta: P) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    /// Grow every side outwards by `amount`.
    pub fn expand(&self, amount: f32) -> Self {
        let d = P::splat(amount);
        Self {
            min: self.min - d,
            max: self.max + d,
        }
    }

    /// Uniformly distributed point inside the bounds.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> P {
        P::from_fn(|a| {
            let (lo, hi) = (self.min.axis(a), self.max.axis(a));
            if hi > lo {
                rng.gen_range(lo..=hi)
            } else {
                lo
            }
        })
    }
}
