//! Query shapes for the spatial indexes.
//!
//! Each query allocates its own shape; nothing here is shared scratch state.

use super::{Bounds, Point};
use crate::error::{Error, Result};
use glam::Vec2;
use std::f32::consts::TAU;

/// A region that can be tested against points and boxes.
pub trait Shape<P: Point> {
    /// Bounding box used to prune index cells.
    fn bounds(&self) -> Bounds<P>;

    fn contains(&self, point: P) -> bool;

    /// Whether the shape touches the box. For zero-sized boxes this is `contains`.
    fn intersects(&self, other: &Bounds<P>) -> bool;
}

impl<P: Point> Shape<P> for Bounds<P> {
    fn bounds(&self) -> Bounds<P> {
        *self
    }

    fn contains(&self, point: P) -> bool {
        Bounds::contains(self, point)
    }

    fn intersects(&self, other: &Bounds<P>) -> bool {
        Bounds::intersects(self, other)
    }
}

/// Circle in 2D, sphere in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball<P> {
    pub center: P,
    pub radius: f32,
}

impl<P: Point> Ball<P> {
    pub fn new(center: P, radius: f32) -> Self {
        Self { center, radius }
    }
}

impl<P: Point> Shape<P> for Ball<P> {
    fn bounds(&self) -> Bounds<P> {
        Bounds::point(self.center).expand(self.radius)
    }

    fn contains(&self, point: P) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    fn intersects(&self, other: &Bounds<P>) -> bool {
        other.distance_squared_to(self.center) <= self.radius * self.radius
    }
}

/// Straight line between two points; the geometry of a drawn edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment<P> {
    pub from: P,
    pub to: P,
}

impl<P: Point> Segment<P> {
    pub fn new(from: P, to: P) -> Self {
        Self { from, to }
    }

    /// Squared distance from `p` to the closest point on the segment.
    pub fn distance_squared_to(&self, p: P) -> f32 {
        let dir = self.to - self.from;
        let len_sq = dir.length_squared();
        if len_sq == 0.0 {
            return self.from.distance_squared(p);
        }
        let t = ((p - self.from).dot(dir) / len_sq).clamp(0.0, 1.0);
        (self.from + dir * t).distance_squared(p)
    }
}

impl<P: Point> Shape<P> for Segment<P> {
    fn bounds(&self) -> Bounds<P> {
        Bounds::new(self.from, self.to)
    }

    fn contains(&self, point: P) -> bool {
        self.distance_squared_to(point) <= 1e-8
    }

    // Slab clipping of the parametric segment against the box.
    fn intersects(&self, other: &Bounds<P>) -> bool {
        let dir = self.to - self.from;
        let (mut t0, mut t1) = (0.0_f32, 1.0_f32);
        for a in 0..P::DIMS {
            let origin = self.from.axis(a);
            let d = dir.axis(a);
            let (lo, hi) = (other.min.axis(a), other.max.axis(a));
            if d.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return false;
                }
                continue;
            }
            let mut enter = (lo - origin) / d;
            let mut exit = (hi - origin) / d;
            if enter > exit {
                std::mem::swap(&mut enter, &mut exit);
            }
            t0 = t0.max(enter);
            t1 = t1.min(exit);
            if t0 > t1 {
                return false;
            }
        }
        true
    }
}

/// Closed 2D polygon, used for lasso style selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vec2>,
}

impl Polygon {
    /// Fails with [`Error::DegeneratePolygon`] for fewer than 3 vertices.
    pub fn new(vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(Error::DegeneratePolygon(vertices.len()));
        }
        Ok(Self { vertices })
    }

    /// Regular polygon with `sides` corners on a circle of `radius`.
    pub fn regular(center: Vec2, radius: f32, sides: usize) -> Result<Self> {
        if sides < 3 {
            return Err(Error::DegeneratePolygon(sides));
        }
        let vertices = (0..sides)
            .map(|i| {
                let angle = TAU * i as f32 / sides as f32;
                center + Vec2::new(angle.cos(), angle.sin()) * radius
            })
            .collect();
        Ok(Self { vertices })
    }

    /// Star with `points` tips on `outer` radius and notches on `inner` radius.
    pub fn star(center: Vec2, outer: f32, inner: f32, points: usize) -> Result<Self> {
        if points < 5 {
            return Err(Error::DegenerateStar(points));
        }
        let corners = points * 2;
        let vertices = (0..corners)
            .map(|i| {
                let angle = TAU * i as f32 / corners as f32;
                let r = if i % 2 == 0 { outer } else { inner };
                center + Vec2::new(angle.cos(), angle.sin()) * r
            })
            .collect();
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    fn edges(&self) -> impl Iterator<Item = Segment<Vec2>> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

impl Shape<Vec2> for Polygon {
    fn bounds(&self) -> Bounds<Vec2> {
        // `new` guarantees at least three vertices.
        Bounds::enclosing(self.vertices.iter().copied())
            .unwrap_or_else(|| Bounds::point(Vec2::ZERO))
    }

    // Even-odd ray casting.
    fn contains(&self, p: Vec2) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.vertices[i], self.vertices[j]);
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn intersects(&self, other: &Bounds<Vec2>) -> bool {
        if !Shape::bounds(self).intersects(other) {
            return false;
        }
        if other.is_point() {
            return self.contains(other.min);
        }
        let corners = [
            other.min,
            Vec2::new(other.max.x, other.min.y),
            other.max,
            Vec2::new(other.min.x, other.max.y),
        ];
        corners.iter().any(|&c| self.contains(c))
            || self.vertices.iter().any(|&v| other.contains(v))
            || self.edges().any(|e| e.intersects(other))
    }
}
