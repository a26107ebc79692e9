//! Spatial indexes answering "what is near this point" and "what is inside this shape"
//! for nodes and edges, without scanning the whole graph.
//!
//! Entries are axis-aligned [`Bounds`]: a point for a node, the box around the segment
//! for an edge. Indexes are filled with [`SpatialIndex::recalculate`] and kept current
//! with [`SpatialIndex::update`] as positions change. [`NodePicker`] and [`EdgePicker`]
//! bind an index to a topology and a position store.

mod grid;
mod picker;
mod quadtree;
mod rtree;

pub use grid::Grid;
pub use picker::{EdgePicker, NodePicker};
pub use quadtree::{Leaf, QuadTree};
pub use rtree::{QuadraticSplitter, RStarSplitter, RTree, Splitter};

use crate::geometry::{Ball, Bounds, Point, Shape};
use crate::topology::ElementId;

/// Common interface of [`Grid`], [`QuadTree`] and [`RTree`].
pub trait SpatialIndex<E: ElementId, P: Point>: Send + Sync {
    /// Region covered by the index. Grows when entries are added outside of it.
    fn bounds(&self) -> Bounds<P>;

    /// Change the covered region and re-index every entry.
    fn set_bounds(&mut self, bounds: Bounds<P>);

    /// Replace the whole content.
    fn recalculate(&mut self, entries: &[(E, Bounds<P>)]);

    /// Insert `element` or move it to `shape`.
    fn update(&mut self, element: E, shape: Bounds<P>);

    /// Returns false if the element was not indexed.
    fn remove(&mut self, element: E) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The indexed shape of `element`.
    fn entry(&self, element: E) -> Option<Bounds<P>>;

    fn entries(&self) -> Vec<(E, Bounds<P>)>;

    /// Elements inside `shape`: point entries it contains and box entries it touches.
    fn visible_elements(&self, shape: &dyn Shape<P>) -> Vec<E>;

    /// The element closest to `point`.
    ///
    /// Searches a ball around the point that doubles in radius until it finds a
    /// candidate, and falls back to a full scan once the ball covers the whole index.
    fn closest_element(&self, point: P) -> Option<E> {
        if self.is_empty() {
            return None;
        }
        let bounds = self.bounds();
        let reach = P::from_fn(|a| {
            let v = point.axis(a);
            (v - bounds.min.axis(a)).abs().max((v - bounds.max.axis(a)).abs())
        })
        .length();
        let mut radius = (bounds.max_dimension() / 64.0).max(1e-3);
        loop {
            if radius >= reach {
                return nearest(point, self.entries());
            }
            let found = self
                .visible_elements(&Ball::new(point, radius))
                .into_iter()
                .filter_map(|e| self.entry(e).map(|b| (e, b)));
            if let Some(closest) = nearest(point, found) {
                return Some(closest);
            }
            radius *= 2.0;
        }
    }
}

/// Whether an entry counts as inside `shape`.
pub(crate) fn hits<P: Point>(shape: &dyn Shape<P>, entry: &Bounds<P>) -> bool {
    if entry.is_point() {
        shape.contains(entry.min)
    } else {
        shape.intersects(entry)
    }
}

/// Entry with the smallest distance to `point`.
pub(crate) fn nearest<E, P: Point>(
    point: P,
    entries: impl IntoIterator<Item = (E, Bounds<P>)>,
) -> Option<E> {
    entries
        .into_iter()
        .map(|(e, b)| (e, b.distance_squared_to(point)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

/// Bounds that contain `bounds` and every entry.
pub(crate) fn covering<E, P: Point>(bounds: Bounds<P>, entries: &[(E, Bounds<P>)]) -> Bounds<P> {
    entries.iter().fold(bounds, |acc, (_, b)| acc.union(b))
}
