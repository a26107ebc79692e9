//! Quad-tree (octree in 3D) over point entries.
//!
//! A leaf splits into `2^D` children once it holds more than `max_objects` points and
//! sits above `max_levels`. The child of a point is found by comparing it with the
//! cell center on every axis.

use super::{covering, hits, SpatialIndex};
use crate::error::{Error, Result};
use crate::geometry::{Bounds, Point, Shape};
use crate::topology::ElementId;
use log::debug;
use std::collections::HashMap;

pub const MAX_OBJECTS: usize = 1;
pub const MAX_LEVELS: usize = 12;

/// Summary of one leaf cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaf<P> {
    pub bounds: Bounds<P>,
    pub level: usize,
    pub len: usize,
}

#[derive(Debug, Clone)]
struct Cell<E, P> {
    bounds: Bounds<P>,
    level: usize,
    items: Vec<(E, P)>,
    children: Vec<Cell<E, P>>,
}

impl<E: ElementId, P: Point> Cell<E, P> {
    fn new(bounds: Bounds<P>, level: usize) -> Self {
        Self {
            bounds,
            level,
            items: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn child_index(&self, p: P) -> usize {
        let center = self.bounds.center();
        (0..P::DIMS)
            .filter(|&a| p.axis(a) >= center.axis(a))
            .map(|a| 1 << a)
            .sum()
    }

    fn child_bounds(&self, index: usize) -> Bounds<P> {
        let center = self.bounds.center();
        let (min, max) = (self.bounds.min, self.bounds.max);
        let upper = |a: usize| index & (1 << a) != 0;
        Bounds {
            min: P::from_fn(|a| if upper(a) { center.axis(a) } else { min.axis(a) }),
            max: P::from_fn(|a| if upper(a) { max.axis(a) } else { center.axis(a) }),
        }
    }

    fn insert(&mut self, element: E, p: P, limits: (usize, usize)) {
        if !self.is_leaf() {
            let i = self.child_index(p);
            self.children[i].insert(element, p, limits);
            return;
        }
        self.items.push((element, p));
        let (max_objects, max_levels) = limits;
        if self.items.len() > max_objects && self.level < max_levels {
            self.split(limits);
        }
    }

    fn split(&mut self, limits: (usize, usize)) {
        self.children = (0..1 << P::DIMS)
            .map(|i| Cell::new(self.child_bounds(i), self.level + 1))
            .collect();
        for (element, p) in std::mem::take(&mut self.items) {
            let i = self.child_index(p);
            self.children[i].insert(element, p, limits);
        }
    }

    fn count(&self) -> usize {
        if self.is_leaf() {
            self.items.len()
        } else {
            self.children.iter().map(Cell::count).sum()
        }
    }

    /// Returns false if `element` was not found at `p`.
    fn remove(&mut self, element: E, p: P, max_objects: usize) -> bool {
        if self.is_leaf() {
            let before = self.items.len();
            self.items.retain(|&(e, _)| e != element);
            return self.items.len() != before;
        }
        let i = self.child_index(p);
        if !self.children[i].remove(element, p, max_objects) {
            return false;
        }
        // Merge children back once they fit into a single leaf.
        if self.children.iter().all(Cell::is_leaf) && self.count() <= max_objects {
            for child in std::mem::take(&mut self.children) {
                self.items.extend(child.items);
            }
        }
        true
    }

    fn same_leaf(&self, a: P, b: P) -> bool {
        if self.is_leaf() {
            return true;
        }
        let i = self.child_index(a);
        i == self.child_index(b) && self.children[i].same_leaf(a, b)
    }

    fn relocate(&mut self, element: E, old: P, new: P) {
        if self.is_leaf() {
            if let Some(item) = self.items.iter_mut().find(|(e, _)| *e == element) {
                item.1 = new;
            }
            return;
        }
        let i = self.child_index(old);
        self.children[i].relocate(element, old, new);
    }

    fn query(&self, shape: &dyn Shape<P>, found: &mut Vec<E>) {
        if !shape.intersects(&self.bounds) {
            return;
        }
        if self.is_leaf() {
            found.extend(
                self.items
                    .iter()
                    .filter(|(_, p)| hits(shape, &Bounds::point(*p)))
                    .map(|&(e, _)| e),
            );
        } else {
            for child in &self.children {
                child.query(shape, found);
            }
        }
    }

    fn leaves(&self, out: &mut Vec<Leaf<P>>) {
        if self.is_leaf() {
            out.push(Leaf {
                bounds: self.bounds,
                level: self.level,
                len: self.items.len(),
            });
        } else {
            for child in &self.children {
                child.leaves(out);
            }
        }
    }
}

/// Adaptive subdivision of the region; entries are indexed by their center.
#[derive(Debug, Clone)]
pub struct QuadTree<E, P> {
    root: Cell<E, P>,
    points: HashMap<E, P>,
    max_objects: usize,
    max_levels: usize,
}

impl<E: ElementId, P: Point> QuadTree<E, P> {
    /// Tree that splits beyond one object per leaf and at most 12 levels deep.
    pub fn new(bounds: Bounds<P>) -> Self {
        Self {
            root: Cell::new(bounds, 0),
            points: HashMap::new(),
            max_objects: MAX_OBJECTS,
            max_levels: MAX_LEVELS,
        }
    }

    pub fn with_limits(bounds: Bounds<P>, max_objects: usize, max_levels: usize) -> Result<Self> {
        if max_objects == 0 {
            return Err(Error::invalid("max_objects", 0.0, "must be at least 1"));
        }
        Ok(Self {
            max_objects,
            max_levels,
            ..Self::new(bounds)
        })
    }

    fn limits(&self) -> (usize, usize) {
        (self.max_objects, self.max_levels)
    }

    /// Deepest level of any leaf; the root is level 0.
    pub fn depth(&self) -> usize {
        self.leaves().iter().map(|l| l.level).max().unwrap_or(0)
    }

    pub fn leaves(&self) -> Vec<Leaf<P>> {
        let mut out = Vec::new();
        self.root.leaves(&mut out);
        out
    }

    fn rebuild(&mut self, bounds: Bounds<P>) {
        let limits = self.limits();
        self.root = Cell::new(bounds, 0);
        for (&element, &p) in &self.points {
            self.root.insert(element, p, limits);
        }
    }
}

impl<E: ElementId, P: Point> SpatialIndex<E, P> for QuadTree<E, P> {
    fn bounds(&self) -> Bounds<P> {
        self.root.bounds
    }

    fn set_bounds(&mut self, bounds: Bounds<P>) {
        let bounds = self
            .points
            .values()
            .fold(bounds, |acc, &p| acc.include(p));
        self.rebuild(bounds);
    }

    fn recalculate(&mut self, entries: &[(E, Bounds<P>)]) {
        let bounds = covering(self.root.bounds, entries);
        self.points = entries.iter().map(|(e, b)| (*e, b.center())).collect();
        self.rebuild(bounds);
    }

    fn update(&mut self, element: E, shape: Bounds<P>) {
        let p = shape.center();
        if !self.root.bounds.contains(p) {
            debug!("Quad-tree grows to fit {element:?}, rebuilding");
            self.points.insert(element, p);
            let bounds = self.root.bounds.include(p);
            self.rebuild(bounds);
            return;
        }
        let limits = self.limits();
        match self.points.insert(element, p) {
            Some(old) if self.root.same_leaf(old, p) => self.root.relocate(element, old, p),
            Some(old) => {
                self.root.remove(element, old, self.max_objects);
                self.root.insert(element, p, limits);
            }
            None => self.root.insert(element, p, limits),
        }
    }

    fn remove(&mut self, element: E) -> bool {
        match self.points.remove(&element) {
            Some(p) => self.root.remove(element, p, self.max_objects),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn entry(&self, element: E) -> Option<Bounds<P>> {
        self.points.get(&element).map(|&p| Bounds::point(p))
    }

    fn entries(&self) -> Vec<(E, Bounds<P>)> {
        self.points.iter().map(|(&e, &p)| (e, Bounds::point(p))).collect()
    }

    fn visible_elements(&self, shape: &dyn Shape<P>) -> Vec<E> {
        let mut found = Vec::new();
        self.root.query(shape, &mut found);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn assert_leaf_invariant<E: ElementId, P: Point>(tree: &QuadTree<E, P>) {
        let leaves = tree.leaves();
        assert_eq!(leaves.iter().map(|l| l.len).sum::<usize>(), tree.len());
        for leaf in leaves {
            assert!(leaf.len <= tree.max_objects || leaf.level == tree.max_levels);
        }
        for (_, b) in tree.entries() {
            assert!(tree.bounds().contains(b.min));
        }
    }

    #[test]
    fn clustered_nodes_split_until_leaves_hold_one() {
        let mut tree = QuadTree::new(Bounds::centered(Vec2::splat(100.0)));
        let cluster = [
            Vec2::new(10.0, 10.0),
            Vec2::new(11.0, 10.5),
            Vec2::new(10.5, 12.0),
            Vec2::new(12.0, 11.0),
            Vec2::new(11.5, 11.5),
        ];
        for (i, &p) in cluster.iter().enumerate() {
            tree.update(i, Bounds::point(p));
        }
        assert!(tree.depth() > 1);
        assert!(tree.leaves().iter().all(|l| l.len <= 1));
        assert_leaf_invariant(&tree);
        for (i, &p) in cluster.iter().enumerate() {
            assert_eq!(tree.closest_element(p), Some(i));
        }
    }

    #[test]
    fn identical_points_stop_at_max_levels() {
        let mut tree = QuadTree::with_limits(Bounds::centered(Vec2::splat(8.0)), 1, 4).unwrap();
        for i in 0..3_u32 {
            tree.update(i, Bounds::point(Vec2::ONE));
        }
        assert_eq!(tree.depth(), 4);
        assert_leaf_invariant(&tree);
    }

    #[test]
    fn removal_merges_children() {
        let mut tree = QuadTree::new(Bounds::centered(Vec2::splat(100.0)));
        tree.update(1_u32, Bounds::point(Vec2::new(-10.0, -10.0)));
        tree.update(2, Bounds::point(Vec2::new(10.0, 10.0)));
        assert_eq!(tree.leaves().len(), 4);
        assert!(tree.remove(2));
        assert_eq!(tree.leaves().len(), 1);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn moving_within_a_leaf_keeps_structure() {
        let mut tree = QuadTree::new(Bounds::centered(Vec2::splat(100.0)));
        tree.update(1_u32, Bounds::point(Vec2::new(-30.0, -30.0)));
        tree.update(2, Bounds::point(Vec2::new(30.0, 30.0)));
        let before = tree.leaves();
        tree.update(2, Bounds::point(Vec2::new(31.0, 29.0)));
        let after = tree.leaves();
        assert_eq!(before.len(), after.len());
        assert_eq!(tree.visible_elements(&Bounds::point(Vec2::new(31.0, 29.0))), vec![2]);
    }

    #[test]
    fn octree_has_eight_children() {
        let mut tree = QuadTree::new(Bounds::centered(Vec3::splat(100.0)));
        tree.update(1_u32, Bounds::point(Vec3::splat(-10.0)));
        tree.update(2, Bounds::point(Vec3::splat(10.0)));
        assert_eq!(tree.leaves().len(), 8);
        assert_leaf_invariant(&tree);
    }
}
