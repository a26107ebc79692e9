//! R-tree over element boxes.
//!
//! Nodes live in an arena and keep a link to their parent, so an element can be moved or
//! removed starting from its leaf without searching the tree.

mod split;

pub use split::{QuadraticSplitter, RStarSplitter, Splitter};

use super::{hits, SpatialIndex};
use crate::error::{Error, Result};
use crate::geometry::{Bounds, Point, Shape};
use crate::topology::ElementId;
use log::trace;
use std::collections::HashMap;

pub const MAX_CHILDREN: usize = 8;
pub const MIN_CHILDREN: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeIdx(usize);

#[derive(Debug, Clone)]
enum Children<E, P> {
    Leaf(Vec<(E, Bounds<P>)>),
    Branch(Vec<NodeIdx>),
}

impl<E, P> Children<E, P> {
    fn len(&self) -> usize {
        match self {
            Children::Leaf(entries) => entries.len(),
            Children::Branch(nodes) => nodes.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node<E, P> {
    bounds: Bounds<P>,
    parent: Option<NodeIdx>,
    children: Children<E, P>,
}

impl<E, P: Point> Node<E, P> {
    fn empty_leaf() -> Self {
        Self {
            bounds: Bounds::point(P::ZERO),
            parent: None,
            children: Children::Leaf(Vec::new()),
        }
    }
}

/// Bounding-box hierarchy with a pluggable split strategy.
///
/// Unlike the grid and the quad-tree it has no fixed region: [`SpatialIndex::bounds`] is
/// the box around the current entries.
#[derive(Debug, Clone)]
pub struct RTree<E, P, S = QuadraticSplitter> {
    nodes: Vec<Node<E, P>>,
    free: Vec<NodeIdx>,
    root: NodeIdx,
    leaf_of: HashMap<E, NodeIdx>,
    max_children: usize,
    min_children: usize,
    splitter: S,
}

impl<E: ElementId, P: Point> RTree<E, P> {
    /// Quadratic splits, 3 to 8 children per node.
    pub fn new() -> Self {
        Self::with_splitter(QuadraticSplitter)
    }
}

impl<E: ElementId, P: Point> Default for RTree<E, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ElementId, P: Point, S: Splitter> RTree<E, P, S> {
    pub fn with_splitter(splitter: S) -> Self {
        Self {
            nodes: vec![Node::empty_leaf()],
            free: Vec::new(),
            root: NodeIdx(0),
            leaf_of: HashMap::new(),
            max_children: MAX_CHILDREN,
            min_children: MIN_CHILDREN,
            splitter,
        }
    }

    /// A split of `max_children + 1` entries must leave `min_children` on both sides.
    pub fn with_limits(splitter: S, max_children: usize, min_children: usize) -> Result<Self> {
        if min_children == 0 {
            return Err(Error::invalid("min_children", 0.0, "must be at least 1"));
        }
        if max_children + 1 < 2 * min_children {
            return Err(Error::invalid(
                "max_children",
                max_children as f64,
                "must be at least 2 * min_children - 1",
            ));
        }
        Ok(Self {
            max_children,
            min_children,
            ..Self::with_splitter(splitter)
        })
    }

    /// Number of levels; a tree holding only a leaf root has height 1.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut idx = self.root;
        while let Children::Branch(children) = &self.node(idx).children {
            match children.first() {
                Some(&child) => idx = child,
                None => break,
            }
            height += 1;
        }
        height
    }

    fn node(&self, idx: NodeIdx) -> &Node<E, P> {
        &self.nodes[idx.0]
    }

    fn node_mut(&mut self, idx: NodeIdx) -> &mut Node<E, P> {
        &mut self.nodes[idx.0]
    }

    fn alloc(&mut self, node: Node<E, P>) -> NodeIdx {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx.0] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                NodeIdx(self.nodes.len() - 1)
            }
        }
    }

    fn clear(&mut self) {
        self.nodes = vec![Node::empty_leaf()];
        self.free.clear();
        self.root = NodeIdx(0);
        self.leaf_of.clear();
    }

    fn child_boxes(&self, idx: NodeIdx) -> Vec<Bounds<P>> {
        match &self.node(idx).children {
            Children::Leaf(entries) => entries.iter().map(|(_, b)| *b).collect(),
            Children::Branch(nodes) => nodes.iter().map(|&c| self.node(c).bounds).collect(),
        }
    }

    fn recompute(&mut self, idx: NodeIdx) {
        let boxes = self.child_boxes(idx);
        let bounds = match boxes.split_first() {
            Some((first, rest)) => rest.iter().fold(*first, |acc, b| acc.union(b)),
            None => Bounds::point(P::ZERO),
        };
        self.node_mut(idx).bounds = bounds;
    }

    /// Recompute the boxes from `idx` up to the root.
    fn refresh_upwards(&mut self, idx: NodeIdx) {
        let mut current = Some(idx);
        while let Some(idx) = current {
            self.recompute(idx);
            current = self.node(idx).parent;
        }
    }

    /// Leaf whose box grows least when `shape` is added, descending from the root.
    fn choose_leaf(&self, shape: &Bounds<P>) -> NodeIdx {
        let mut idx = self.root;
        while let Children::Branch(children) = &self.node(idx).children {
            let cost = |c: NodeIdx| {
                let b = self.node(c).bounds;
                let grown = b.union(shape);
                (
                    grown.extent() - b.extent(),
                    grown.margin() - b.margin(),
                    b.extent(),
                )
            };
            let best = children.iter().copied().min_by(|&a, &b| {
                let (ca, cb) = (cost(a), cost(b));
                ca.0.total_cmp(&cb.0)
                    .then(ca.1.total_cmp(&cb.1))
                    .then(ca.2.total_cmp(&cb.2))
            });
            match best {
                Some(child) => idx = child,
                None => break,
            }
        }
        idx
    }

    fn insert(&mut self, element: E, shape: Bounds<P>) {
        let leaf = self.choose_leaf(&shape);
        if let Children::Leaf(entries) = &mut self.node_mut(leaf).children {
            entries.push((element, shape));
        }
        self.leaf_of.insert(element, leaf);
        if self.node(leaf).children.len() > self.max_children {
            self.split_node(leaf);
        } else {
            self.refresh_upwards(leaf);
        }
    }

    /// Move part of an overflowing node into a new sibling, growing the tree at the root.
    fn split_node(&mut self, idx: NodeIdx) {
        let boxes = self.child_boxes(idx);
        let (_, moved) = self.splitter.split(&boxes, self.min_children);
        let mut take = vec![false; boxes.len()];
        for i in moved {
            take[i] = true;
        }

        let parent = self.node(idx).parent;
        let sibling_children = match &mut self.node_mut(idx).children {
            Children::Leaf(entries) => {
                let (stay, go) = partition(std::mem::take(entries), &take);
                *entries = stay;
                Children::Leaf(go)
            }
            Children::Branch(nodes) => {
                let (stay, go) = partition(std::mem::take(nodes), &take);
                *nodes = stay;
                Children::Branch(go)
            }
        };
        let sibling = self.alloc(Node {
            bounds: Bounds::point(P::ZERO),
            parent,
            children: sibling_children,
        });
        match &self.node(sibling).children {
            Children::Leaf(entries) => {
                let moved: Vec<E> = entries.iter().map(|(e, _)| *e).collect();
                for e in moved {
                    self.leaf_of.insert(e, sibling);
                }
            }
            Children::Branch(nodes) => {
                for c in nodes.clone() {
                    self.node_mut(c).parent = Some(sibling);
                }
            }
        }
        self.recompute(idx);
        self.recompute(sibling);

        match parent {
            None => {
                let root = self.alloc(Node {
                    bounds: self.node(idx).bounds.union(&self.node(sibling).bounds),
                    parent: None,
                    children: Children::Branch(vec![idx, sibling]),
                });
                self.node_mut(idx).parent = Some(root);
                self.node_mut(sibling).parent = Some(root);
                self.root = root;
                trace!("R-tree grew to height {}", self.height());
            }
            Some(parent) => {
                if let Children::Branch(nodes) = &mut self.node_mut(parent).children {
                    nodes.push(sibling);
                }
                if self.node(parent).children.len() > self.max_children {
                    self.split_node(parent);
                } else {
                    self.refresh_upwards(parent);
                }
            }
        }
    }

    /// Every entry below `idx`, releasing the nodes of the subtree.
    fn drain_subtree(&mut self, idx: NodeIdx, out: &mut Vec<(E, Bounds<P>)>) {
        let node = self.node_mut(idx);
        let children = std::mem::replace(&mut node.children, Children::Branch(Vec::new()));
        match children {
            Children::Leaf(entries) => out.extend(entries),
            Children::Branch(nodes) => {
                for c in nodes {
                    self.drain_subtree(c, out);
                }
            }
        }
        self.free.push(idx);
    }

    /// Dissolve underfull nodes on the path from `leaf` to the root and reinsert their
    /// entries.
    fn condense(&mut self, leaf: NodeIdx) {
        let mut orphans = Vec::new();
        let mut idx = leaf;
        while let Some(parent) = self.node(idx).parent {
            if self.node(idx).children.len() < self.min_children {
                if let Children::Branch(nodes) = &mut self.node_mut(parent).children {
                    nodes.retain(|&c| c != idx);
                }
                self.drain_subtree(idx, &mut orphans);
            } else {
                self.recompute(idx);
            }
            idx = parent;
        }
        self.recompute(self.root);

        loop {
            let root = self.root;
            match &self.node(root).children {
                Children::Branch(nodes) if nodes.len() == 1 => {
                    let child = nodes[0];
                    self.node_mut(child).parent = None;
                    self.free.push(root);
                    self.root = child;
                }
                Children::Branch(nodes) if nodes.is_empty() => {
                    *self.node_mut(root) = Node::empty_leaf();
                    break;
                }
                _ => break,
            }
        }

        for (element, shape) in orphans {
            self.leaf_of.remove(&element);
            self.insert(element, shape);
        }
    }
}

fn partition<T>(items: Vec<T>, take: &[bool]) -> (Vec<T>, Vec<T>) {
    let mut stay = Vec::new();
    let mut go = Vec::new();
    for (item, &moved) in items.into_iter().zip(take) {
        if moved {
            go.push(item);
        } else {
            stay.push(item);
        }
    }
    (stay, go)
}

impl<E: ElementId, P: Point, S: Splitter> SpatialIndex<E, P> for RTree<E, P, S> {
    fn bounds(&self) -> Bounds<P> {
        self.node(self.root).bounds
    }

    /// The tree has no fixed region, so this only re-packs the entries.
    fn set_bounds(&mut self, _bounds: Bounds<P>) {
        let entries = self.entries();
        self.recalculate(&entries);
    }

    fn recalculate(&mut self, entries: &[(E, Bounds<P>)]) {
        self.clear();
        for &(element, shape) in entries {
            self.update(element, shape);
        }
    }

    fn update(&mut self, element: E, shape: Bounds<P>) {
        if let Some(&leaf) = self.leaf_of.get(&element) {
            if self.node(leaf).bounds.contains_bounds(&shape) {
                if let Children::Leaf(entries) = &mut self.node_mut(leaf).children {
                    if let Some(entry) = entries.iter_mut().find(|(e, _)| *e == element) {
                        entry.1 = shape;
                    }
                }
                self.refresh_upwards(leaf);
                return;
            }
            self.remove(element);
        }
        self.insert(element, shape);
    }

    fn remove(&mut self, element: E) -> bool {
        let Some(leaf) = self.leaf_of.remove(&element) else {
            return false;
        };
        if let Children::Leaf(entries) = &mut self.node_mut(leaf).children {
            entries.retain(|(e, _)| *e != element);
        }
        self.condense(leaf);
        true
    }

    fn len(&self) -> usize {
        self.leaf_of.len()
    }

    fn entry(&self, element: E) -> Option<Bounds<P>> {
        let leaf = self.leaf_of.get(&element)?;
        match &self.node(*leaf).children {
            Children::Leaf(entries) => entries.iter().find(|(e, _)| *e == element).map(|(_, b)| *b),
            Children::Branch(_) => None,
        }
    }

    fn entries(&self) -> Vec<(E, Bounds<P>)> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            match &self.node(idx).children {
                Children::Leaf(entries) => out.extend(entries.iter().copied()),
                Children::Branch(nodes) => stack.extend(nodes),
            }
        }
        out
    }

    fn visible_elements(&self, shape: &dyn Shape<P>) -> Vec<E> {
        let mut found = Vec::new();
        if self.is_empty() {
            return found;
        }
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = self.node(idx);
            if !shape.intersects(&node.bounds) {
                continue;
            }
            match &node.children {
                Children::Leaf(entries) => found.extend(
                    entries
                        .iter()
                        .filter(|(_, b)| hits(shape, b))
                        .map(|(e, _)| *e),
                ),
                Children::Branch(nodes) => stack.extend(nodes),
            }
        }
        found
    }
}
