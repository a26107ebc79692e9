//! Node and edge lookup by position, for hit testing and viewport culling.

use super::{hits, QuadTree, RTree, SpatialIndex};
use crate::geometry::{Ball, Bounds, Point, Segment, Shape};
use crate::positions::Positions;
use crate::topology::{Snapshot, Topology};
use log::debug;

/// Index entries for a consistent snapshot, retrying while the topology keeps changing.
fn collect_entries<T, P, E>(
    topology: &T,
    positions: &Positions<T::Node, P>,
    kind: &str,
    mut build: impl FnMut(&Snapshot<T::Node, T::Edge>, &[P]) -> Vec<(E, Bounds<P>)>,
) -> (Vec<(E, Bounds<P>)>, u64)
where
    T: Topology,
    P: Point,
{
    let mut attempt = 1;
    loop {
        let snapshot = Snapshot::take(topology);
        let (points, _) = positions.fetch(snapshot.nodes());
        let entries = build(&snapshot, &points);
        if snapshot.is_current(topology) {
            return (entries, snapshot.version());
        }
        debug!("Topology changed while indexing {kind} (attempt {attempt}), retrying");
        attempt += 1;
    }
}

/// Spatial lookup of the nodes of a topology.
///
/// The index has to be told about moves: call [`NodePicker::update`] for nodes that
/// changed position and [`NodePicker::recalculate`] after structural changes. While
/// the picker is inactive or empty, queries scan every node instead.
pub struct NodePicker<T: Topology, P: Point, S = QuadTree<<T as Topology>::Node, P>> {
    topology: T,
    positions: Positions<T::Node, P>,
    index: S,
    region: Bounds<P>,
    active: bool,
    version: Option<u64>,
}

impl<T: Topology, P: Point> NodePicker<T, P> {
    /// Picker backed by a quad-tree over the region of `positions`.
    pub fn new(topology: T, positions: Positions<T::Node, P>) -> Self {
        let index = QuadTree::new(positions.bounds());
        Self::with_index(topology, positions, index)
    }
}

impl<T, P, S> NodePicker<T, P, S>
where
    T: Topology,
    P: Point,
    S: SpatialIndex<T::Node, P>,
{
    pub fn with_index(topology: T, positions: Positions<T::Node, P>, index: S) -> Self {
        Self {
            region: positions.bounds(),
            topology,
            positions,
            index,
            active: true,
            version: None,
        }
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    pub fn topology(&self) -> &T {
        &self.topology
    }

    /// Turn index lookups on or off. Inactive pickers answer by linear scan.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the topology changed structurally since the last recalculation.
    pub fn is_stale(&self) -> bool {
        self.version != Some(self.topology.version())
    }

    /// Rebuild the index from the current nodes and positions.
    pub fn recalculate(&mut self) {
        let region = self.positions.bounds();
        if region != self.region {
            self.index.recalculate(&[]);
            self.index.set_bounds(region);
            self.region = region;
        }
        let (entries, version) =
            collect_entries(&self.topology, &self.positions, "nodes", |snapshot, points| {
                snapshot
                    .nodes()
                    .iter()
                    .zip(points)
                    .map(|(&node, &p)| (node, Bounds::point(p)))
                    .collect()
            });
        self.index.recalculate(&entries);
        self.version = Some(version);
    }

    /// Re-index a single node at its current position, or drop it if it left the graph.
    pub fn update(&mut self, node: T::Node) {
        if self.topology.contains_node(node) {
            self.index.update(node, Bounds::point(self.positions.get(node)));
        } else {
            self.index.remove(node);
        }
    }

    fn use_index(&self) -> bool {
        self.active && !self.index.is_empty()
    }

    /// Nodes whose position lies inside `shape`.
    pub fn visible_nodes(&self, shape: &dyn Shape<P>) -> Vec<T::Node> {
        if self.use_index() {
            return self.index.visible_elements(shape);
        }
        self.topology
            .nodes()
            .into_iter()
            .filter(|&node| shape.contains(self.positions.get(node)))
            .collect()
    }

    /// The node closest to `point`, `None` for an empty graph.
    pub fn closest_node(&self, point: P) -> Option<T::Node> {
        if self.use_index() {
            return self.index.closest_element(point);
        }
        self.topology
            .nodes()
            .into_iter()
            .map(|node| (node, self.positions.get(node).distance_squared(point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(node, _)| node)
    }
}

/// Spatial lookup of the edges of a topology, drawn as straight segments.
///
/// Entries are the boxes around the segments, an R-tree by default.
pub struct EdgePicker<T: Topology, P: Point, S = RTree<<T as Topology>::Edge, P>> {
    topology: T,
    positions: Positions<T::Node, P>,
    index: S,
    active: bool,
    version: Option<u64>,
}

impl<T: Topology, P: Point> EdgePicker<T, P> {
    pub fn new(topology: T, positions: Positions<T::Node, P>) -> Self {
        Self::with_index(topology, positions, RTree::new())
    }
}

impl<T, P, S> EdgePicker<T, P, S>
where
    T: Topology,
    P: Point,
    S: SpatialIndex<T::Edge, P>,
{
    pub fn with_index(topology: T, positions: Positions<T::Node, P>, index: S) -> Self {
        Self {
            topology,
            positions,
            index,
            active: true,
            version: None,
        }
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_stale(&self) -> bool {
        self.version != Some(self.topology.version())
    }

    pub fn recalculate(&mut self) {
        let (entries, version) =
            collect_entries(&self.topology, &self.positions, "edges", |snapshot, points| {
                snapshot
                    .edges()
                    .iter()
                    .map(|&(edge, u, v)| (edge, Bounds::new(points[u], points[v])))
                    .collect()
            });
        self.index.recalculate(&entries);
        self.version = Some(version);
    }

    /// Re-index one edge from the current positions of its endpoints.
    pub fn update(&mut self, edge: T::Edge) {
        match self.segment(edge) {
            Some(segment) => self.index.update(edge, segment.bounds()),
            None => {
                self.index.remove(edge);
            }
        }
    }

    /// Current geometry of `edge`, `None` if it is not part of the graph.
    pub fn segment(&self, edge: T::Edge) -> Option<Segment<P>> {
        let (u, v) = self.topology.endpoints(edge)?;
        Some(Segment::new(self.positions.get(u), self.positions.get(v)))
    }

    fn use_index(&self) -> bool {
        self.active && !self.index.is_empty()
    }

    /// Edges whose box touches `shape`.
    pub fn visible_edges(&self, shape: &dyn Shape<P>) -> Vec<T::Edge> {
        if self.use_index() {
            return self.index.visible_elements(shape);
        }
        self.topology
            .edges()
            .into_iter()
            .filter(|&edge| {
                self.segment(edge)
                    .is_some_and(|segment| hits(shape, &segment.bounds()))
            })
            .collect()
    }

    /// The edge whose segment passes closest to `point`.
    ///
    /// The index yields the edge with the closest box; every edge whose box lies within
    /// that edge's exact distance is then measured exactly.
    pub fn closest_edge(&self, point: P) -> Option<T::Edge> {
        let exact = |edge: T::Edge| {
            self.segment(edge)
                .map(|segment| (edge, segment.distance_squared_to(point)))
        };
        let closest = |candidates: Vec<T::Edge>| {
            candidates
                .into_iter()
                .filter_map(exact)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(edge, _)| edge)
        };

        if !self.use_index() {
            return closest(self.topology.edges());
        }
        let Some((first, d2)) = self.index.closest_element(point).and_then(exact) else {
            return closest(self.topology.edges());
        };
        let mut candidates = self.index.visible_elements(&Ball::new(point, d2.sqrt()));
        candidates.push(first);
        closest(candidates)
    }
}
