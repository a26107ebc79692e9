//! Read-only view of the graph being laid out.
//!
//! Layouts and pickers never walk a [`Topology`] directly while they compute. They take
//! a [`Snapshot`] first and compare versions before trusting their results, so a graph
//! that is edited from another thread only ever costs a retry.

mod distance;
mod graphs;
mod shared;

pub use distance::{DistanceMatrix, ShortestPaths, Unweighted};
pub use shared::SharedGraph;

use log::debug;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Requirements for node and edge handles.
pub trait ElementId: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Hash + Debug + Send + Sync + 'static> ElementId for T {}

/// Graph structure consumed by layouts and pickers.
///
/// Directed graphs are treated as undirected: `neighbors` and `degree` count both
/// directions.
pub trait Topology {
    type Node: ElementId;
    type Edge: ElementId;

    fn nodes(&self) -> Vec<Self::Node>;

    fn edges(&self) -> Vec<Self::Edge>;

    fn neighbors(&self, node: Self::Node) -> Vec<Self::Node>;

    fn degree(&self, node: Self::Node) -> usize;

    /// The two incident nodes of `edge`, `None` if the edge does not exist (anymore).
    fn endpoints(&self, edge: Self::Edge) -> Option<(Self::Node, Self::Node)>;

    fn contains_node(&self, node: Self::Node) -> bool;

    fn node_count(&self) -> usize {
        self.nodes().len()
    }

    /// Structural version. Must change whenever nodes or edges are added or removed.
    ///
    /// Immutable graphs keep the default.
    fn version(&self) -> u64 {
        0
    }
}

impl<T: Topology + ?Sized> Topology for Arc<T> {
    type Node = T::Node;
    type Edge = T::Edge;

    fn nodes(&self) -> Vec<Self::Node> {
        (**self).nodes()
    }

    fn edges(&self) -> Vec<Self::Edge> {
        (**self).edges()
    }

    fn neighbors(&self, node: Self::Node) -> Vec<Self::Node> {
        (**self).neighbors(node)
    }

    fn degree(&self, node: Self::Node) -> usize {
        (**self).degree(node)
    }

    fn endpoints(&self, edge: Self::Edge) -> Option<(Self::Node, Self::Node)> {
        (**self).endpoints(edge)
    }

    fn contains_node(&self, node: Self::Node) -> bool {
        (**self).contains_node(node)
    }

    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn version(&self) -> u64 {
        (**self).version()
    }
}

/// Consistent, index-based copy of a topology.
///
/// Nodes are addressed by their position in [`Snapshot::nodes`].
#[derive(Debug, Clone)]
pub struct Snapshot<N, E> {
    nodes: Vec<N>,
    index: HashMap<N, usize>,
    edges: Vec<(E, usize, usize)>,
    adjacency: Vec<Vec<usize>>,
    degrees: Vec<usize>,
    version: u64,
}

impl<N: ElementId, E: ElementId> Snapshot<N, E> {
    /// Copy the topology, retrying until no structural change happened during the copy.
    pub fn take<T>(topology: &T) -> Self
    where
        T: Topology<Node = N, Edge = E> + ?Sized,
    {
        let mut attempt = 1;
        loop {
            if let Some(snapshot) = Self::collect(topology) {
                return snapshot;
            }
            debug!("Topology changed while taking a snapshot (attempt {attempt}), retrying");
            attempt += 1;
            std::thread::yield_now();
        }
    }

    fn collect<T>(topology: &T) -> Option<Self>
    where
        T: Topology<Node = N, Edge = E> + ?Sized,
    {
        let version = topology.version();
        let nodes = topology.nodes();
        let index: HashMap<N, usize> = nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut edges = Vec::new();
        for edge in topology.edges() {
            let (u, v) = topology.endpoints(edge)?;
            edges.push((edge, *index.get(&u)?, *index.get(&v)?));
        }

        let mut adjacency = Vec::with_capacity(nodes.len());
        let mut degrees = Vec::with_capacity(nodes.len());
        for (i, &node) in nodes.iter().enumerate() {
            let mut adjacent = Vec::new();
            for neighbor in topology.neighbors(node) {
                let j = *index.get(&neighbor)?;
                if j != i && !adjacent.contains(&j) {
                    adjacent.push(j);
                }
            }
            adjacency.push(adjacent);
            degrees.push(topology.degree(node));
        }

        if topology.version() != version {
            return None;
        }
        Some(Self {
            nodes,
            index,
            edges,
            adjacency,
            degrees,
            version,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> N {
        self.nodes[index]
    }

    pub fn index_of(&self, node: &N) -> Option<usize> {
        self.index.get(node).copied()
    }

    /// Edges with the snapshot indices of their endpoints.
    pub fn edges(&self) -> &[(E, usize, usize)] {
        &self.edges
    }

    /// Distinct neighbors of a node, without the node itself.
    pub fn neighbors(&self, index: usize) -> &[usize] {
        &self.adjacency[index]
    }

    pub fn degree(&self, index: usize) -> usize {
        self.degrees[index]
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the topology still has the structure this snapshot was taken from.
    pub fn is_current<T>(&self, topology: &T) -> bool
    where
        T: Topology<Node = N, Edge = E> + ?Sized,
    {
        topology.version() == self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::UnGraph;

    #[test]
    fn snapshot_indexes_nodes_and_edges() {
        let mut g = UnGraph::<(), ()>::new_undirected();
        let a = g.add_node(());
        let b = g.add_node(());
        let c = g.add_node(());
        g.add_edge(a, b, ());
        g.add_edge(b, c, ());
        g.add_edge(c, c, ());

        let s = Snapshot::take(&g);
        assert_eq!(s.len(), 3);
        assert_eq!(s.edges().len(), 3);
        let ib = s.index_of(&b).unwrap();
        assert_eq!(s.neighbors(ib).len(), 2);
        let ic = s.index_of(&c).unwrap();
        // Self-loops never show up as neighbors.
        assert_eq!(s.neighbors(ic), &[ib]);
    }

    #[test]
    fn snapshot_of_shared_graph_tracks_version() {
        let shared = SharedGraph::new(UnGraph::<(), ()>::new_undirected());
        let s = Snapshot::take(&shared);
        assert!(s.is_current(&shared));
        shared.mutate(|g| {
            g.add_node(());
        });
        assert!(!s.is_current(&shared));
        assert_eq!(Snapshot::take(&shared).len(), 1);
    }
}
