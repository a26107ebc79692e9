//! [`Topology`] for petgraph's graph types.

use super::Topology;
use petgraph::graph::{EdgeIndex, Graph, IndexType, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::EdgeType;

impl<N, E, Ty, Ix> Topology for Graph<N, E, Ty, Ix>
where
    Ty: EdgeType,
    Ix: IndexType + Send + Sync,
{
    type Node = NodeIndex<Ix>;
    type Edge = EdgeIndex<Ix>;

    fn nodes(&self) -> Vec<Self::Node> {
        self.node_indices().collect()
    }

    fn edges(&self) -> Vec<Self::Edge> {
        self.edge_indices().collect()
    }

    fn neighbors(&self, node: Self::Node) -> Vec<Self::Node> {
        self.neighbors_undirected(node).collect()
    }

    fn degree(&self, node: Self::Node) -> usize {
        if self.is_directed() {
            self.edges_directed(node, Outgoing).count() + self.edges_directed(node, Incoming).count()
        } else {
            self.edges(node).count()
        }
    }

    fn endpoints(&self, edge: Self::Edge) -> Option<(Self::Node, Self::Node)> {
        self.edge_endpoints(edge)
    }

    fn contains_node(&self, node: Self::Node) -> bool {
        self.node_weight(node).is_some()
    }

    fn node_count(&self) -> usize {
        Graph::node_count(self)
    }
}

impl<N, E, Ty, Ix> Topology for StableGraph<N, E, Ty, Ix>
where
    Ty: EdgeType,
    Ix: IndexType + Send + Sync,
{
    type Node = NodeIndex<Ix>;
    type Edge = EdgeIndex<Ix>;

    fn nodes(&self) -> Vec<Self::Node> {
        self.node_indices().collect()
    }

    fn edges(&self) -> Vec<Self::Edge> {
        self.edge_indices().collect()
    }

    fn neighbors(&self, node: Self::Node) -> Vec<Self::Node> {
        if !self.contains_node(node) {
            return Vec::new();
        }
        self.neighbors_undirected(node).collect()
    }

    fn degree(&self, node: Self::Node) -> usize {
        if !self.contains_node(node) {
            return 0;
        }
        if self.is_directed() {
            self.edges_directed(node, Outgoing).count() + self.edges_directed(node, Incoming).count()
        } else {
            self.edges(node).count()
        }
    }

    fn endpoints(&self, edge: Self::Edge) -> Option<(Self::Node, Self::Node)> {
        self.edge_endpoints(edge)
    }

    fn contains_node(&self, node: Self::Node) -> bool {
        StableGraph::contains_node(self, node)
    }

    fn node_count(&self) -> usize {
        StableGraph::node_count(self)
    }
}
