//! A graph that can be edited while a layout is being animated.

use super::Topology;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, versioned handle to a graph.
///
/// Every [`SharedGraph::mutate`] bumps the version, which is what layouts and pickers
/// compare to notice that their snapshot went stale.
pub struct SharedGraph<G> {
    graph: Arc<RwLock<G>>,
    version: Arc<AtomicU64>,
}

impl<G> Clone for SharedGraph<G> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            version: Arc::clone(&self.version),
        }
    }
}

impl<G> SharedGraph<G> {
    pub fn new(graph: G) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `f` with shared access to the graph.
    pub fn read<R>(&self, f: impl FnOnce(&G) -> R) -> R {
        let guard = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` with exclusive access to the graph and bump the version.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut G) -> R) -> R {
        let mut guard = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut guard);
        self.version.fetch_add(1, Ordering::AcqRel);
        result
    }
}

impl<G: Topology> Topology for SharedGraph<G> {
    type Node = G::Node;
    type Edge = G::Edge;

    fn nodes(&self) -> Vec<Self::Node> {
        self.read(|g| g.nodes())
    }

    fn edges(&self) -> Vec<Self::Edge> {
        self.read(|g| g.edges())
    }

    fn neighbors(&self, node: Self::Node) -> Vec<Self::Node> {
        self.read(|g| g.neighbors(node))
    }

    fn degree(&self, node: Self::Node) -> usize {
        self.read(|g| g.degree(node))
    }

    fn endpoints(&self, edge: Self::Edge) -> Option<(Self::Node, Self::Node)> {
        self.read(|g| g.endpoints(edge))
    }

    fn contains_node(&self, node: Self::Node) -> bool {
        self.read(|g| g.contains_node(node))
    }

    fn node_count(&self) -> usize {
        self.read(|g| g.node_count())
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
