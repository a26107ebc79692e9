//! Iterative layout algorithms.
//!
//! Every layout reads a [`Topology`] and writes a [`Positions`] store. A call to
//! [`IterativeLayout::step`] advances the layout by one iteration:
//!
//! 1. take a [`Snapshot`] of the topology,
//! 2. fetch the current positions of all nodes,
//! 3. compute new positions on the copy,
//! 4. write them back, unless the topology changed in the meantime, in which case the
//!    whole iteration is thrown away and recomputed from a fresh snapshot.

mod fr;
mod isom;
mod kk;
mod spring;

pub use fr::{FrConfig, FrLayout, FrLayoutBuilder};
pub use isom::{IsomConfig, IsomLayout, IsomLayoutBuilder};
pub use kk::{KkConfig, KkLayout, KkLayoutBuilder};
pub use spring::{EdgeLength, SpringConfig, SpringLayout, SpringLayoutBuilder};

use crate::geometry::{Bounds, Point};
use crate::positions::Positions;
use crate::topology::{ElementId, Snapshot, Topology};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// How often a step is recomputed when the topology keeps changing underneath it.
const MAX_STEP_ATTEMPTS: usize = 4;

/// A layout that converges over repeated steps.
pub trait IterativeLayout: Send {
    type Node: ElementId;
    type Point: Point;

    /// The store this layout writes to.
    fn positions(&self) -> &Positions<Self::Node, Self::Point>;

    /// Nodes of the topology as of now.
    fn topology_nodes(&self) -> Vec<Self::Node>;

    /// (Re)compute everything derived from the topology and the bounds.
    fn initialize(&mut self);

    /// Drop all per-node working data and start over.
    fn reset(&mut self);

    /// Advance one iteration.
    fn step(&mut self);

    fn done(&self) -> bool;

    /// Number of steps since the last initialization.
    fn iteration(&self) -> usize;

    /// Current position of `node`.
    fn apply(&self, node: Self::Node) -> Self::Point {
        self.positions().get(node)
    }

    fn lock(&self, node: Self::Node, locked: bool) {
        self.positions().lock(node, locked);
    }

    /// Lock or unlock every node of the topology.
    fn lock_all(&self, locked: bool) {
        self.positions().lock_all(self.topology_nodes(), locked);
    }

    fn is_locked(&self, node: Self::Node) -> bool {
        self.positions().is_locked(node)
    }

    /// Move the layout into a new region and start over.
    fn set_bounds(&mut self, bounds: Bounds<Self::Point>) {
        self.positions().resize(bounds);
        self.initialize();
    }

    /// Step until done or until `max_steps` steps were taken. Returns the number of steps.
    fn relax(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && !self.done() {
            self.step();
            steps += 1;
        }
        steps
    }
}

/// Working copy for one iteration.
pub(crate) struct Frame<N, E, P> {
    pub snapshot: Snapshot<N, E>,
    pub positions: Vec<P>,
    pub locked: Vec<bool>,
}

impl<N: ElementId, E: ElementId, P: Point> Frame<N, E, P> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

/// The topology and store a layout operates on.
pub(crate) struct Context<T: Topology, P> {
    pub topology: T,
    pub positions: Positions<T::Node, P>,
}

impl<T: Topology, P: Point> Context<T, P> {
    pub fn new(topology: T, positions: Positions<T::Node, P>) -> Self {
        Self {
            topology,
            positions,
        }
    }

    pub fn snapshot(&self) -> Snapshot<T::Node, T::Edge> {
        Snapshot::take(&self.topology)
    }

    pub fn bounds(&self) -> Bounds<P> {
        self.positions.bounds()
    }

    /// Run `compute` on a fresh frame and commit the result.
    ///
    /// Returns false when the topology changed during every attempt and nothing was
    /// written.
    pub fn step_with(&self, mut compute: impl FnMut(&mut Frame<T::Node, T::Edge, P>)) -> bool {
        for attempt in 1..=MAX_STEP_ATTEMPTS {
            let snapshot = self.snapshot();
            let (positions, locked) = self.positions.fetch(snapshot.nodes());
            let mut frame = Frame {
                snapshot,
                positions,
                locked,
            };
            compute(&mut frame);
            if frame.snapshot.is_current(&self.topology) {
                self.positions
                    .commit(frame.snapshot.nodes(), &frame.positions);
                return true;
            }
            debug!("Topology changed during layout step (attempt {attempt}), discarding");
        }
        warn!("Skipping layout step, topology changed on every one of {MAX_STEP_ATTEMPTS} attempts");
        false
    }
}

pub(crate) fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Direction used to push apart two nodes that share a position.
///
/// Deterministic per pair and antisymmetric: `jitter(i, j) == -jitter(j, i)`.
pub(crate) fn jitter<P: Point>(i: usize, j: usize) -> P {
    let (lo, hi, sign) = if i < j { (i, j, 1.0) } else { (j, i, -1.0) };
    let mut state = ((lo as u64) << 32) ^ hi as u64;
    let direction = P::from_fn(|_| {
        // splitmix64
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        (z >> 40) as f32 / (1u64 << 23) as f32 - 1.0
    });
    let len = direction.length();
    if len > 1e-3 {
        direction * (sign / len)
    } else {
        P::from_fn(|a| if a == 0 { sign } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// A graph whose version is stable while a snapshot is taken but has always moved on
    /// by the time the step is written back.
    struct Churning {
        graph: UnGraph<(), ()>,
        calls: AtomicU64,
    }

    impl Churning {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                graph: UnGraph::from_edges([(0, 1), (1, 2), (2, 3)]),
                calls: AtomicU64::new(0),
            })
        }

        /// Line the version changes up with the next snapshot.
        fn rewind(&self) {
            self.calls.store(0, Ordering::SeqCst);
        }
    }

    impl Topology for Churning {
        type Node = NodeIndex;
        type Edge = EdgeIndex;

        fn nodes(&self) -> Vec<NodeIndex> {
            Topology::nodes(&self.graph)
        }

        fn edges(&self) -> Vec<EdgeIndex> {
            Topology::edges(&self.graph)
        }

        fn neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
            self.graph.neighbors(node).collect()
        }

        fn degree(&self, node: NodeIndex) -> usize {
            Topology::degree(&self.graph, node)
        }

        fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
            self.graph.edge_endpoints(edge)
        }

        fn contains_node(&self, node: NodeIndex) -> bool {
            self.graph.node_weight(node).is_some()
        }

        // A snapshot reads the version twice, the write-back check once.
        fn version(&self) -> u64 {
            (self.calls.fetch_add(1, Ordering::SeqCst) + 1) / 3
        }
    }

    fn assert_step_is_discarded<L>(layout: &mut L, topology: &Churning)
    where
        L: IterativeLayout<Node = NodeIndex, Point = Vec2>,
    {
        for node in layout.topology_nodes() {
            layout.positions().get(node);
        }
        let before = layout.positions().snapshot_map();
        let iteration = layout.iteration();
        topology.rewind();
        layout.step();
        assert_eq!(layout.iteration(), iteration);
        assert_eq!(layout.positions().snapshot_map(), before);
    }

    #[test]
    fn discarded_steps_are_not_counted() {
        let region = Bounds::centered(Vec2::splat(100.0));

        let topology = Churning::new();
        let mut fr = FrLayout::builder()
            .seed(1)
            .build(Arc::clone(&topology), Positions::with_seed(region, 1))
            .unwrap();
        let temperature = fr.temperature();
        assert_step_is_discarded(&mut fr, &topology);
        assert_eq!(fr.temperature(), temperature);

        let topology = Churning::new();
        let mut kk = KkLayout::builder()
            .build(Arc::clone(&topology), Positions::with_seed(region, 2))
            .unwrap();
        assert_step_is_discarded(&mut kk, &topology);

        let topology = Churning::new();
        let mut spring = SpringLayout::builder()
            .build(Arc::clone(&topology), Positions::with_seed(region, 3))
            .unwrap();
        assert_step_is_discarded(&mut spring, &topology);

        let topology = Churning::new();
        let mut isom = IsomLayout::builder()
            .seed(4)
            .build(Arc::clone(&topology), Positions::with_seed(region, 4))
            .unwrap();
        let epoch = isom.epoch();
        assert_step_is_discarded(&mut isom, &topology);
        assert_eq!(isom.epoch(), epoch);
    }

    #[test]
    fn jitter_is_antisymmetric_unit() {
        for (i, j) in [(0, 1), (3, 17), (42, 5)] {
            let a: Vec2 = jitter(i, j);
            let b: Vec2 = jitter(j, i);
            assert!((a.length() - 1.0).abs() < 1e-5);
            assert_eq!(a, -b);
        }
        let c: Vec3 = jitter(2, 9);
        assert!((c.length() - 1.0).abs() < 1e-5);
    }
}
