//! Inverted self-organizing map (Meyer): every step pulls the node closest to a random
//! target, and its graph neighborhood, towards that target.

use super::{rng_from_seed, Context, Frame, IterativeLayout};
use crate::error::{ensure_positive, ensure_range, Error, Result};
use crate::geometry::{Bounds, Point};
use crate::positions::Positions;
use crate::spatial::{QuadTree, SpatialIndex};
use crate::topology::{ElementId, Topology};
use log::{debug, trace};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// Parameters of [`IsomLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsomConfig {
    pub max_epoch: usize,
    /// The neighborhood radius shrinks by one hop every this many epochs.
    pub radius_constant_time: usize,
    /// Initial neighborhood radius in hops.
    pub radius: usize,
    pub min_radius: usize,
    pub initial_adaption: f32,
    pub min_adaption: f32,
    pub cooling_factor: f32,
    /// Seed for the random targets. Entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for IsomConfig {
    fn default() -> Self {
        Self {
            max_epoch: 2000,
            radius_constant_time: 100,
            radius: 5,
            min_radius: 1,
            initial_adaption: 0.9,
            min_adaption: 0.0,
            cooling_factor: 2.0,
            seed: None,
        }
    }
}

impl IsomConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_epoch == 0 {
            return Err(Error::invalid("max_epoch", 0.0, "must be at least 1"));
        }
        if self.radius_constant_time == 0 {
            return Err(Error::invalid("radius_constant_time", 0.0, "must be at least 1"));
        }
        if self.min_radius > self.radius {
            return Err(Error::invalid(
                "min_radius",
                self.min_radius as f64,
                "must not exceed radius",
            ));
        }
        ensure_positive("initial_adaption", self.initial_adaption as f64)?;
        ensure_range("initial_adaption", self.initial_adaption as f64, 0.0, 1.0)?;
        ensure_range(
            "min_adaption",
            self.min_adaption as f64,
            0.0,
            self.initial_adaption as f64,
        )?;
        ensure_positive("cooling_factor", self.cooling_factor as f64)?;
        Ok(())
    }
}

/// Self-organizing map layout.
///
/// The winner of each step is looked up in a quad-tree that follows the moves made by
/// the layout. It is rebuilt whenever the topology changes, and nodes moved through the
/// position store by anyone else are re-indexed before the next lookup.
pub struct IsomLayout<T: Topology, P: Point> {
    context: Context<T, P>,
    config: IsomConfig,
    rng: StdRng,
    index: QuadTree<T::Node, P>,
    indexed_version: Option<u64>,
    epoch: usize,
    radius: usize,
    adaption: f32,
}

impl<T: Topology, P: Point> IsomLayout<T, P> {
    pub fn builder() -> IsomLayoutBuilder<T, P> {
        IsomLayoutBuilder::default()
    }

    pub fn with_config(
        topology: T,
        positions: Positions<T::Node, P>,
        config: IsomConfig,
    ) -> Result<Self> {
        config.validate()?;
        let bounds = positions.bounds();
        let mut layout = Self {
            context: Context::new(topology, positions),
            rng: rng_from_seed(config.seed),
            index: QuadTree::new(bounds),
            indexed_version: None,
            epoch: 1,
            radius: config.radius,
            adaption: config.initial_adaption,
            config,
        };
        layout.restart();
        Ok(layout)
    }

    pub fn config(&self) -> &IsomConfig {
        &self.config
    }

    pub fn topology(&self) -> &T {
        &self.context.topology
    }

    /// Starts at 1.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Current neighborhood radius in hops.
    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn adaption(&self) -> f32 {
        self.adaption
    }

    /// Back to the first epoch with an empty index.
    fn restart(&mut self) {
        self.epoch = 1;
        self.radius = self.config.radius;
        self.adaption = self.config.initial_adaption;
        self.index = QuadTree::new(self.context.bounds());
        self.indexed_version = None;
        debug!("Initialized ISOM layout, radius {}", self.radius);
    }

    fn update_parameters(&mut self) {
        self.epoch += 1;
        let progress = self.epoch as f32 / self.config.max_epoch as f32;
        let decayed = (-self.config.cooling_factor * progress).exp() * self.config.initial_adaption;
        self.adaption = decayed.max(self.config.min_adaption);
        if self.epoch % self.config.radius_constant_time == 0 && self.radius > self.config.min_radius
        {
            self.radius -= 1;
        }
    }
}

/// Bring the index in line with the frame.
///
/// The whole frame is re-indexed if the index was built for another topology version.
/// Otherwise only nodes whose stored position differs from the indexed one are moved,
/// which covers writes to the store from outside this layout.
fn sync_index<N, E, P>(index: &mut QuadTree<N, P>, version: &mut Option<u64>, frame: &Frame<N, E, P>)
where
    N: ElementId,
    E: ElementId,
    P: Point,
{
    let current = frame.snapshot.version();
    if *version == Some(current) && index.len() == frame.len() {
        let mut moved = 0;
        for (&node, &p) in frame.snapshot.nodes().iter().zip(&frame.positions) {
            let entry = Bounds::point(p);
            if index.entry(node) != Some(entry) {
                index.update(node, entry);
                moved += 1;
            }
        }
        if moved > 0 {
            trace!("ISOM index re-synced {moved} externally moved nodes");
        }
        return;
    }
    let entries: Vec<(N, Bounds<P>)> = frame
        .snapshot
        .nodes()
        .iter()
        .zip(&frame.positions)
        .map(|(&node, &p)| (node, Bounds::point(p)))
        .collect();
    index.recalculate(&entries);
    *version = Some(current);
    debug!("ISOM index rebuilt for {} nodes", entries.len());
}

/// Snapshot index of the node closest to `target`.
fn winner<N, E, P>(index: &QuadTree<N, P>, frame: &Frame<N, E, P>, target: P) -> Option<usize>
where
    N: ElementId,
    E: ElementId,
    P: Point,
{
    if let Some(i) = index
        .closest_element(target)
        .and_then(|node| frame.snapshot.index_of(&node))
    {
        return Some(i);
    }
    frame
        .positions
        .iter()
        .enumerate()
        .map(|(i, p)| (i, p.distance_squared(target)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

impl<T, P> IterativeLayout for IsomLayout<T, P>
where
    T: Topology + Send,
    P: Point,
{
    type Node = T::Node;
    type Point = P;

    fn positions(&self) -> &Positions<T::Node, P> {
        &self.context.positions
    }

    fn topology_nodes(&self) -> Vec<T::Node> {
        self.context.topology.nodes()
    }

    fn initialize(&mut self) {
        self.restart();
    }

    fn reset(&mut self) {
        self.initialize();
    }

    fn step(&mut self) {
        let Self {
            context,
            rng,
            index,
            indexed_version,
            radius,
            adaption,
            ..
        } = self;
        let target = context.bounds().random_point(rng);
        let (radius, adaption) = (*radius, *adaption);
        let mut moved: Vec<(T::Node, P)> = Vec::new();

        let committed = context.step_with(|frame| {
            moved.clear();
            sync_index(index, indexed_version, frame);
            let Some(winner) = winner(index, frame, target) else {
                return;
            };

            let mut hops = vec![usize::MAX; frame.len()];
            let mut queue = VecDeque::from([winner]);
            hops[winner] = 0;
            while let Some(i) = queue.pop_front() {
                let hop = hops[i];
                if !frame.locked[i] {
                    let factor = adaption / 2f32.powi(hop as i32);
                    let p = frame.positions[i];
                    frame.positions[i] = p + (target - p) * factor;
                    moved.push((frame.snapshot.node(i), frame.positions[i]));
                }
                if hop < radius {
                    for &j in frame.snapshot.neighbors(i) {
                        if hops[j] == usize::MAX {
                            hops[j] = hop + 1;
                            queue.push_back(j);
                        }
                    }
                }
            }
        });

        if !committed {
            return;
        }
        for (node, p) in moved {
            self.index.update(node, Bounds::point(p));
        }
        self.update_parameters();
        trace!(
            "ISOM epoch {}, radius {}, adaption {}",
            self.epoch,
            self.radius,
            self.adaption
        );
    }

    fn done(&self) -> bool {
        self.epoch >= self.config.max_epoch
    }

    fn iteration(&self) -> usize {
        self.epoch - 1
    }
}

/// Builder for [`IsomLayout`].
pub struct IsomLayoutBuilder<T, P> {
    config: IsomConfig,
    marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Default for IsomLayoutBuilder<T, P> {
    fn default() -> Self {
        Self {
            config: IsomConfig::default(),
            marker: PhantomData,
        }
    }
}

impl<T: Topology, P: Point> IsomLayoutBuilder<T, P> {
    /// Default: `2000`
    pub fn max_epoch(mut self, max_epoch: usize) -> Self {
        self.config.max_epoch = max_epoch;
        self
    }

    /// Default: `100`
    pub fn radius_constant_time(mut self, epochs: usize) -> Self {
        self.config.radius_constant_time = epochs;
        self
    }

    /// Default: `5`
    pub fn radius(mut self, radius: usize) -> Self {
        self.config.radius = radius;
        self
    }

    /// Default: `1`
    pub fn min_radius(mut self, radius: usize) -> Self {
        self.config.min_radius = radius;
        self
    }

    /// Fraction of the way to the target the winner moves in the first epoch.
    ///
    /// Default: `0.9`
    pub fn initial_adaption(mut self, adaption: f32) -> Self {
        self.config.initial_adaption = adaption;
        self
    }

    /// Default: `0.0`
    pub fn min_adaption(mut self, adaption: f32) -> Self {
        self.config.min_adaption = adaption;
        self
    }

    /// Default: `2.0`
    pub fn cooling_factor(mut self, factor: f32) -> Self {
        self.config.cooling_factor = factor;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn config(mut self, config: IsomConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(
        self,
        topology: T,
        positions: Positions<T::Node, P>,
    ) -> Result<IsomLayout<T, P>> {
        IsomLayout::with_config(topology, positions, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SharedGraph;
    use glam::{Vec2, Vec3};
    use petgraph::graph::{NodeIndex, UnGraph};

    fn region() -> Bounds<Vec2> {
        Bounds::centered(Vec2::splat(200.0))
    }

    fn grid_graph(side: u32) -> UnGraph<(), ()> {
        let mut edges = Vec::new();
        for i in 0..side * side {
            if i % side + 1 < side {
                edges.push((i, i + 1));
            }
            if i + side < side * side {
                edges.push((i, i + side));
            }
        }
        UnGraph::from_edges(edges)
    }

    #[test]
    fn parameters_cool_down() {
        let mut layout = IsomLayout::builder()
            .seed(1)
            .build(grid_graph(3), Positions::with_seed(region(), 1))
            .unwrap();
        assert_eq!(layout.epoch(), 1);
        assert_eq!(layout.iteration(), 0);
        layout.relax(99);
        assert_eq!(layout.epoch(), 100);
        assert_eq!(layout.radius(), 4);
        let expected = 0.9 * (-2.0_f32 * 100.0 / 2000.0).exp();
        assert!((layout.adaption() - expected).abs() < 1e-5);
    }

    #[test]
    fn stops_at_max_epoch() {
        let mut layout = IsomLayout::builder()
            .max_epoch(50)
            .seed(1)
            .build(grid_graph(2), Positions::with_seed(region(), 1))
            .unwrap();
        assert_eq!(layout.relax(1000), 49);
        assert!(layout.done());
    }

    #[test]
    fn only_the_neighborhood_moves() {
        let path = UnGraph::<(), ()>::from_edges([(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);
        let positions = Positions::with_seed(region(), 7);
        let mut layout = IsomLayout::builder()
            .radius(1)
            .seed(3)
            .build(path, positions.clone())
            .unwrap();
        let before = positions.fetch(&(0..6).map(NodeIndex::new).collect::<Vec<_>>()).0;
        layout.step();
        let after = positions.fetch(&(0..6).map(NodeIndex::new).collect::<Vec<_>>()).0;
        let moved: Vec<usize> = (0..6).filter(|&i| before[i] != after[i]).collect();
        assert!(!moved.is_empty() && moved.len() <= 3);
        assert!(moved.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn nodes_stay_in_region_and_locks_hold() {
        let g = grid_graph(4);
        let positions = Positions::with_seed(region(), 11);
        let anchor = NodeIndex::new(5);
        positions.set(anchor, Vec2::new(-90.0, 90.0));
        positions.lock(anchor, true);
        let mut layout = IsomLayout::builder().seed(5).build(g, positions.clone()).unwrap();
        layout.relax(500);
        assert_eq!(positions.get(anchor), Vec2::new(-90.0, 90.0));
        for i in 0..16 {
            assert!(region().contains(positions.get(NodeIndex::new(i))));
        }
    }

    #[test]
    fn index_follows_the_moves() {
        let positions = Positions::with_seed(region(), 2);
        let mut layout = IsomLayout::builder()
            .seed(2)
            .build(grid_graph(4), positions.clone())
            .unwrap();
        layout.relax(300);
        for i in 0..16 {
            let node = NodeIndex::new(i);
            assert_eq!(layout.index.entry(node), Some(Bounds::point(positions.get(node))));
        }
    }

    #[test]
    fn nodes_moved_elsewhere_can_still_win() {
        // Two separate pairs; the winner for a target is always the nearest node.
        let g = UnGraph::<(), ()>::from_edges([(0, 1), (2, 3)]);
        let positions = Positions::with_seed(region(), 8);
        let mut layout = IsomLayout::builder()
            .seed(8)
            .build(g, positions.clone())
            .unwrap();
        layout.step();

        let dragged = NodeIndex::new(3);
        positions.set(dragged, Vec2::new(99.0, 99.0));
        layout.step();
        let indexed = layout.index.entry(dragged).map(|b| b.min);
        assert_eq!(indexed, Some(positions.get(dragged)));

        let frame_nodes: Vec<NodeIndex> = (0..4).map(NodeIndex::new).collect();
        for (node, p) in frame_nodes.iter().zip(positions.fetch(&frame_nodes).0) {
            assert_eq!(layout.index.entry(*node), Some(Bounds::point(p)));
        }
        let nearest = frame_nodes
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let target = Vec2::splat(98.0);
                positions
                    .get(a)
                    .distance_squared(target)
                    .total_cmp(&positions.get(b).distance_squared(target))
            });
        assert_eq!(layout.index.closest_element(Vec2::splat(98.0)), nearest);
    }

    #[test]
    fn index_is_rebuilt_after_structural_change() {
        let graph = SharedGraph::new(grid_graph(2));
        let mut layout = IsomLayout::builder()
            .seed(4)
            .build(graph.clone(), Positions::with_seed(region(), 4))
            .unwrap();
        layout.step();
        assert_eq!(layout.index.len(), 4);
        graph.mutate(|g| {
            let n = g.add_node(());
            g.add_edge(n, NodeIndex::new(0), ());
        });
        layout.step();
        assert_eq!(layout.index.len(), 5);
    }

    #[test]
    fn runs_in_three_dimensions() {
        let region = Bounds::centered(Vec3::splat(100.0));
        let positions = Positions::with_seed(region, 6);
        let mut layout = IsomLayout::builder()
            .seed(6)
            .build(grid_graph(3), positions.clone())
            .unwrap();
        layout.relax(200);
        for i in 0..9 {
            assert!(region.contains(positions.get(NodeIndex::new(i))));
        }
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let build = |b: IsomLayoutBuilder<UnGraph<(), ()>, Vec2>| {
            b.build(grid_graph(2), Positions::<NodeIndex, Vec2>::new(region()))
                .is_err()
        };
        assert!(build(IsomLayout::builder().initial_adaption(1.5)));
        assert!(build(IsomLayoutBuilder::default().min_radius(9)));
        assert!(build(IsomLayoutBuilder::default().max_epoch(0)));
        assert!(build(IsomLayoutBuilder::default().min_adaption(0.95)));
    }
}
