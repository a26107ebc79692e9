//! Spring embedder after Eades: edges pull towards a desired length, nearby nodes push
//! each other away, and a decaying velocity smooths the motion.

use super::{jitter, Context, IterativeLayout};
use crate::error::{ensure_positive, ensure_range, Error, Result};
use crate::geometry::Point;
use crate::positions::Positions;
use crate::topology::Topology;
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Largest distance a node may travel along one axis in a single step.
const MAX_MOVE: f32 = 5.0;
const MIN_EDGE_LENGTH: f32 = 1e-4;

/// Desired length of an edge.
pub type EdgeLength<E> = Arc<dyn Fn(E) -> f32 + Send + Sync>;

/// Parameters of [`SpringLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringConfig {
    /// Damps edges between high-degree nodes by `stretch^(deg(u) + deg(v) - 2)`.
    pub stretch: f32,
    pub force_multiplier: f32,
    /// Nodes further apart than this do not repel each other.
    pub repulsion_range: f32,
    /// Desired length of every edge unless a per-edge function is installed.
    pub edge_length: f32,
    /// Stop after this many steps. Without a limit the layout runs until stopped.
    pub max_iterations: Option<usize>,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            stretch: 0.70,
            force_multiplier: 1.0 / 3.0,
            repulsion_range: 100.0,
            edge_length: 30.0,
            max_iterations: None,
        }
    }
}

impl SpringConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("stretch", self.stretch as f64)?;
        ensure_range("stretch", self.stretch as f64, 0.0, 1.0)?;
        ensure_positive("force_multiplier", self.force_multiplier as f64)?;
        ensure_positive("repulsion_range", self.repulsion_range as f64)?;
        ensure_positive("edge_length", self.edge_length as f64)?;
        if self.max_iterations == Some(0) {
            return Err(Error::invalid("max_iterations", 0.0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Eades-style spring layout.
pub struct SpringLayout<T: Topology, P: Point> {
    context: Context<T, P>,
    config: SpringConfig,
    edge_length: Option<EdgeLength<T::Edge>>,
    velocities: HashMap<T::Node, P>,
    iteration: usize,
}

impl<T: Topology, P: Point> SpringLayout<T, P> {
    pub fn builder() -> SpringLayoutBuilder<T, P> {
        SpringLayoutBuilder::default()
    }

    pub fn with_config(
        topology: T,
        positions: Positions<T::Node, P>,
        config: SpringConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            context: Context::new(topology, positions),
            config,
            edge_length: None,
            velocities: HashMap::new(),
            iteration: 0,
        })
    }

    /// Use a desired length per edge instead of the configured constant.
    pub fn with_edge_length(mut self, length: impl Fn(T::Edge) -> f32 + Send + Sync + 'static) -> Self {
        self.edge_length = Some(Arc::new(length));
        self
    }

    pub fn config(&self) -> &SpringConfig {
        &self.config
    }

    pub fn topology(&self) -> &T {
        &self.context.topology
    }

    /// Current velocity of `node`, zero when it has not moved yet.
    pub fn velocity(&self, node: T::Node) -> P {
        self.velocities.get(&node).copied().unwrap_or(P::ZERO)
    }
}

impl<T, P> IterativeLayout for SpringLayout<T, P>
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
        self.velocities.clear();
        self.iteration = 0;
        debug!("Initialized spring layout");
    }

    fn reset(&mut self) {
        self.initialize();
    }

    fn step(&mut self) {
        let bounds = self.context.bounds();
        let config = &self.config;
        let edge_length = &self.edge_length;
        let velocities = &self.velocities;
        let range_sq = config.repulsion_range * config.repulsion_range;
        let mut next_velocities = HashMap::new();

        let committed = self.context.step_with(|frame| {
            let n = frame.len();
            let snapshot = &frame.snapshot;
            let locked = &frame.locked;
            let positions = &mut frame.positions;

            let mut velocity: Vec<P> = snapshot
                .nodes()
                .iter()
                .map(|node| velocities.get(node).copied().unwrap_or(P::ZERO) / 4.0)
                .collect();

            let mut edge_force = vec![P::ZERO; n];
            for &(edge, u, v) in snapshot.edges() {
                if u == v {
                    continue;
                }
                let delta = positions[u] - positions[v];
                let len = match delta.length() {
                    len if len > 0.0 => len,
                    _ => MIN_EDGE_LENGTH,
                };
                let desired = edge_length.as_ref().map_or(config.edge_length, |f| f(edge));
                let damping = config
                    .stretch
                    .powi((snapshot.degree(u) + snapshot.degree(v)) as i32 - 2);
                let force = delta * (config.force_multiplier * (desired - len) / len * damping);
                edge_force[u] += force;
                edge_force[v] -= force;
            }

            let current: &[P] = &positions[..];
            let repulsion: Vec<P> = (0..n)
                .into_par_iter()
                .map(|i| {
                    if locked[i] {
                        return P::ZERO;
                    }
                    let mut push = P::ZERO;
                    for (j, &other) in current.iter().enumerate() {
                        if i == j {
                            continue;
                        }
                        let delta = current[i] - other;
                        let dist_sq = delta.length_squared();
                        if dist_sq == 0.0 {
                            push += jitter(i, j);
                        } else if dist_sq < range_sq {
                            push += delta / dist_sq;
                        }
                    }
                    let len = push.length();
                    if len > 0.0 {
                        push / (len / 2.0)
                    } else {
                        P::ZERO
                    }
                })
                .collect();

            for i in 0..n {
                if locked[i] {
                    continue;
                }
                velocity[i] += repulsion[i] + edge_force[i];
                let v = velocity[i];
                let moved = positions[i] + P::from_fn(|a| v.axis(a).clamp(-MAX_MOVE, MAX_MOVE));
                positions[i] = bounds.clamp(moved);
            }

            next_velocities = snapshot.nodes().iter().copied().zip(velocity).collect();
        });

        if committed {
            self.velocities = next_velocities;
            self.iteration += 1;
            trace!("Spring iteration {}", self.iteration);
        }
    }

    fn done(&self) -> bool {
        self.config
            .max_iterations
            .is_some_and(|max| self.iteration >= max)
    }

    fn iteration(&self) -> usize {
        self.iteration
    }
}

/// Builder for [`SpringLayout`].
pub struct SpringLayoutBuilder<T, P> {
    config: SpringConfig,
    marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Default for SpringLayoutBuilder<T, P> {
    fn default() -> Self {
        Self {
            config: SpringConfig::default(),
            marker: PhantomData,
        }
    }
}

impl<T: Topology, P: Point> SpringLayoutBuilder<T, P> {
    /// Default: `0.70`
    pub fn stretch(mut self, stretch: f32) -> Self {
        self.config.stretch = stretch;
        self
    }

    /// Default: `1/3`
    pub fn force_multiplier(mut self, multiplier: f32) -> Self {
        self.config.force_multiplier = multiplier;
        self
    }

    /// Default: `100.0`
    pub fn repulsion_range(mut self, range: f32) -> Self {
        self.config.repulsion_range = range;
        self
    }

    /// Default: `30.0`
    pub fn edge_length(mut self, length: f32) -> Self {
        self.config.edge_length = length;
        self
    }

    /// Let [`IterativeLayout::done`] report true after `max` steps.
    ///
    /// Default: run until stopped
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = Some(max);
        self
    }

    pub fn config(mut self, config: SpringConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(
        self,
        topology: T,
        positions: Positions<T::Node, P>,
    ) -> Result<SpringLayout<T, P>> {
        SpringLayout::with_config(topology, positions, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use glam::Vec2;
    use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};

    fn region() -> Bounds<Vec2> {
        Bounds::centered(Vec2::new(200.0, 200.0))
    }

    #[test]
    fn connected_pair_settles_where_forces_balance() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
        let positions = Positions::with_seed(region(), 1);
        let (a, b) = (NodeIndex::new(0), NodeIndex::new(1));
        positions.set(a, Vec2::new(-10.0, 0.0));
        positions.set(b, Vec2::new(10.0, 0.0));
        let mut layout = SpringLayout::builder().build(g, positions.clone()).unwrap();
        layout.relax(300);
        // Normalized repulsion of 2 balances (len - 30) / 3.
        let d = positions.get(a).distance(positions.get(b));
        assert!((d - 36.0).abs() < 1.0, "distance {d}");
    }

    #[test]
    fn termination_is_caller_driven_by_default() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
        let mut layout = SpringLayout::builder()
            .build(g.clone(), Positions::with_seed(region(), 1))
            .unwrap();
        assert_eq!(layout.relax(25), 25);
        assert!(!layout.done());

        let mut bounded = SpringLayout::builder()
            .max_iterations(5)
            .build(g, Positions::with_seed(region(), 1))
            .unwrap();
        assert_eq!(bounded.relax(25), 5);
        assert!(bounded.done());
    }

    #[test]
    fn nodes_stay_in_region_and_locks_hold() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1), (1, 2), (2, 3), (0, 3), (0, 2)]);
        let positions = Positions::with_seed(region(), 8);
        let anchor = NodeIndex::new(3);
        positions.set(anchor, Vec2::new(99.0, 99.0));
        positions.lock(anchor, true);
        let mut layout = SpringLayout::builder()
            .edge_length(150.0)
            .build(g, positions.clone())
            .unwrap();
        layout.relax(200);
        assert_eq!(positions.get(anchor), Vec2::new(99.0, 99.0));
        for i in 0..4 {
            assert!(region().contains(positions.get(NodeIndex::new(i))));
        }
    }

    #[test]
    fn per_edge_lengths() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
        let positions = Positions::with_seed(region(), 1);
        positions.set(NodeIndex::new(0), Vec2::new(-5.0, 0.0));
        positions.set(NodeIndex::new(1), Vec2::new(5.0, 0.0));
        let mut layout = SpringLayout::builder()
            .build(g, positions.clone())
            .unwrap()
            .with_edge_length(|e: EdgeIndex| if e.index() == 0 { 60.0 } else { 30.0 });
        layout.relax(300);
        let d = positions
            .get(NodeIndex::new(0))
            .distance(positions.get(NodeIndex::new(1)));
        assert!((d - 66.0).abs() < 1.0, "distance {d}");
    }

    #[test]
    fn stretch_outside_unit_interval_is_rejected() {
        let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
        assert!(SpringLayout::builder()
            .stretch(1.5)
            .build(g, Positions::<NodeIndex, Vec2>::new(region()))
            .is_err());
    }
}
