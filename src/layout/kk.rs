//! Kamada-Kawai: springs between every pair of nodes whose rest length is proportional
//! to the graph-theoretic distance, relaxed one node at a time by Newton-Raphson.

use super::{Context, Frame, IterativeLayout};
use crate::error::{ensure_positive, Error, Result};
use crate::geometry::{Bounds, Point};
use crate::positions::Positions;
use crate::topology::{DistanceMatrix, ElementId, ShortestPaths, Snapshot, Topology, Unweighted};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Gradient magnitude below which a node counts as settled.
const EPSILON: f32 = 0.1;
const NEWTON_STEPS: usize = 100;
/// Distances shorter than this are treated as this.
const MIN_DISTANCE: f32 = 1e-4;

/// Parameters of [`KkLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KkConfig {
    pub max_iterations: usize,
    /// Share of the region an edge of the longest shortest path may use.
    pub length_factor: f32,
    /// Graph distance of unconnected pairs, relative to the diameter.
    pub disconnected_multiplier: f32,
    /// Once settled, try swapping pairs of nodes to escape local minima.
    pub exchange_vertices: bool,
    /// Keep the layout centered in the region.
    pub adjust_for_gravity: bool,
}

impl Default for KkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            length_factor: 0.9,
            disconnected_multiplier: 0.5,
            exchange_vertices: true,
            adjust_for_gravity: true,
        }
    }
}

impl KkConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("length_factor", self.length_factor as f64)?;
        ensure_positive("disconnected_multiplier", self.disconnected_multiplier as f64)?;
        if self.max_iterations == 0 {
            return Err(Error::invalid("max_iterations", 0.0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Spring constants for one snapshot of the topology.
struct Springs<N, E> {
    snapshot: Snapshot<N, E>,
    /// Graph distance of every pair, row-major.
    distances: Vec<f32>,
    diameter: f32,
    /// Layout length of one hop.
    edge_length: f32,
}

impl<N: ElementId, E: ElementId> Springs<N, E> {
    fn build<D: ShortestPaths, P: Point>(
        snapshot: Snapshot<N, E>,
        paths: &D,
        bounds: &Bounds<P>,
        config: &KkConfig,
    ) -> Self {
        let matrix = DistanceMatrix::compute(&snapshot, paths);
        let diameter = matrix.diameter().max(1.0);
        let distances = matrix.fill_disconnected(diameter * config.disconnected_multiplier);
        let edge_length = 2.0 * bounds.radius() / diameter * config.length_factor;
        debug!(
            "KK springs for {} nodes: diameter {diameter}, edge length {edge_length}",
            snapshot.len()
        );
        Self {
            snapshot,
            distances,
            diameter,
            edge_length,
        }
    }

    fn matches(&self, snapshot: &Snapshot<N, E>) -> bool {
        self.snapshot.version() == snapshot.version() && self.snapshot.nodes() == snapshot.nodes()
    }

    fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Strength and rest length of the spring between `i` and `j`.
    fn spring(&self, i: usize, j: usize) -> (f32, f32) {
        let d = self.distances[i * self.len() + j];
        (1.0 / (d * d), self.edge_length * d)
    }

    fn pair_energy<P: Point>(&self, positions: &[P], i: usize, j: usize) -> f32 {
        let (k, l) = self.spring(i, j);
        let dist_sq = positions[i].distance_squared(positions[j]);
        k / 2.0 * (dist_sq + l * l - 2.0 * l * dist_sq.sqrt())
    }

    fn energy<P: Point>(&self, positions: &[P]) -> f32 {
        (0..positions.len())
            .into_par_iter()
            .map(|i| {
                ((i + 1)..positions.len())
                    .map(|j| self.pair_energy(positions, i, j))
                    .sum::<f32>()
            })
            .sum()
    }

    /// Energy of every spring attached to `p` or `q`.
    fn energy_around<P: Point>(&self, positions: &[P], p: usize, q: usize) -> f32 {
        let mut energy = 0.0;
        for j in 0..positions.len() {
            if j != p {
                energy += self.pair_energy(positions, p, j);
            }
            if j != p && j != q {
                energy += self.pair_energy(positions, q, j);
            }
        }
        energy
    }

    /// Partial derivatives of the energy with respect to the position of `m`.
    fn gradient<P: Point>(&self, positions: &[P], m: usize) -> P {
        let mut gradient = P::ZERO;
        for (i, &other) in positions.iter().enumerate() {
            if i == m {
                continue;
            }
            let (k, l) = self.spring(m, i);
            let delta = positions[m] - other;
            let len = delta.length().max(MIN_DISTANCE);
            gradient += delta * (k * (1.0 - l / len));
        }
        gradient
    }

    /// Newton-Raphson move of `m`, `None` when the Hessian is singular.
    fn newton_step<P: Point>(&self, positions: &[P], m: usize) -> Option<P> {
        let dims = P::DIMS;
        let mut hessian = [[0.0_f32; 3]; 3];
        let mut gradient = [0.0_f32; 3];
        for (i, &other) in positions.iter().enumerate() {
            if i == m {
                continue;
            }
            let (k, l) = self.spring(m, i);
            let delta = positions[m] - other;
            let len = delta.length().max(MIN_DISTANCE);
            let len_sq = len * len;
            let len_cubed = len_sq * len;
            for a in 0..dims {
                let da = delta.axis(a);
                gradient[a] += k * (da - l * da / len);
                for b in 0..dims {
                    let db = delta.axis(b);
                    let identity = if a == b { 1.0 } else { 0.0 };
                    hessian[a][b] += k * (identity - l * (identity * len_sq - da * db) / len_cubed);
                }
            }
        }
        let rhs = gradient.map(|g| -g);
        solve(&mut hessian, rhs, dims).map(|x| P::from_fn(|a| x[a]))
    }

    /// One iteration on `frame`. Returns the energy afterwards.
    fn advance<P: Point>(&self, frame: &mut Frame<N, E, P>, config: &KkConfig, center: P) -> f32 {
        let n = frame.len();
        let positions = &mut frame.positions;
        let locked = &frame.locked;

        let current: &[P] = &positions[..];
        let most_stressed = (0..n)
            .into_par_iter()
            .filter(|&m| !locked[m])
            .map(|m| (m, self.gradient(current, m).length()))
            .reduce_with(|a, b| if b.1 > a.1 || (b.1 == a.1 && b.0 < a.0) { b } else { a });
        let Some((moving, max_delta)) = most_stressed else {
            return self.energy(positions);
        };

        for _ in 0..NEWTON_STEPS {
            let Some(delta) = self.newton_step(positions, moving) else {
                trace!("KK Hessian singular for node {moving}, stopping Newton steps");
                break;
            };
            if !delta.is_finite() {
                break;
            }
            positions[moving] += delta;
            if self.gradient(positions, moving).length() < EPSILON {
                break;
            }
        }

        if config.adjust_for_gravity {
            let mean = positions.iter().fold(P::ZERO, |acc, &p| acc + p) / n as f32;
            let shift = center - mean;
            for (p, &is_locked) in positions.iter_mut().zip(locked) {
                if !is_locked {
                    *p += shift;
                }
            }
        }

        if config.exchange_vertices && max_delta < EPSILON {
            self.exchange_first_improvement(positions, locked);
        }

        self.energy(positions)
    }

    /// Swap the first pair of unlocked nodes, in row-major order, whose exchange lowers
    /// the energy.
    fn exchange_first_improvement<P: Point>(&self, positions: &mut [P], locked: &[bool]) {
        let n = positions.len();
        for p in 0..n {
            if locked[p] {
                continue;
            }
            for q in (p + 1)..n {
                if locked[q] {
                    continue;
                }
                let before = self.energy_around(positions, p, q);
                positions.swap(p, q);
                let after = self.energy_around(positions, p, q);
                if after < before {
                    trace!("KK exchanged nodes {p} and {q}, energy -{}", before - after);
                    return;
                }
                positions.swap(p, q);
            }
        }
    }
}

/// Gaussian elimination with partial pivoting on the leading `dims` × `dims` block.
fn solve(matrix: &mut [[f32; 3]; 3], mut rhs: [f32; 3], dims: usize) -> Option<[f32; 3]> {
    for col in 0..dims {
        let pivot = (col..dims).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        if matrix[pivot][col].abs() < f32::EPSILON {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in (col + 1)..dims {
            let factor = matrix[row][col] / matrix[col][col];
            for c in col..dims {
                matrix[row][c] -= factor * matrix[col][c];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut x = [0.0_f32; 3];
    for row in (0..dims).rev() {
        let tail: f32 = ((row + 1)..dims).map(|c| matrix[row][c] * x[c]).sum();
        x[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Some(x)
}

/// Energy-minimizing layout after Kamada and Kawai.
///
/// Graph distances come from `D`, hop counts by default.
pub struct KkLayout<T: Topology, P: Point, D = Unweighted> {
    context: Context<T, P>,
    config: KkConfig,
    paths: D,
    springs: Option<Springs<T::Node, T::Edge>>,
    energy: f32,
    iteration: usize,
}

impl<T: Topology, P: Point> KkLayout<T, P> {
    pub fn builder() -> KkLayoutBuilder<T, P> {
        KkLayoutBuilder::default()
    }
}

impl<T: Topology, P: Point, D: ShortestPaths> KkLayout<T, P, D> {
    pub fn with_config(
        topology: T,
        positions: Positions<T::Node, P>,
        paths: D,
        config: KkConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut layout = Self {
            context: Context::new(topology, positions),
            config,
            paths,
            springs: None,
            energy: 0.0,
            iteration: 0,
        };
        layout.rebuild();
        Ok(layout)
    }

    fn rebuild(&mut self) {
        let snapshot = self.context.snapshot();
        let bounds = self.context.bounds();
        self.springs = Some(Springs::build(snapshot, &self.paths, &bounds, &self.config));
        self.iteration = 0;
    }

    pub fn config(&self) -> &KkConfig {
        &self.config
    }

    /// Total spring energy after the last step.
    pub fn energy(&self) -> f32 {
        self.energy
    }

    /// Longest finite graph distance, at least 1.
    pub fn diameter(&self) -> f32 {
        self.springs.as_ref().map_or(1.0, |s| s.diameter)
    }

    /// Graph distance the springs use between two nodes, with disconnected pairs
    /// already substituted.
    pub fn graph_distance(&self, a: T::Node, b: T::Node) -> Option<f32> {
        let springs = self.springs.as_ref()?;
        let i = springs.snapshot.index_of(&a)?;
        let j = springs.snapshot.index_of(&b)?;
        Some(springs.distances[i * springs.len() + j])
    }

    pub fn topology(&self) -> &T {
        &self.context.topology
    }
}

impl<T, P, D> IterativeLayout for KkLayout<T, P, D>
where
    T: Topology + Send,
    P: Point,
    D: ShortestPaths,
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
        self.rebuild();
    }

    fn reset(&mut self) {
        self.springs = None;
        self.energy = 0.0;
        self.rebuild();
    }

    fn step(&mut self) {
        let bounds = self.context.bounds();
        let Self {
            context,
            config,
            paths,
            springs,
            energy,
            ..
        } = self;
        let (config, paths) = (&*config, &*paths);

        let committed = context.step_with(|frame| {
            let stale = springs.as_ref().map_or(true, |s| !s.matches(&frame.snapshot));
            if stale {
                debug!("Topology changed since KK initialization, recomputing distances");
                *springs = Some(Springs::build(frame.snapshot.clone(), paths, &bounds, config));
            }
            if let Some(springs) = springs.as_ref() {
                *energy = springs.advance(frame, config, bounds.center());
            }
        });
        if committed {
            self.iteration += 1;
            trace!("KK iteration {} energy {}", self.iteration, self.energy);
        }
    }

    fn done(&self) -> bool {
        self.iteration > self.config.max_iterations
    }

    fn iteration(&self) -> usize {
        self.iteration
    }
}

/// Builder for [`KkLayout`].
pub struct KkLayoutBuilder<T, P> {
    config: KkConfig,
    marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Default for KkLayoutBuilder<T, P> {
    fn default() -> Self {
        Self {
            config: KkConfig::default(),
            marker: PhantomData,
        }
    }
}

impl<T: Topology, P: Point> KkLayoutBuilder<T, P> {
    /// Default: `2000`
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// How much of the region the longest shortest path may span.
    ///
    /// Default: `0.9`
    pub fn length_factor(mut self, length_factor: f32) -> Self {
        self.config.length_factor = length_factor;
        self
    }

    /// Distance of unconnected pairs as a multiple of the diameter.
    ///
    /// Default: `0.5`
    pub fn disconnected_multiplier(mut self, multiplier: f32) -> Self {
        self.config.disconnected_multiplier = multiplier;
        self
    }

    /// Default: `true`
    pub fn exchange_vertices(mut self, exchange: bool) -> Self {
        self.config.exchange_vertices = exchange;
        self
    }

    /// Default: `true`
    pub fn adjust_for_gravity(mut self, adjust: bool) -> Self {
        self.config.adjust_for_gravity = adjust;
        self
    }

    pub fn config(mut self, config: KkConfig) -> Self {
        self.config = config;
        self
    }

    /// Constructs a [`KkLayout`] over hop-count distances.
    pub fn build(
        self,
        topology: T,
        positions: Positions<T::Node, P>,
    ) -> Result<KkLayout<T, P>> {
        KkLayout::with_config(topology, positions, Unweighted, self.config)
    }

    /// Constructs a [`KkLayout`] over custom graph distances.
    pub fn build_with_paths<D: ShortestPaths>(
        self,
        topology: T,
        positions: Positions<T::Node, P>,
        paths: D,
    ) -> Result<KkLayout<T, P, D>> {
        KkLayout::with_config(topology, positions, paths, self.config)
    }
}
