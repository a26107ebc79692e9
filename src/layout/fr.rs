//! Fruchterman-Reingold: all-pairs repulsion, attraction along edges, and a
//! temperature that limits how far a node may move and cools every iteration.

use super::{jitter, rng_from_seed, Context, Frame, IterativeLayout};
use crate::error::{ensure_positive, Error, Result};
use crate::geometry::{Bounds, Point};
use crate::positions::Positions;
use crate::topology::{ElementId, Topology};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

const EPSILON: f32 = 1e-6;

/// Parameters of [`FrLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrConfig {
    pub attraction_multiplier: f32,
    pub repulsion_multiplier: f32,
    pub max_iterations: usize,
    /// Seed for the border jitter. Entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for FrConfig {
    fn default() -> Self {
        Self {
            attraction_multiplier: 0.75,
            repulsion_multiplier: 0.75,
            max_iterations: 700,
            seed: None,
        }
    }
}

impl FrConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("attraction_multiplier", self.attraction_multiplier as f64)?;
        ensure_positive("repulsion_multiplier", self.repulsion_multiplier as f64)?;
        if self.max_iterations == 0 {
            return Err(Error::invalid("max_iterations", 0.0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Force-directed layout after Fruchterman and Reingold.
///
/// A step moves each node by at most the current temperature, so linked nodes may
/// overshoot their ideal distance. The overshoot stays within twice the temperature and
/// shrinks as it cools.
pub struct FrLayout<T: Topology, P: Point> {
    context: Context<T, P>,
    config: FrConfig,
    rng: StdRng,
    attraction_constant: f32,
    repulsion_constant: f32,
    temperature: f32,
    max_dimension: f32,
    iteration: usize,
}

impl<T: Topology, P: Point> FrLayout<T, P> {
    pub fn builder() -> FrLayoutBuilder<T, P> {
        FrLayoutBuilder::default()
    }

    /// Layout with a validated configuration, initialized and ready to step.
    pub fn with_config(
        topology: T,
        positions: Positions<T::Node, P>,
        config: FrConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut layout = Self {
            context: Context::new(topology, positions),
            rng: rng_from_seed(config.seed),
            config,
            attraction_constant: 0.0,
            repulsion_constant: 0.0,
            temperature: 0.0,
            max_dimension: 0.0,
            iteration: 0,
        };
        layout.prepare();
        Ok(layout)
    }

    pub fn config(&self) -> &FrConfig {
        &self.config
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn topology(&self) -> &T {
        &self.context.topology
    }

    /// Force constants and temperature for the current bounds and node count.
    fn prepare(&mut self) {
        let bounds = self.context.bounds();
        let n = self.context.topology.node_count().max(1) as f32;
        let force_constant = (bounds.extent() / n).powf(1.0 / P::DIMS as f32);
        self.attraction_constant = self.config.attraction_multiplier * force_constant;
        self.repulsion_constant = self.config.repulsion_multiplier * force_constant;
        self.temperature = bounds.radius() / 5.0;
        self.max_dimension = bounds.max_dimension();
        self.iteration = 0;
        debug!(
            "Initialized FR layout: k = {force_constant}, temperature = {}",
            self.temperature
        );
    }

    fn cool(&mut self) {
        let progress = self.iteration as f32 / self.config.max_iterations as f32;
        self.temperature *= 1.0 - progress;
    }
}

/// Forces on every node: repulsion from all other nodes plus attraction along edges.
fn displacements<N, E, P>(frame: &Frame<N, E, P>, attraction: f32, repulsion: f32) -> Vec<P>
where
    N: ElementId,
    E: ElementId,
    P: Point,
{
    let positions = &frame.positions;
    let repulsion_sq = repulsion * repulsion;
    let mut disp: Vec<P> = (0..positions.len())
        .into_par_iter()
        .map(|i| {
            if frame.locked[i] {
                return P::ZERO;
            }
            let mut force = P::ZERO;
            for (j, &other) in positions.iter().enumerate() {
                if i == j {
                    continue;
                }
                let delta = positions[i] - other;
                let len = delta.length();
                let direction = if len < EPSILON {
                    jitter(i, j)
                } else {
                    delta / len
                };
                force += direction * (repulsion_sq / len.max(EPSILON));
            }
            force
        })
        .collect();

    for &(_, u, v) in frame.snapshot.edges() {
        if u == v || (frame.locked[u] && frame.locked[v]) {
            continue;
        }
        let delta = positions[u] - positions[v];
        let len = delta.length().max(EPSILON);
        let pull = delta / len * (len * len / attraction);
        disp[u] -= pull;
        disp[v] += pull;
    }
    disp
}

/// Keep a coordinate away from the edges of `[lo, hi]`, bouncing off the border by a
/// random amount of up to two border widths. The result never leaves `[lo, hi]`.
fn bounce(value: f32, lo: f32, hi: f32, border: f32, rng: &mut StdRng) -> f32 {
    let bounced = if value < lo + border {
        lo + border + rng.gen::<f32>() * border * 2.0
    } else if value > hi - border {
        hi - border - rng.gen::<f32>() * border * 2.0
    } else {
        value
    };
    bounced.clamp(lo, hi)
}

impl<T, P> IterativeLayout for FrLayout<T, P>
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
        self.prepare();
    }

    fn reset(&mut self) {
        self.initialize();
    }

    fn step(&mut self) {
        let bounds: Bounds<P> = self.context.bounds();
        let border = bounds.size() / 50.0;
        let temperature = self.temperature;
        let (attraction, repulsion) = (self.attraction_constant, self.repulsion_constant);
        let rng = &mut self.rng;

        let committed = self.context.step_with(|frame| {
            let disp = displacements(frame, attraction, repulsion);
            for (i, d) in disp.into_iter().enumerate() {
                if frame.locked[i] {
                    continue;
                }
                let moved = frame.positions[i] + d.clamp_length(temperature);
                frame.positions[i] = P::from_fn(|a| {
                    bounce(
                        moved.axis(a),
                        bounds.min.axis(a),
                        bounds.max.axis(a),
                        border.axis(a),
                        rng,
                    )
                });
            }
        });
        if !committed {
            return;
        }

        self.iteration += 1;
        self.cool();
        trace!(
            "FR iteration {} done, temperature {}",
            self.iteration,
            self.temperature
        );
    }

    fn done(&self) -> bool {
        self.iteration > self.config.max_iterations
            || self.temperature < 1.0 / self.max_dimension
    }

    fn iteration(&self) -> usize {
        self.iteration
    }
}

/// Builder for [`FrLayout`].
pub struct FrLayoutBuilder<T, P> {
    config: FrConfig,
    marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Default for FrLayoutBuilder<T, P> {
    fn default() -> Self {
        Self {
            config: FrConfig::default(),
            marker: PhantomData,
        }
    }
}

impl<T: Topology, P: Point> FrLayoutBuilder<T, P> {
    /// Scales the ideal edge length used by the attracting force.
    ///
    /// Default: `0.75`
    pub fn attraction_multiplier(mut self, multiplier: f32) -> Self {
        self.config.attraction_multiplier = multiplier;
        self
    }

    /// Scales the ideal distance used by the repelling force.
    ///
    /// Default: `0.75`
    pub fn repulsion_multiplier(mut self, multiplier: f32) -> Self {
        self.config.repulsion_multiplier = multiplier;
        self
    }

    /// Default: `700`
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Fix the random jitter at the border for reproducible layouts.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn config(mut self, config: FrConfig) -> Self {
        self.config = config;
        self
    }

    /// Constructs an initialized [`FrLayout`].
    ///
    /// Fails if a multiplier is not a positive finite number or `max_iterations` is 0.
    pub fn build(
        self,
        topology: T,
        positions: Positions<T::Node, P>,
    ) -> Result<FrLayout<T, P>> {
        FrLayout::with_config(topology, positions, self.config)
    }
}
