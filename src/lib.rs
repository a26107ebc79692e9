//! Iterative graph layouts (Fruchterman-Reingold, Kamada-Kawai, ISOM, spring embedder)
//! and spatial indexes (grid, quad-tree, R-tree) for picking nodes and edges by position.
//!
//! Layouts read any [`Topology`](topology::Topology) (petgraph graphs out of the box) and
//! write to a shared [`Positions`](positions::Positions) store, in 2D with [`glam::Vec2`]
//! or 3D with [`glam::Vec3`].
//!
//! # Example
//! ```no_run
//!use glam::Vec2;
//!use grapher_layout::prelude::*;
//!use petgraph::Undirected;
//!
//!let mut rng = rand::thread_rng();
//!let graph: petgraph::Graph<(), (), Undirected> =
//!    petgraph_gen::barabasi_albert_graph(&mut rng, 200, 1, None);
//!
//!let positions = Positions::new(Bounds::centered(Vec2::new(800.0, 600.0)));
//!let mut layout = FrLayout::builder()
//!    .max_iterations(300)
//!    .build(graph.clone(), positions.clone())
//!    .unwrap();
//!layout.relax(usize::MAX);
//!
//!let mut picker = NodePicker::new(graph, positions);
//!picker.recalculate();
//!let hit = picker.closest_node(Vec2::new(10.0, 20.0));
//! ```

pub mod animator;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod positions;
pub mod spatial;
pub mod topology;

pub mod prelude {
    pub use crate::animator::Animator;
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{Ball, Bounds, Point, Polygon, Segment, Shape};
    pub use crate::layout::{FrLayout, IsomLayout, IterativeLayout, KkLayout, SpringLayout};
    pub use crate::positions::{Initializer, Positions};
    pub use crate::spatial::{EdgePicker, Grid, NodePicker, QuadTree, RTree, SpatialIndex};
    pub use crate::topology::{SharedGraph, Topology};
}
