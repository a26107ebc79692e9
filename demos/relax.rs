//! Lays out a random scale-free graph with ISOM, refines it with Kamada-Kawai on a
//! background thread, then picks a few nodes and edges by position.

use glam::Vec2;
use grapher_layout::prelude::*;
use petgraph::{Graph, Undirected};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn build_graph(nodes: usize) -> Graph<(), (), Undirected> {
    let mut rng = StdRng::seed_from_u64(7);
    petgraph_gen::barabasi_albert_graph(&mut rng, nodes, 1, None)
}

fn main() -> Result<()> {
    let region = Bounds::centered(Vec2::new(800.0, 600.0));
    let graph = SharedGraph::new(build_graph(120));

    // Rough placement first.
    let rough = Positions::with_seed(region, 1);
    let mut isom = IsomLayout::builder()
        .max_epoch(1500)
        .seed(1)
        .build(graph.clone(), rough.clone())?;
    let steps = isom.relax(usize::MAX);
    println!("ISOM finished after {steps} epochs");

    // Kamada-Kawai starts from where ISOM left off.
    let positions = Positions::with_seed(region, 2);
    positions.set_initializer(Initializer::From(rough))?;
    let kk = KkLayout::builder()
        .max_iterations(600)
        .build(graph.clone(), positions.clone())?;

    let animator = Animator::builder()
        .interval(Duration::from_millis(1))
        .start(kk);
    while animator.is_running() {
        std::thread::sleep(Duration::from_millis(50));
        println!("KK step {}", animator.steps());
    }
    let kk = animator.join()?;
    println!("KK energy {:.2} after {} steps", kk.energy(), kk.iteration());

    let mut nodes = NodePicker::new(graph.clone(), positions.clone());
    nodes.recalculate();
    let mut edges = EdgePicker::new(graph, positions.clone());
    edges.recalculate();

    for probe in [Vec2::ZERO, Vec2::new(-250.0, 120.0), Vec2::new(300.0, -200.0)] {
        let node = nodes.closest_node(probe);
        let edge = edges.closest_edge(probe);
        println!("closest to {probe}: node {node:?}, edge {edge:?}");
    }

    let window = Bounds::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
    println!(
        "{} nodes and {} edges inside {window:?}",
        nodes.visible_nodes(&window).len(),
        edges.visible_edges(&window).len()
    );
    let lens = Ball::new(Vec2::new(150.0, 0.0), 80.0);
    println!("{} nodes under the lens", nodes.visible_nodes(&lens).len());
    Ok(())
}
