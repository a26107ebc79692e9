use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use grapher_layout::prelude::*;
use petgraph::{Graph, Undirected};
use rand::rngs::StdRng;
use rand::SeedableRng;

type BenchGraph = Graph<(), (), Undirected>;

fn build_graph(nodes: usize) -> BenchGraph {
    let mut rng = StdRng::seed_from_u64(42);
    petgraph_gen::barabasi_albert_graph(&mut rng, nodes, 1, None)
}

fn region() -> Bounds<Vec2> {
    Bounds::centered(Vec2::new(1600.0, 1200.0))
}

fn bench_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_step");
    for nodes in [100, 500] {
        let graph = build_graph(nodes);

        group.bench_with_input(BenchmarkId::new("fr", nodes), &graph, |b, g| {
            let mut layout = FrLayout::builder()
                .max_iterations(usize::MAX)
                .seed(1)
                .build(g.clone(), Positions::with_seed(region(), 1))
                .unwrap();
            b.iter(|| layout.step());
        });

        group.bench_with_input(BenchmarkId::new("spring", nodes), &graph, |b, g| {
            let mut layout = SpringLayout::builder()
                .build(g.clone(), Positions::with_seed(region(), 1))
                .unwrap();
            b.iter(|| layout.step());
        });

        group.bench_with_input(BenchmarkId::new("isom", nodes), &graph, |b, g| {
            let mut layout = IsomLayout::builder()
                .max_epoch(usize::MAX)
                .seed(1)
                .build(g.clone(), Positions::with_seed(region(), 1))
                .unwrap();
            b.iter(|| layout.step());
        });
    }

    // Distance matrix setup dominates for larger graphs.
    let graph = build_graph(100);
    group.bench_function("kk/100", |b| {
        let mut layout = KkLayout::builder()
            .max_iterations(usize::MAX)
            .build(graph.clone(), Positions::with_seed(region(), 1))
            .unwrap();
        b.iter(|| layout.step());
    });
    group.finish();
}

fn bench_pickers(c: &mut Criterion) {
    let mut group = c.benchmark_group("picker");
    let graph = build_graph(2000);
    let positions = Positions::with_seed(region(), 7);

    group.bench_function("recalculate/quadtree", |b| {
        let mut picker = NodePicker::new(graph.clone(), positions.clone());
        b.iter(|| picker.recalculate());
    });
    group.bench_function("recalculate/rtree", |b| {
        let mut picker = NodePicker::with_index(graph.clone(), positions.clone(), RTree::new());
        b.iter(|| picker.recalculate());
    });
    group.bench_function("recalculate/grid", |b| {
        let mut picker =
            NodePicker::with_index(graph.clone(), positions.clone(), Grid::new(region()));
        b.iter(|| picker.recalculate());
    });

    let mut picker = NodePicker::new(graph.clone(), positions.clone());
    picker.recalculate();
    group.bench_function("closest_node/quadtree", |b| {
        b.iter(|| picker.closest_node(black_box(Vec2::new(120.0, -80.0))));
    });

    let mut edges = EdgePicker::new(graph.clone(), positions.clone());
    edges.recalculate();
    group.bench_function("closest_edge/rtree", |b| {
        b.iter(|| edges.closest_edge(black_box(Vec2::new(120.0, -80.0))));
    });
    group.finish();
}

criterion_group!(benches, bench_steps, bench_pickers);
criterion_main!(benches);
