use glam::Vec2;
use grapher_layout::prelude::*;
use grapher_layout::spatial::RStarSplitter;
use petgraph::graph::{NodeIndex, UnGraph};
use std::thread;
use std::time::Duration;

fn region() -> Bounds<Vec2> {
    Bounds::centered(Vec2::splat(400.0))
}

/// Two triangles joined by a bridge, plus a pendant node.
fn sample_graph() -> UnGraph<(), ()> {
    UnGraph::from_edges([(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 5), (5, 3), (5, 6)])
}

fn all_nodes(g: &UnGraph<(), ()>) -> Vec<NodeIndex> {
    g.node_indices().collect()
}

fn layouts(
    g: &UnGraph<(), ()>,
    positions: &Positions<NodeIndex, Vec2>,
) -> Vec<Box<dyn IterativeLayout<Node = NodeIndex, Point = Vec2>>> {
    vec![
        Box::new(
            FrLayout::builder()
                .max_iterations(200)
                .seed(1)
                .build(g.clone(), positions.clone())
                .unwrap(),
        ),
        Box::new(
            KkLayout::builder()
                .max_iterations(100)
                .build(g.clone(), positions.clone())
                .unwrap(),
        ),
        Box::new(
            IsomLayout::builder()
                .max_epoch(300)
                .seed(1)
                .build(g.clone(), positions.clone())
                .unwrap(),
        ),
        Box::new(
            SpringLayout::builder()
                .max_iterations(200)
                .build(g.clone(), positions.clone())
                .unwrap(),
        ),
    ]
}

#[test]
fn every_layout_finishes_within_its_bound() {
    let g = sample_graph();
    let bounds = [201, 101, 299, 200];
    for (mut layout, bound) in layouts(&g, &Positions::with_seed(region(), 3))
        .into_iter()
        .zip(bounds)
    {
        let steps = layout.relax(100_000);
        assert!(steps <= bound, "{steps} steps");
        assert!(layout.done());
        assert_eq!(layout.relax(10), 0);
    }
}

#[test]
fn locked_nodes_never_move() {
    let g = sample_graph();
    for seed in 0..4 {
        let positions = Positions::with_seed(region(), seed);
        let pinned = [NodeIndex::new(0), NodeIndex::new(4)];
        let before: Vec<Vec2> = pinned.iter().map(|&n| positions.get(n)).collect();
        for layout in layouts(&g, &positions) {
            for &n in &pinned {
                layout.lock(n, true);
            }
            let mut layout = layout;
            layout.relax(150);
            let after: Vec<Vec2> = pinned.iter().map(|&n| positions.get(n)).collect();
            assert_eq!(before, after);
        }
    }
}

#[test]
fn lock_all_freezes_the_layout() {
    let g = sample_graph();
    let positions = Positions::with_seed(region(), 9);
    let before = positions.fetch(&all_nodes(&g)).0;
    for mut layout in layouts(&g, &positions) {
        layout.lock_all(true);
        layout.relax(20);
    }
    assert_eq!(positions.fetch(&all_nodes(&g)).0, before);
}

fn assert_inside_after_every_step<L>(mut layout: L, nodes: &[NodeIndex], region: Bounds<Vec2>, steps: usize)
where
    L: IterativeLayout<Node = NodeIndex, Point = Vec2>,
{
    for step in 0..steps {
        if layout.done() {
            break;
        }
        layout.step();
        for &n in nodes {
            let p = layout.positions().get(n);
            assert!(region.contains(p), "{n:?} at {p} after step {step}");
        }
    }
}

#[test]
fn force_layouts_stay_in_their_region() {
    let g = sample_graph();
    let nodes = all_nodes(&g);
    let fr = FrLayout::builder()
        .seed(3)
        .build(g.clone(), Positions::with_seed(region(), 5))
        .unwrap();
    assert_inside_after_every_step(fr, &nodes, region(), 1000);

    let spring = SpringLayout::builder()
        .edge_length(500.0)
        .build(g.clone(), Positions::with_seed(region(), 5))
        .unwrap();
    assert_inside_after_every_step(spring, &nodes, region(), 400);
}

#[test]
fn narrow_regions_hold_on_their_short_axis() {
    let strip = Bounds::centered(Vec2::new(1000.0, 40.0));
    let g = UnGraph::<(), ()>::from_edges([(0, 1), (1, 2)]);
    let nodes = all_nodes(&g);
    for seed in 0..3 {
        let fr = FrLayout::builder()
            .max_iterations(300)
            .seed(seed)
            .build(g.clone(), Positions::with_seed(strip, seed))
            .unwrap();
        assert_inside_after_every_step(fr, &nodes, strip, 300);

        let spring = SpringLayout::builder()
            .build(g.clone(), Positions::with_seed(strip, seed))
            .unwrap();
        assert_inside_after_every_step(spring, &nodes, strip, 300);
    }
}

#[test]
fn two_nodes_in_a_small_square() {
    let square = Bounds::new(Vec2::splat(-50.0), Vec2::splat(50.0));
    let g = UnGraph::<(), ()>::from_edges([(0, 1)]);
    let positions = Positions::with_seed(square, 1);
    let (a, b) = (NodeIndex::new(0), NodeIndex::new(1));
    positions.set(a, Vec2::new(-1.0, 0.0));
    positions.set(b, Vec2::new(1.0, 0.0));

    let mut layout = FrLayout::builder().seed(7).build(g, positions.clone()).unwrap();
    layout.relax(usize::MAX);
    let (pa, pb) = (positions.get(a), positions.get(b));
    assert!(square.contains(pa) && square.contains(pb));
    // Repulsion pushed the pair apart from their initial distance of 2.
    assert!(pa.distance(pb) > 10.0);
}

#[test]
fn self_loops_do_not_change_the_layout() {
    let plain = sample_graph();
    let mut looped = sample_graph();
    looped.add_edge(NodeIndex::new(3), NodeIndex::new(3), ());

    let run = |g: UnGraph<(), ()>| {
        let positions = Positions::with_seed(region(), 21);
        let nodes = all_nodes(&g);
        let mut layout = FrLayout::builder().seed(4).build(g, positions.clone()).unwrap();
        layout.relax(100);
        positions.fetch(&nodes).0
    };
    assert_eq!(run(plain), run(looped));
}

#[test]
fn disconnected_pairs_sit_at_half_the_diameter() {
    // Path of length 3 plus a separate edge.
    let g = UnGraph::<(), ()>::from_edges([(0, 1), (1, 2), (2, 3), (4, 5)]);
    let layout = KkLayout::builder()
        .build(g, Positions::with_seed(region(), 1))
        .unwrap();
    assert_eq!(layout.diameter(), 3.0);
    assert_eq!(layout.graph_distance(NodeIndex::new(0), NodeIndex::new(5)), Some(1.5));
    assert_eq!(layout.graph_distance(NodeIndex::new(0), NodeIndex::new(3)), Some(3.0));
}

fn round_trip<S: SpatialIndex<NodeIndex, Vec2>>(index: S) {
    let g = UnGraph::<(), ()>::from_edges((0..60).map(|i| (i, (i * 7 + 3) % 60)));
    let positions = Positions::with_seed(region(), 12);
    let mut picker = NodePicker::with_index(g.clone(), positions.clone(), index);
    picker.recalculate();
    let mut everything = picker.visible_nodes(&region());
    everything.sort();
    assert_eq!(everything, all_nodes(&g));
}

#[test]
fn spatial_round_trip() {
    round_trip(Grid::new(region()));
    round_trip(QuadTree::new(region()));
    round_trip(RTree::new());
    round_trip(RTree::with_splitter(RStarSplitter));
}

fn sorted(mut nodes: Vec<NodeIndex>) -> Vec<NodeIndex> {
    nodes.sort();
    nodes
}

#[test]
fn incremental_updates_match_a_full_rebuild() {
    let g = sample_graph();
    let positions = Positions::with_seed(region(), 30);
    let mut incremental = NodePicker::new(g.clone(), positions.clone());
    incremental.recalculate();

    let mut layout = SpringLayout::builder()
        .build(g.clone(), positions.clone())
        .unwrap();
    layout.relax(40);
    for n in all_nodes(&g) {
        incremental.update(n);
    }

    let mut rebuilt = NodePicker::new(g.clone(), positions.clone());
    rebuilt.recalculate();
    let windows = [
        Bounds::new(Vec2::new(-200.0, -200.0), Vec2::ZERO),
        Bounds::new(Vec2::ZERO, Vec2::splat(200.0)),
        Bounds::new(Vec2::new(-50.0, -150.0), Vec2::new(150.0, 50.0)),
    ];
    for window in windows {
        assert_eq!(
            sorted(incremental.visible_nodes(&window)),
            sorted(rebuilt.visible_nodes(&window))
        );
    }
    for p in [Vec2::ZERO, Vec2::new(-120.0, 80.0), Vec2::new(190.0, -190.0)] {
        assert_eq!(incremental.closest_node(p), rebuilt.closest_node(p));
    }
}

#[test]
fn clustered_nodes_split_the_quad_tree() {
    let g = UnGraph::<(), ()>::from_edges([(0, 1), (1, 2), (2, 3), (3, 4)]);
    let positions = Positions::with_seed(region(), 1);
    for (i, offset) in [0.0, 0.5, 1.0, 1.5, 2.0].into_iter().enumerate() {
        positions.set(NodeIndex::new(i), Vec2::new(100.0 + offset, 100.0 - offset));
    }
    let mut picker = NodePicker::new(g, positions);
    picker.recalculate();
    let leaves = picker.index().leaves();
    assert!(leaves.iter().all(|leaf| leaf.len <= 1 || leaf.level == 12));
    assert_eq!(leaves.iter().map(|leaf| leaf.len).sum::<usize>(), 5);
    assert!(picker.index().depth() > 3);
}

#[test]
fn graph_edits_while_animating() {
    let graph = SharedGraph::new(sample_graph());
    let positions = Positions::with_seed(region(), 8);
    let layout = FrLayout::builder()
        .max_iterations(400)
        .seed(2)
        .build(graph.clone(), positions.clone())
        .unwrap();
    let animator = Animator::builder()
        .interval(Duration::from_micros(200))
        .start(layout);

    for _ in 0..20 {
        graph.mutate(|g| {
            let n = g.add_node(());
            g.add_edge(n, NodeIndex::new(0), ());
        });
        thread::sleep(Duration::from_micros(300));
    }
    let layout = animator.join().unwrap();
    assert!(layout.done());

    let nodes = graph.read(|g| g.node_indices().collect::<Vec<_>>());
    assert_eq!(nodes.len(), 27);
    for n in nodes {
        let p = positions.get(n);
        assert!(p.is_finite());
        assert!(region().contains(p));
    }
}
