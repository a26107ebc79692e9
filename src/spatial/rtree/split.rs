//! Strategies for dividing an overflowing R-tree node in two.

use crate::geometry::{Bounds, Point};
use std::cmp::Ordering;

/// Divides the boxes of an overflowing node into two groups of at least `min` entries.
pub trait Splitter: Send + Sync {
    /// Returns the indices into `boxes` that make up each group.
    fn split<P: Point>(&self, boxes: &[Bounds<P>], min: usize) -> (Vec<usize>, Vec<usize>);
}

/// Guttman's quadratic split.
///
/// Seeds are the pair wasting the most space when grouped, the remaining boxes join
/// the group they enlarge least, strongest preference first.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticSplitter;

/// R*-tree split: the axis with the smallest margin sum, then the distribution with
/// the least overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct RStarSplitter;

/// Extent first, margin to break ties between flat boxes.
type Cost = (f32, f32);

fn compare(a: Cost, b: Cost) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

fn growth<P: Point>(group: &Bounds<P>, b: &Bounds<P>) -> Cost {
    let grown = group.union(b);
    (grown.extent() - group.extent(), grown.margin() - group.margin())
}

/// How strongly a box favours one group over the other.
fn preference(to_first: Cost, to_second: Cost) -> Cost {
    (
        (to_first.0 - to_second.0).abs(),
        (to_first.1 - to_second.1).abs(),
    )
}

impl Splitter for QuadraticSplitter {
    fn split<P: Point>(&self, boxes: &[Bounds<P>], min: usize) -> (Vec<usize>, Vec<usize>) {
        let n = boxes.len();
        let min = min.clamp(1, (n / 2).max(1));

        let mut seeds = (0, 1.min(n - 1));
        let mut worst: Option<Cost> = None;
        for i in 0..n {
            for j in i + 1..n {
                let joined = boxes[i].union(&boxes[j]);
                let waste = (
                    joined.extent() - boxes[i].extent() - boxes[j].extent(),
                    joined.margin() - boxes[i].margin() - boxes[j].margin(),
                );
                if worst.map_or(true, |w| compare(waste, w).is_gt()) {
                    worst = Some(waste);
                    seeds = (i, j);
                }
            }
        }

        let mut groups = [vec![seeds.0], vec![seeds.1]];
        let mut cover = [boxes[seeds.0], boxes[seeds.1]];
        let mut rest: Vec<usize> = (0..n).filter(|&i| i != seeds.0 && i != seeds.1).collect();

        while !rest.is_empty() {
            if let Some(g) = (0..2).find(|&g| groups[g].len() + rest.len() <= min) {
                groups[g].append(&mut rest);
                break;
            }
            let Some((pos, to_first, to_second)) = rest
                .iter()
                .enumerate()
                .map(|(pos, &i)| (pos, growth(&cover[0], &boxes[i]), growth(&cover[1], &boxes[i])))
                .max_by(|a, b| compare(preference(a.1, a.2), preference(b.1, b.2)))
            else {
                break;
            };
            let i = rest.swap_remove(pos);
            let target = match compare(to_first, to_second) {
                Ordering::Less => 0,
                Ordering::Greater => 1,
                Ordering::Equal => {
                    let by_size = compare(
                        (cover[0].extent(), cover[0].margin()),
                        (cover[1].extent(), cover[1].margin()),
                    );
                    match by_size.then(groups[0].len().cmp(&groups[1].len())) {
                        Ordering::Greater => 1,
                        _ => 0,
                    }
                }
            };
            groups[target].push(i);
            cover[target] = cover[target].union(&boxes[i]);
        }

        let [first, second] = groups;
        (first, second)
    }
}

/// Every split point `k` of `order` leaving at least `min` boxes on each side, with the
/// cover of both halves.
fn distributions<P: Point>(
    boxes: &[Bounds<P>],
    order: &[usize],
    min: usize,
) -> Vec<(usize, Bounds<P>, Bounds<P>)> {
    let n = order.len();
    let mut prefix = Vec::with_capacity(n);
    let mut acc = boxes[order[0]];
    for &i in order {
        acc = acc.union(&boxes[i]);
        prefix.push(acc);
    }
    let mut suffix = vec![boxes[order[n - 1]]; n];
    let mut acc = boxes[order[n - 1]];
    for k in (0..n).rev() {
        acc = acc.union(&boxes[order[k]]);
        suffix[k] = acc;
    }
    (min..=n - min)
        .map(|k| (k, prefix[k - 1], suffix[k]))
        .collect()
}

impl Splitter for RStarSplitter {
    fn split<P: Point>(&self, boxes: &[Bounds<P>], min: usize) -> (Vec<usize>, Vec<usize>) {
        let n = boxes.len();
        let min = min.clamp(1, (n / 2).max(1));

        let sorted = |axis: usize| -> [Vec<usize>; 2] {
            let mut by_min: Vec<usize> = (0..n).collect();
            by_min.sort_by(|&a, &b| {
                (boxes[a].min.axis(axis), boxes[a].max.axis(axis))
                    .partial_cmp(&(boxes[b].min.axis(axis), boxes[b].max.axis(axis)))
                    .unwrap_or(Ordering::Equal)
            });
            let mut by_max: Vec<usize> = (0..n).collect();
            by_max.sort_by(|&a, &b| {
                (boxes[a].max.axis(axis), boxes[a].min.axis(axis))
                    .partial_cmp(&(boxes[b].max.axis(axis), boxes[b].min.axis(axis)))
                    .unwrap_or(Ordering::Equal)
            });
            [by_min, by_max]
        };

        let mut best_axis: Option<(f32, [Vec<usize>; 2])> = None;
        for axis in 0..P::DIMS {
            let orders = sorted(axis);
            let margin: f32 = orders
                .iter()
                .flat_map(|order| distributions(boxes, order, min))
                .map(|(_, a, b)| a.margin() + b.margin())
                .sum();
            if best_axis.as_ref().map_or(true, |(m, _)| margin < *m) {
                best_axis = Some((margin, orders));
            }
        }
        let Some((_, orders)) = best_axis else {
            return ((0..n / 2).collect(), (n / 2..n).collect());
        };

        let mut best: Option<((f32, f32), &[usize], usize)> = None;
        for order in &orders {
            for (k, a, b) in distributions(boxes, order, min) {
                let cost = (a.overlap(&b), a.extent() + b.extent());
                if best.map_or(true, |(c, _, _)| compare(cost, c).is_lt()) {
                    best = Some((cost, order.as_slice(), k));
                }
            }
        }
        match best {
            Some((_, order, k)) => (order[..k].to_vec(), order[k..].to_vec()),
            None => ((0..n / 2).collect(), (n / 2..n).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn two_clusters() -> Vec<Bounds<Vec2>> {
        let left = (0..4).map(|i| Bounds::point(Vec2::new(i as f32, (i % 2) as f32)));
        let right = (0..5).map(|i| Bounds::point(Vec2::new(100.0 + i as f32, (i % 3) as f32)));
        left.chain(right).collect()
    }

    fn check(splitter: impl Splitter) {
        let boxes = two_clusters();
        let (mut a, mut b) = splitter.split(&boxes, 3);
        a.sort();
        b.sort();
        if a.contains(&0) {
            assert_eq!((a, b), (vec![0, 1, 2, 3], vec![4, 5, 6, 7, 8]));
        } else {
            assert_eq!((b, a), (vec![0, 1, 2, 3], vec![4, 5, 6, 7, 8]));
        }
    }

    #[test]
    fn quadratic_separates_clusters() {
        check(QuadraticSplitter);
    }

    #[test]
    fn rstar_separates_clusters() {
        check(RStarSplitter);
    }

    #[test]
    fn groups_respect_minimum_fill() {
        // One outlier would take a group of its own without the minimum.
        let mut boxes: Vec<Bounds<Vec2>> =
            (0..8).map(|i| Bounds::point(Vec2::new(i as f32 * 0.1, 0.0))).collect();
        boxes.push(Bounds::point(Vec2::new(1000.0, 1000.0)));
        for (a, b) in [QuadraticSplitter.split(&boxes, 3), RStarSplitter.split(&boxes, 3)] {
            assert!(a.len() >= 3 && b.len() >= 3);
            assert_eq!(a.len() + b.len(), boxes.len());
        }
    }
}
