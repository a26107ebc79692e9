//! Graph-theoretic distances for Kamada-Kawai.

use super::{ElementId, Snapshot};
use rayon::prelude::*;
use std::collections::VecDeque;

/// Source of shortest-path lengths between snapshot nodes.
pub trait ShortestPaths: Send + Sync {
    /// Distance from `source` to every node, `None` where no path exists.
    fn distances_from<N: ElementId, E: ElementId>(
        &self,
        snapshot: &Snapshot<N, E>,
        source: usize,
    ) -> Vec<Option<f32>>;
}

/// Hop count along edges, found by breadth-first search.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unweighted;

impl ShortestPaths for Unweighted {
    fn distances_from<N: ElementId, E: ElementId>(
        &self,
        snapshot: &Snapshot<N, E>,
        source: usize,
    ) -> Vec<Option<f32>> {
        let mut dist = vec![None; snapshot.len()];
        let mut queue = VecDeque::new();
        dist[source] = Some(0.0);
        queue.push_back(source);
        while let Some(current) = queue.pop_front() {
            let next = dist[current].unwrap_or(0.0) + 1.0;
            for &neighbor in snapshot.neighbors(current) {
                if dist[neighbor].is_none() {
                    dist[neighbor] = Some(next);
                    queue.push_back(neighbor);
                }
            }
        }
        dist
    }
}

/// All-pairs distances in snapshot index order.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    size: usize,
    cells: Vec<Option<f32>>,
}

impl DistanceMatrix {
    /// Run `paths` from every node; sources are processed in parallel.
    pub fn compute<N, E, D>(snapshot: &Snapshot<N, E>, paths: &D) -> Self
    where
        N: ElementId,
        E: ElementId,
        D: ShortestPaths,
    {
        let size = snapshot.len();
        let rows: Vec<Vec<Option<f32>>> = (0..size)
            .into_par_iter()
            .map(|source| paths.distances_from(snapshot, source))
            .collect();
        Self {
            size,
            cells: rows.into_iter().flatten().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        self.cells[i * self.size + j]
    }

    /// Longest finite distance between two distinct nodes, 0 when there is none.
    pub fn diameter(&self) -> f32 {
        let mut diameter = 0.0_f32;
        for i in 0..self.size {
            for j in 0..self.size {
                if i != j {
                    if let Some(d) = self.get(i, j) {
                        diameter = diameter.max(d);
                    }
                }
            }
        }
        diameter
    }

    /// Replace every missing distance with `substitute`.
    ///
    /// The smaller of the two directions is used when they differ.
    pub fn fill_disconnected(&self, substitute: f32) -> Vec<f32> {
        let n = self.size;
        let mut filled = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = match (self.get(i, j), self.get(j, i)) {
                    (Some(a), Some(b)) => a.min(b),
                    (Some(a), None) | (None, Some(a)) => a,
                    (None, None) => substitute,
                };
                filled[i * n + j] = d;
                filled[j * n + i] = d;
            }
        }
        filled
    }
}
