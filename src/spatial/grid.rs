//! Uniform grid: every axis of the region is cut into a fixed number of slices (H×V in
//! 2D) and every cell keeps the elements overlapping it.

use super::{covering, hits, SpatialIndex};
use crate::error::{Error, Result};
use crate::geometry::{Bounds, Point, Shape};
use crate::topology::ElementId;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Cell coordinates. Unused axes stay 0.
pub type CellKey = [usize; 3];

/// Fixed partition with constant-time cell lookup.
#[derive(Debug, Clone)]
pub struct Grid<E, P> {
    bounds: Bounds<P>,
    /// Slices per axis. Unused axes stay 1.
    divisions: [usize; 3],
    cells: HashMap<CellKey, Vec<E>>,
    entries: HashMap<E, Bounds<P>>,
}

impl<E: ElementId, P: Point> Grid<E, P> {
    /// Grid with 10 divisions per axis.
    pub fn new(bounds: Bounds<P>) -> Self {
        Self {
            bounds,
            divisions: [10; 3],
            cells: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// The same number of slices on every axis.
    pub fn with_divisions(bounds: Bounds<P>, divisions: usize) -> Result<Self> {
        Self::with_axis_divisions(bounds, &vec![divisions; P::DIMS])
    }

    /// One slice count per axis, e.g. `&[horizontal, vertical]` in 2D.
    pub fn with_axis_divisions(bounds: Bounds<P>, divisions: &[usize]) -> Result<Self> {
        if divisions.len() != P::DIMS {
            return Err(Error::invalid(
                "divisions",
                divisions.len() as f64,
                "needs one count per axis",
            ));
        }
        let mut per_axis = [1; 3];
        for (slot, &count) in per_axis.iter_mut().zip(divisions) {
            if count == 0 {
                return Err(Error::invalid("divisions", 0.0, "must be at least 1"));
            }
            *slot = count;
        }
        Ok(Self {
            divisions: per_axis,
            ..Self::new(bounds)
        })
    }

    /// Slices per axis.
    pub fn divisions(&self) -> &[usize] {
        &self.divisions[..P::DIMS]
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cell containing `p`. Points outside the bounds map to the nearest border cell.
    pub fn cell_of(&self, p: P) -> CellKey {
        let mut key = [0; 3];
        for (a, slot) in key.iter_mut().enumerate().take(P::DIMS) {
            let (lo, hi) = (self.bounds.min.axis(a), self.bounds.max.axis(a));
            if hi > lo {
                let slices = self.divisions[a];
                let t = (p.axis(a) - lo) / (hi - lo) * slices as f32;
                *slot = (t.max(0.0) as usize).min(slices - 1);
            }
        }
        key
    }

    /// Elements registered in a single cell.
    pub fn cell(&self, key: CellKey) -> &[E] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn for_each_cell(&self, shape: &Bounds<P>, mut f: impl FnMut(CellKey)) {
        let lo = self.cell_of(shape.min);
        let hi = self.cell_of(shape.max);
        for x in lo[0]..=hi[0] {
            for y in lo[1]..=hi[1] {
                for z in lo[2]..=hi[2] {
                    f([x, y, z]);
                }
            }
        }
    }

    fn link(&mut self, element: E, shape: &Bounds<P>) {
        let mut keys = Vec::new();
        self.for_each_cell(shape, |key| keys.push(key));
        for key in keys {
            self.cells.entry(key).or_default().push(element);
        }
    }

    fn unlink(&mut self, element: E, shape: &Bounds<P>) {
        let mut keys = Vec::new();
        self.for_each_cell(shape, |key| keys.push(key));
        for key in keys {
            if let Some(cell) = self.cells.get_mut(&key) {
                cell.retain(|&e| e != element);
                if cell.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
    }

    fn rebuild(&mut self) {
        let entries: Vec<(E, Bounds<P>)> = self.entries.drain().collect();
        self.recalculate(&entries);
    }
}

impl<E: ElementId, P: Point> SpatialIndex<E, P> for Grid<E, P> {
    fn bounds(&self) -> Bounds<P> {
        self.bounds
    }

    fn set_bounds(&mut self, bounds: Bounds<P>) {
        self.bounds = bounds;
        self.rebuild();
    }

    fn recalculate(&mut self, entries: &[(E, Bounds<P>)]) {
        self.bounds = covering(self.bounds, entries);
        self.cells.clear();
        self.entries.clear();
        for &(element, shape) in entries {
            self.link(element, &shape);
            self.entries.insert(element, shape);
        }
    }

    fn update(&mut self, element: E, shape: Bounds<P>) {
        if !self.bounds.contains_bounds(&shape) {
            debug!("Grid grows to fit {element:?}, rebuilding");
            self.entries.insert(element, shape);
            self.bounds = self.bounds.union(&shape);
            self.rebuild();
            return;
        }
        if let Some(old) = self.entries.insert(element, shape) {
            let unchanged = self.cell_of(old.min) == self.cell_of(shape.min)
                && self.cell_of(old.max) == self.cell_of(shape.max);
            if unchanged {
                return;
            }
            self.unlink(element, &old);
        }
        self.link(element, &shape);
    }

    fn remove(&mut self, element: E) -> bool {
        match self.entries.remove(&element) {
            Some(old) => {
                self.unlink(element, &old);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, element: E) -> Option<Bounds<P>> {
        self.entries.get(&element).copied()
    }

    fn entries(&self) -> Vec<(E, Bounds<P>)> {
        self.entries.iter().map(|(&e, &b)| (e, b)).collect()
    }

    fn visible_elements(&self, shape: &dyn Shape<P>) -> Vec<E> {
        let window = shape.bounds();
        if !window.intersects(&self.bounds) {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        self.for_each_cell(&window, |key| {
            for &element in self.cell(key) {
                let inside = self.entries.get(&element).is_some_and(|b| hits(shape, b));
                if seen.insert(element) && inside {
                    found.push(element);
                }
            }
        });
        found
    }
}
