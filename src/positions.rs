//! The position store: where every node currently is.
//!
//! [`Positions`] is a cheap, cloneable handle. The layout writes through it while it
//! steps; renderers, pickers and callers read through their own clones.

use crate::error::{Error, Result};
use crate::geometry::{Bounds, Point};
use crate::topology::ElementId;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Produces the first position of a node that has none yet.
pub enum Initializer<N, P> {
    /// Uniformly random inside the current bounds.
    Random,
    /// The center of the current bounds.
    Center,
    /// Whatever position another store has for the node, e.g. the previous layout's.
    From(Positions<N, P>),
    /// Arbitrary function of the node and the current bounds.
    ///
    /// The function must not read the store it is installed in.
    Custom(Arc<dyn Fn(N, &Bounds<P>) -> P + Send + Sync>),
}

impl<N, P> Clone for Initializer<N, P> {
    fn clone(&self) -> Self {
        match self {
            Self::Random => Self::Random,
            Self::Center => Self::Center,
            Self::From(other) => Self::From(other.clone()),
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<N, P> fmt::Debug for Initializer<N, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("Random"),
            Self::Center => f.write_str("Center"),
            Self::From(_) => f.write_str("From(..)"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

struct Table<N, P> {
    bounds: Bounds<P>,
    locations: HashMap<N, P>,
    locked: HashSet<N>,
    initializer: Initializer<N, P>,
    rng: StdRng,
}

impl<N: ElementId, P: Point> Table<N, P> {
    fn get_or_init(&mut self, node: N) -> P {
        if let Some(&p) = self.locations.get(&node) {
            return p;
        }
        let p = match &self.initializer {
            Initializer::Random => self.bounds.random_point(&mut self.rng),
            Initializer::Center => self.bounds.center(),
            Initializer::From(other) => other.get(node),
            Initializer::Custom(f) => f(node, &self.bounds),
        };
        self.locations.insert(node, p);
        p
    }
}

/// Shared node → position map with lazy initialization and per-node locks.
pub struct Positions<N, P> {
    table: Arc<RwLock<Table<N, P>>>,
}

impl<N, P> Clone for Positions<N, P> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<N, P> fmt::Debug for Positions<N, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Positions").finish_non_exhaustive()
    }
}

impl<N: ElementId, P: Point> Positions<N, P> {
    /// Empty store over `bounds` with an entropy-seeded random initializer.
    pub fn new(bounds: Bounds<P>) -> Self {
        Self::with_rng(bounds, StdRng::from_entropy())
    }

    /// Empty store whose random placements are reproducible.
    pub fn with_seed(bounds: Bounds<P>, seed: u64) -> Self {
        Self::with_rng(bounds, StdRng::seed_from_u64(seed))
    }

    fn with_rng(bounds: Bounds<P>, rng: StdRng) -> Self {
        Self {
            table: Arc::new(RwLock::new(Table {
                bounds,
                locations: HashMap::new(),
                locked: HashSet::new(),
                initializer: Initializer::Random,
                rng,
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Table<N, P>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table<N, P>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point to the same store.
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }

    pub fn bounds(&self) -> Bounds<P> {
        self.read().bounds
    }

    /// Current position of `node`, created by the initializer on first access.
    pub fn get(&self, node: N) -> P {
        if let Some(&p) = self.read().locations.get(&node) {
            return p;
        }
        self.write().get_or_init(node)
    }

    /// Current position of `node` without creating one.
    pub fn peek(&self, node: N) -> Option<P> {
        self.read().locations.get(&node).copied()
    }

    pub fn set(&self, node: N, position: P) {
        self.write().locations.insert(node, position);
    }

    /// Forget the node's position and lock.
    pub fn remove(&self, node: N) -> Option<P> {
        let mut table = self.write();
        table.locked.remove(&node);
        table.locations.remove(&node)
    }

    /// Drop every node for which `keep` returns false.
    pub fn retain(&self, mut keep: impl FnMut(&N) -> bool) {
        let mut table = self.write();
        table.locations.retain(|n, _| keep(n));
        let Table {
            locations, locked, ..
        } = &mut *table;
        locked.retain(|n| locations.contains_key(n));
    }

    pub fn contains(&self, node: N) -> bool {
        self.read().locations.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.read().locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().locations.is_empty()
    }

    /// Exclude (`true`) or readmit (`false`) a node from layout movement.
    pub fn lock(&self, node: N, locked: bool) {
        let mut table = self.write();
        if locked {
            table.locked.insert(node);
        } else {
            table.locked.remove(&node);
        }
    }

    pub fn lock_all(&self, nodes: impl IntoIterator<Item = N>, locked: bool) {
        let mut table = self.write();
        for node in nodes {
            if locked {
                table.locked.insert(node);
            } else {
                table.locked.remove(&node);
            }
        }
    }

    pub fn is_locked(&self, node: N) -> bool {
        self.read().locked.contains(&node)
    }

    /// Replace the generator for missing positions.
    ///
    /// Fails with [`Error::SelfInitializer`] if `initializer` would end up reading this
    /// very store, directly or through a chain of other stores.
    pub fn set_initializer(&self, initializer: Initializer<N, P>) -> Result<()> {
        if let Initializer::From(source) = &initializer {
            if source.reads_from(self) {
                return Err(Error::SelfInitializer);
            }
        }
        self.write().initializer = initializer;
        Ok(())
    }

    fn reads_from(&self, target: &Self) -> bool {
        let mut current = self.clone();
        // A cycle that does not include `target` is impossible: every link was checked
        // when it was installed.
        loop {
            if current.same_store(target) {
                return true;
            }
            let next = match &current.read().initializer {
                Initializer::From(next) => next.clone(),
                _ => return false,
            };
            current = next;
        }
    }

    /// Move to a new region.
    ///
    /// Existing positions are shifted by the difference of the two centers so a finished
    /// layout is re-centered rather than discarded; nodes placed from now on are seeded
    /// inside the new region.
    pub fn resize(&self, bounds: Bounds<P>) {
        let mut table = self.write();
        let delta = bounds.center() - table.bounds.center();
        debug!(
            "Resizing position store from {:?} to {:?}, offset {:?}",
            table.bounds, bounds, delta
        );
        table.bounds = bounds;
        if delta != P::ZERO {
            for p in table.locations.values_mut() {
                *p += delta;
            }
        }
    }

    /// Shift every stored position, locked ones included.
    pub fn offset_all(&self, delta: P) {
        for p in self.write().locations.values_mut() {
            *p += delta;
        }
    }

    /// Positions and lock flags for `nodes`, creating missing positions.
    pub fn fetch(&self, nodes: &[N]) -> (Vec<P>, Vec<bool>) {
        let mut table = self.write();
        let positions = nodes.iter().map(|&n| table.get_or_init(n)).collect();
        let locked = nodes.iter().map(|n| table.locked.contains(n)).collect();
        (positions, locked)
    }

    /// Write back a batch of positions computed by a layout step.
    ///
    /// Locked nodes and non-finite coordinates are skipped. Returns how many positions
    /// were written.
    pub fn commit(&self, nodes: &[N], positions: &[P]) -> usize {
        let mut table = self.write();
        let mut written = 0;
        for (&node, &p) in nodes.iter().zip(positions) {
            if table.locked.contains(&node) {
                continue;
            }
            if !p.is_finite() {
                warn!("Discarding non-finite position {p:?} for node {node:?}");
                continue;
            }
            table.locations.insert(node, p);
            written += 1;
        }
        written
    }

    /// Copy of the whole map.
    pub fn snapshot_map(&self) -> HashMap<N, P> {
        self.read().locations.clone()
    }
}
