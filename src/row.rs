//! Pad-row cluster store
//!
//! A [`Row`] keeps its clusters in an insertion-ordered arena and a separate
//! view of packed locators sorted by `y`. The sorted view never holds
//! references into the arena, so the arena can grow freely.

use crate::cluster::{Cluster, ClusterId};

/// Clusters of one (sector, pad row) slot
#[derive(Debug, Clone)]
pub struct Row {
    /// Radius of the row in the sector frame
    radius: f64,
    /// Fixed capacity, exceeding it drops the insertion
    capacity: usize,
    /// Clusters in insertion order; `slot` indexes this
    arena: Vec<Cluster>,
    /// Locators ordered by ascending `y`
    sorted: Vec<ClusterId>,
}

impl Row {
    /// Create an empty row at `radius`
    pub fn new(radius: f64, capacity: usize) -> Self {
        Self {
            radius,
            capacity,
            arena: Vec::new(),
            sorted: Vec::new(),
        }
    }

    /// Radius of the row
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of clusters
    #[inline]
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// Whether the row holds no clusters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Insert a cluster keeping the `y` order and return its locator.
    ///
    /// Returns `None` (and logs a warning) when the row is full or the slot
    /// no longer fits the locator; the cluster is dropped in that case.
    pub fn insert(&mut self, cluster: Cluster, sector: usize, row: usize) -> Option<ClusterId> {
        let slot = self.arena.len();
        if slot >= self.capacity {
            log::warn!(
                "Row {} of sector {} (x={:.3}): too many clusters, dropping insertion",
                row,
                sector,
                self.radius
            );
            return None;
        }
        let Some(id) = ClusterId::new(sector, row, slot) else {
            log::warn!(
                "Row {} of sector {}: locator overflow at slot {}, dropping insertion",
                row,
                sector,
                slot
            );
            return None;
        };

        if self.arena.len() == self.arena.capacity() {
            // Double the arena; the sorted view stores slots, not addresses
            let grow = self.arena.capacity().max(1);
            self.arena.reserve_exact(grow);
            self.sorted.reserve_exact(grow);
        }

        let at = self.find(cluster.y);
        self.sorted.insert(at, id);
        self.arena.push(cluster);
        Some(id)
    }

    /// Index of the first cluster with `y_i >= y`.
    ///
    /// Returns `len()` when every cluster lies below `y` and `0` when every
    /// cluster lies at or above it (and for an empty row).
    pub fn find(&self, y: f64) -> usize {
        self.sorted
            .partition_point(|id| self.arena[id.slot()].y < y)
    }

    /// Cluster at a sorted position
    #[inline]
    pub fn get(&self, i: usize) -> Option<&Cluster> {
        self.sorted.get(i).map(|id| &self.arena[id.slot()])
    }

    /// Locator of the cluster at a sorted position
    #[inline]
    pub fn id_at(&self, i: usize) -> Option<ClusterId> {
        self.sorted.get(i).copied()
    }

    /// Cluster by insertion slot
    #[inline]
    pub fn get_by_slot(&self, slot: usize) -> Option<&Cluster> {
        self.arena.get(slot)
    }

    /// Iterate `(locator, cluster)` in ascending `y`
    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &Cluster)> + '_ {
        self.sorted.iter().map(move |&id| (id, &self.arena[id.slot()]))
    }

    /// Mark the cluster at `slot` as claimed. Returns false for an unknown slot.
    pub fn mark_used(&mut self, slot: usize) -> bool {
        match self.arena.get_mut(slot) {
            Some(c) => {
                c.used = true;
                true
            }
            None => false,
        }
    }

    /// Release every claim
    pub fn clear_used(&mut self) {
        for c in &mut self.arena {
            c.used = false;
        }
    }

    /// Drop all clusters, keeping the allocation for the next event
    pub fn reset(&mut self) {
        self.arena.clear();
        self.sorted.clear();
    }
}
