//! Cluster records and packed cluster locators
//!
//! Tracks never hold references into row storage. They hold [`ClusterId`]s,
//! 32-bit handles packing `(sector, row, slot)`, where `slot` is the
//! insertion ordinal of the cluster inside its row.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Truth tag value meaning "no contributing particle"
pub const NO_LABEL: i32 = -1;

/// Packed `(sector, row, slot)` locator of a cluster.
///
/// Layout: `sector << 24 | row << 16 | slot`. Sector numbering is global:
/// inner sectors come first, outer sectors follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(u32);

impl ClusterId {
    /// Largest encodable sector number
    pub const MAX_SECTOR: usize = 0xff;
    /// Largest encodable row number
    pub const MAX_ROW: usize = 0xff;
    /// Largest encodable slot number
    pub const MAX_SLOT: usize = 0xffff;

    /// Pack a locator, `None` if a component does not fit its bit field
    pub fn new(sector: usize, row: usize, slot: usize) -> Option<Self> {
        if sector > Self::MAX_SECTOR || row > Self::MAX_ROW || slot > Self::MAX_SLOT {
            return None;
        }
        Some(Self(((sector as u32) << 24) | ((row as u32) << 16) | slot as u32))
    }

    /// Reinterpret a raw packed value
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw packed value
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Global sector number
    #[inline]
    pub fn sector(self) -> usize {
        ((self.0 & 0xff00_0000) >> 24) as usize
    }

    /// Row number within the sector's section
    #[inline]
    pub fn row(self) -> usize {
        ((self.0 & 0x00ff_0000) >> 16) as usize
    }

    /// Insertion ordinal within the row
    #[inline]
    pub fn slot(self) -> usize {
        (self.0 & 0x0000_ffff) as usize
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.sector(), self.row(), self.slot())
    }
}

/// A reconstructed space point in a pad row.
///
/// Coordinates are in the local frame of the sector the cluster belongs to:
/// `y` runs along the pad row, `z` along the drift direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Position along the pad row
    pub y: f64,
    /// Position along the drift direction
    pub z: f64,
    /// Collected charge
    pub q: f64,
    /// Variance of `y`
    pub sigma_y2: f64,
    /// Variance of `z`
    pub sigma_z2: f64,
    /// Up to three contributing particle labels, [`NO_LABEL`] when unset
    pub labels: [i32; 3],
    /// Claimed by an accepted track
    #[serde(default, skip_serializing)]
    pub used: bool,
}

impl Cluster {
    /// Create an unlabelled cluster
    pub fn new(y: f64, z: f64, q: f64, sigma_y2: f64, sigma_z2: f64) -> Self {
        Self {
            y,
            z,
            q,
            sigma_y2,
            sigma_z2,
            labels: [NO_LABEL; 3],
            used: false,
        }
    }

    /// Attach truth labels
    pub fn with_labels(mut self, labels: [i32; 3]) -> Self {
        self.labels = labels;
        self
    }

    /// Primary truth tag with its sign dropped
    #[inline]
    pub fn primary_label(&self) -> i32 {
        truth_label(self.labels[0])
    }

    /// Whether any of the three truth tags equals `label` (sign ignored)
    pub fn has_label(&self, label: i32) -> bool {
        self.labels.iter().any(|&l| l != NO_LABEL && truth_label(l) == label)
    }
}

/// Drop the sign of a truth tag, leaving [`NO_LABEL`] untouched
#[inline]
pub fn truth_label(label: i32) -> i32 {
    if label == NO_LABEL {
        NO_LABEL
    } else {
        label.saturating_abs()
    }
}

/// Clusters of one readout segment, i.e. one (sector, row) of one detector half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSegment {
    /// Raw segment id (see [`crate::sector::ClusterStore::segment_id`])
    pub id: usize,
    /// Clusters in readout order
    pub clusters: Vec<Cluster>,
}

impl ClusterSegment {
    /// Create a segment
    pub fn new(id: usize, clusters: Vec<Cluster>) -> Self {
        Self { id, clusters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_id_packing() {
        let id = ClusterId::new(35, 95, 3499).unwrap();
        assert_eq!(id.sector(), 35);
        assert_eq!(id.row(), 95);
        assert_eq!(id.slot(), 3499);
        assert_eq!(id.raw(), (35 << 24) | (95 << 16) | 3499);
        assert_eq!(ClusterId::from_raw(id.raw()), id);
    }

    #[test]
    fn test_cluster_id_limits() {
        assert!(ClusterId::new(255, 255, 65535).is_some());
        assert!(ClusterId::new(256, 0, 0).is_none());
        assert!(ClusterId::new(0, 256, 0).is_none());
        assert!(ClusterId::new(0, 0, 65536).is_none());
    }

    #[test]
    fn test_has_label_ignores_sign() {
        let c = Cluster::new(0.0, 0.0, 1.0, 0.01, 0.01).with_labels([-7, 3, NO_LABEL]);
        assert!(c.has_label(7));
        assert!(c.has_label(3));
        assert!(!c.has_label(4));
        assert!(!c.has_label(1));
        assert_eq!(c.primary_label(), 7);
    }
}
