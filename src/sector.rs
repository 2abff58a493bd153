//! Sector tables and the per-event cluster store
//!
//! The detector is split radially into an inner and an outer [`SectorTable`].
//! Each table holds `n_sectors x n_rows` [`Row`]s configured from a
//! [`SectionConfig`]. [`ClusterStore`] owns both tables, decodes packed
//! locators and loads readout segments.

use std::fmt;

use crate::cluster::{Cluster, ClusterId, ClusterSegment};
use crate::common::utils::wrap_two_pi;
use crate::config::{DetectorConfig, SectionConfig};
use crate::error::TrackerError;
use crate::row::Row;

/// Radial section of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Short-pad rows close to the beam
    Inner,
    /// Rows outside the inner section
    Outer,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Inner => write!(f, "inner"),
            Section::Outer => write!(f, "outer"),
        }
    }
}

/// Detector half, split at `z = 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// `z >= 0`
    A,
    /// `z < 0`
    C,
}

impl Side {
    /// Half containing a drift coordinate
    #[inline]
    pub fn of_z(z: f64) -> Self {
        if z >= 0.0 {
            Side::A
        } else {
            Side::C
        }
    }
}

/// Rows of every sector of one radial section
#[derive(Debug, Clone)]
pub struct SectorTable {
    section: Section,
    geometry: SectionConfig,
    /// First global sector number of this table
    sector_offset: usize,
    /// Rows indexed `[sector][row]`
    rows: Vec<Vec<Row>>,
}

impl SectorTable {
    /// Build an empty table from a validated section layout
    pub fn new(section: Section, geometry: &SectionConfig, sector_offset: usize, capacity: usize) -> Self {
        let rows = (0..geometry.n_sectors)
            .map(|_| {
                geometry
                    .row_radii
                    .iter()
                    .map(|&x| Row::new(x, capacity))
                    .collect()
            })
            .collect();
        Self {
            section,
            geometry: geometry.clone(),
            sector_offset,
            rows,
        }
    }

    /// Which section this table covers
    #[inline]
    pub fn section(&self) -> Section {
        self.section
    }

    /// Number of sectors
    #[inline]
    pub fn n_sectors(&self) -> usize {
        self.geometry.n_sectors
    }

    /// Number of pad rows per sector
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.geometry.n_rows()
    }

    /// Angular width of a sector
    #[inline]
    pub fn alpha(&self) -> f64 {
        self.geometry.alpha
    }

    /// Angle of the centre of sector 0
    #[inline]
    pub fn alpha_shift(&self) -> f64 {
        self.geometry.alpha_shift
    }

    /// Pad width along the row
    #[inline]
    pub fn pad_pitch_width(&self) -> f64 {
        self.geometry.pad_pitch_width
    }

    /// Pad length of a row
    #[inline]
    pub fn pad_length(&self, row: usize) -> f64 {
        self.geometry.pad_length(row)
    }

    /// dE/dx correction factor of a row
    #[inline]
    pub fn dedx_correction(&self, row: usize) -> f64 {
        self.geometry.dedx_correction(row)
    }

    /// Radius of a row
    #[inline]
    pub fn x(&self, row: usize) -> f64 {
        self.geometry.row_radii[row]
    }

    /// Half-width of the sector at a row: `x * tan(alpha / 2)`
    #[inline]
    pub fn max_y(&self, row: usize) -> f64 {
        self.x(row) * (0.5 * self.alpha()).tan()
    }

    /// Global sector number of a local sector index
    #[inline]
    pub fn global_sector(&self, sector: usize) -> usize {
        self.sector_offset + sector
    }

    /// Whether a global sector number belongs to this table
    #[inline]
    pub fn owns_sector(&self, global: usize) -> bool {
        global >= self.sector_offset && global < self.sector_offset + self.n_sectors()
    }

    /// Row of a local sector
    #[inline]
    pub fn row(&self, sector: usize, row: usize) -> &Row {
        &self.rows[sector][row]
    }

    /// Mutable row of a local sector
    #[inline]
    pub fn row_mut(&mut self, sector: usize, row: usize) -> &mut Row {
        &mut self.rows[sector][row]
    }

    /// Row by global locator, `None` if it does not belong here
    pub fn row_of(&self, id: ClusterId) -> Option<&Row> {
        if !self.owns_sector(id.sector()) {
            return None;
        }
        self.rows
            .get(id.sector() - self.sector_offset)
            .and_then(|sector| sector.get(id.row()))
    }

    /// Frame angle of a sector
    #[inline]
    pub fn frame_angle(&self, sector: usize) -> f64 {
        wrap_two_pi(sector as f64 * self.alpha() + self.alpha_shift())
    }

    /// Sector whose frame contains the azimuth `alpha`
    pub fn sector_of(&self, alpha: f64) -> usize {
        let n = self.n_sectors();
        let k = (wrap_two_pi(alpha - self.alpha_shift()) / self.alpha()).round() as usize;
        k % n
    }

    /// Sector `step` positions away from `sector`, wrapping around
    #[inline]
    pub fn neighbour(&self, sector: usize, step: isize) -> usize {
        let n = self.n_sectors() as isize;
        (sector as isize + step).rem_euclid(n) as usize
    }

    /// Row nearest to a radius.
    ///
    /// `None` below the first row, `Some(n_rows)` above the last row.
    pub fn row_number(&self, x: f64) -> Option<usize> {
        let radii = &self.geometry.row_radii;
        let first = *radii.first()?;
        let last = *radii.last()?;
        if x < first {
            return None;
        }
        if x > last {
            return Some(radii.len());
        }
        let above = radii.partition_point(|&r| r < x);
        if above == 0 {
            return Some(0);
        }
        let below = above - 1;
        if (x - radii[below]) <= (radii[above] - x) {
            Some(below)
        } else {
            Some(above)
        }
    }

    /// Total clusters held by the table
    pub fn n_clusters(&self) -> usize {
        self.rows.iter().flatten().map(Row::len).sum()
    }

    fn for_each_row(&mut self, mut f: impl FnMut(&mut Row)) {
        for row in self.rows.iter_mut().flatten() {
            f(row);
        }
    }
}

/// Both sector tables of one event
#[derive(Debug, Clone)]
pub struct ClusterStore {
    inner: SectorTable,
    outer: SectorTable,
}

impl ClusterStore {
    /// Build an empty store for a detector layout
    pub fn new(detector: &DetectorConfig) -> Result<Self, TrackerError> {
        detector.validate()?;
        let capacity = detector.max_clusters_per_row;
        let inner = SectorTable::new(Section::Inner, &detector.inner, 0, capacity);
        let outer = SectorTable::new(Section::Outer, &detector.outer, detector.inner.n_sectors, capacity);
        Ok(Self { inner, outer })
    }

    /// Inner table
    #[inline]
    pub fn inner(&self) -> &SectorTable {
        &self.inner
    }

    /// Outer table
    #[inline]
    pub fn outer(&self) -> &SectorTable {
        &self.outer
    }

    /// Table of a section
    #[inline]
    pub fn section(&self, section: Section) -> &SectorTable {
        match section {
            Section::Inner => &self.inner,
            Section::Outer => &self.outer,
        }
    }

    /// Section a locator belongs to
    pub fn section_of(&self, id: ClusterId) -> Result<Section, TrackerError> {
        if self.inner.owns_sector(id.sector()) {
            Ok(Section::Inner)
        } else if self.outer.owns_sector(id.sector()) {
            Ok(Section::Outer)
        } else {
            Err(TrackerError::InvalidLocator {
                id,
                component: "sector",
            })
        }
    }

    /// Rows per sector summed over both sections
    #[inline]
    pub fn total_rows(&self) -> usize {
        self.inner.n_rows() + self.outer.n_rows()
    }

    /// Exclusive upper bound of raw segment ids
    pub fn segment_limit(&self) -> usize {
        2 * (self.inner.n_sectors() * self.inner.n_rows() + self.outer.n_sectors() * self.outer.n_rows())
    }

    /// Raw segment id of a (section, sector, row, side) slot
    pub fn segment_id(&self, section: Section, sector: usize, row: usize, side: Side) -> usize {
        let table = self.section(section);
        let half = match side {
            Side::A => 0,
            Side::C => table.n_sectors(),
        };
        let base = match section {
            Section::Inner => 0,
            Section::Outer => 2 * self.inner.n_sectors() * self.inner.n_rows(),
        };
        base + (half + sector) * table.n_rows() + row
    }

    /// Decode a raw segment id into (section, local sector, row)
    fn decode_segment(&self, id: usize) -> Result<(Section, usize, usize), TrackerError> {
        let limit = self.segment_limit();
        if id >= limit {
            return Err(TrackerError::InvalidSegment { id, limit });
        }
        let outer_base = 2 * self.inner.n_sectors() * self.inner.n_rows();
        let (section, local) = if id < outer_base {
            (Section::Inner, id)
        } else {
            (Section::Outer, id - outer_base)
        };
        let table = self.section(section);
        let sector = (local / table.n_rows()) % table.n_sectors();
        let row = local % table.n_rows();
        Ok((section, sector, row))
    }

    /// Load one event's clusters.
    ///
    /// Both detector halves of a sector share one row. Returns the number of
    /// clusters stored; insertions beyond a row's capacity are dropped.
    pub fn load(&mut self, segments: &[ClusterSegment]) -> Result<usize, TrackerError> {
        let mut stored = 0;
        for segment in segments {
            let (section, sector, row) = self.decode_segment(segment.id)?;
            let table = match section {
                Section::Inner => &mut self.inner,
                Section::Outer => &mut self.outer,
            };
            let global = table.global_sector(sector);
            let pad_row = table.row_mut(sector, row);
            for cluster in &segment.clusters {
                let mut cluster = *cluster;
                cluster.used = false;
                if pad_row.insert(cluster, global, row).is_some() {
                    stored += 1;
                }
            }
        }
        log::debug!(
            "Loaded {} clusters from {} segments ({} inner, {} outer)",
            stored,
            segments.len(),
            self.inner.n_clusters(),
            self.outer.n_clusters()
        );
        Ok(stored)
    }

    /// Drop every cluster
    pub fn unload(&mut self) {
        self.inner.for_each_row(Row::reset);
        self.outer.for_each_row(Row::reset);
    }

    /// Release every claim
    pub fn clear_used(&mut self) {
        self.inner.for_each_row(Row::clear_used);
        self.outer.for_each_row(Row::clear_used);
    }

    /// Cluster by packed locator
    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster, TrackerError> {
        let table = self.section(self.section_of(id)?);
        let row = table.row_of(id).ok_or(TrackerError::InvalidLocator { id, component: "row" })?;
        row.get_by_slot(id.slot())
            .ok_or(TrackerError::InvalidLocator { id, component: "slot" })
    }

    /// Claim a cluster for an accepted track
    pub fn mark_used(&mut self, id: ClusterId) -> Result<(), TrackerError> {
        let section = self.section_of(id)?;
        let table = match section {
            Section::Inner => &mut self.inner,
            Section::Outer => &mut self.outer,
        };
        let sector = id.sector() - table.sector_offset;
        if id.row() >= table.n_rows() {
            return Err(TrackerError::InvalidLocator { id, component: "row" });
        }
        if table.row_mut(sector, id.row()).mark_used(id.slot()) {
            Ok(())
        } else {
            Err(TrackerError::InvalidLocator { id, component: "slot" })
        }
    }

    /// Claim every locator in a list
    pub fn mark_all_used(&mut self, ids: &[ClusterId]) -> Result<(), TrackerError> {
        ids.iter().try_for_each(|&id| self.mark_used(id))
    }

    /// Total clusters in both tables
    pub fn n_clusters(&self) -> usize {
        self.inner.n_clusters() + self.outer.n_clusters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn store() -> ClusterStore {
        ClusterStore::new(&DetectorConfig::standard()).unwrap()
    }

    fn cluster(y: f64, z: f64) -> Cluster {
        Cluster::new(y, z, 10.0, 0.01, 0.01)
    }

    #[test]
    fn test_row_number() {
        let store = store();
        let outer = store.outer();
        assert_eq!(outer.row_number(100.0), None);
        assert_eq!(outer.row_number(500.0), Some(outer.n_rows()));
        assert_eq!(outer.row_number(outer.x(0)), Some(0));
        assert_eq!(outer.row_number(outer.x(70) + 0.1), Some(70));
        assert_eq!(outer.row_number(outer.x(70) - 0.1), Some(70));
        let last = outer.n_rows() - 1;
        assert_eq!(outer.row_number(outer.x(last)), Some(last));
    }

    #[test]
    fn test_sector_of_frame_angle() {
        let store = store();
        let inner = store.inner();
        for s in 0..inner.n_sectors() {
            assert_eq!(inner.sector_of(inner.frame_angle(s)), s);
            assert_eq!(inner.sector_of(inner.frame_angle(s) + 0.4 * inner.alpha()), s);
            assert_eq!(inner.sector_of(inner.frame_angle(s) - 0.4 * inner.alpha()), s);
        }
        assert_eq!(inner.sector_of(inner.frame_angle(0) - 2.0 * PI), 0);
        assert_eq!(inner.neighbour(0, -1), inner.n_sectors() - 1);
        assert_eq!(inner.neighbour(inner.n_sectors() - 1, 1), 0);
    }

    #[test]
    fn test_max_y() {
        let store = store();
        let inner = store.inner();
        let expected = inner.x(0) * (10.0_f64.to_radians()).tan();
        assert!((inner.max_y(0) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_load_folds_halves_and_decodes_locators() {
        let mut store = store();
        let a = store.segment_id(Section::Inner, 3, 5, Side::A);
        let c = store.segment_id(Section::Inner, 3, 5, Side::C);
        let o = store.segment_id(Section::Outer, 17, 90, Side::C);
        let segments = vec![
            ClusterSegment::new(a, vec![cluster(1.0, 10.0), cluster(-1.0, 12.0)]),
            ClusterSegment::new(c, vec![cluster(0.0, -10.0)]),
            ClusterSegment::new(o, vec![cluster(2.0, -50.0)]),
        ];
        assert_eq!(store.load(&segments).unwrap(), 4);

        let row = store.inner().row(3, 5);
        assert_eq!(row.len(), 3);
        let ys: Vec<f64> = row.iter().map(|(_, c)| c.y).collect();
        assert_eq!(ys, vec![-1.0, 0.0, 1.0]);

        for (id, c) in row.iter() {
            assert_eq!(id.sector(), 3);
            assert_eq!(store.cluster(id).unwrap(), c);
            assert_eq!(store.section_of(id).unwrap(), Section::Inner);
        }

        let (id, _) = store.outer().row(17, 90).iter().next().unwrap();
        assert_eq!(id.sector(), 18 + 17);
        assert_eq!(store.section_of(id).unwrap(), Section::Outer);
        store.mark_used(id).unwrap();
        assert!(store.cluster(id).unwrap().used);
        store.clear_used();
        assert!(!store.cluster(id).unwrap().used);

        store.unload();
        assert_eq!(store.n_clusters(), 0);
    }

    #[test]
    fn test_invalid_segment_is_fatal() {
        let mut store = store();
        let limit = store.segment_limit();
        let err = store
            .load(&[ClusterSegment::new(limit, vec![cluster(0.0, 0.0)])])
            .unwrap_err();
        assert_eq!(err, TrackerError::InvalidSegment { id: limit, limit });
    }

    #[test]
    fn test_invalid_locator_is_fatal() {
        let mut store = store();
        let bad_sector = ClusterId::new(200, 0, 0).unwrap();
        assert!(matches!(
            store.cluster(bad_sector),
            Err(TrackerError::InvalidLocator { component: "sector", .. })
        ));
        let bad_row = ClusterId::new(1, 70, 0).unwrap();
        assert!(matches!(
            store.cluster(bad_row),
            Err(TrackerError::InvalidLocator { component: "row", .. })
        ));
        let bad_slot = ClusterId::new(1, 3, 9).unwrap();
        assert!(matches!(
            store.mark_used(bad_slot),
            Err(TrackerError::InvalidLocator { component: "slot", .. })
        ));
    }
}
