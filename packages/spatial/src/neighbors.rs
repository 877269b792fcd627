//! Grid-disk neighborhood expansion.

use std::collections::BTreeSet;

use crate::SpatialCell;

/// Ring radius used for school neighborhoods: the school's own cell plus
/// its immediate ring.
pub const DEFAULT_RING_RADIUS: u32 = 1;

/// Expands a cell into every cell within a fixed grid distance.
#[derive(Debug, Clone, Copy)]
pub struct NeighborExpander {
    radius: u32,
}

impl NeighborExpander {
    /// Creates an expander with the given ring radius (`0` yields only the
    /// origin cell).
    #[must_use]
    pub const fn new(radius: u32) -> Self {
        Self { radius }
    }

    /// Returns the configured ring radius.
    #[must_use]
    pub const fn radius(&self) -> u32 {
        self.radius
    }

    /// Returns the origin cell and every cell within `radius` hops of it.
    ///
    /// At radius 1 this is 7 cells for a hexagon and 6 for a pentagon.
    /// Callers must not rely on the iteration order of the returned set.
    #[must_use]
    pub fn neighbors(&self, cell: SpatialCell) -> BTreeSet<SpatialCell> {
        cell.index()
            .grid_disk_safe(self.radius)
            .map(SpatialCell::from)
            .collect()
    }
}

impl Default for NeighborExpander {
    fn default() -> Self {
        Self::new(DEFAULT_RING_RADIUS)
    }
}

/// Grid distance (in hops) between two cells of the same resolution.
///
/// Returns `None` when the distance cannot be computed, e.g. across
/// pentagon distortion or between cells on distant faces.
#[must_use]
pub fn grid_distance(a: SpatialCell, b: SpatialCell) -> Option<i32> {
    a.index().grid_distance(b.index()).ok()
}
