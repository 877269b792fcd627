#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Hexagonal spatial index used as a proximity proxy.
//!
//! Points are bucketed into H3 cells at a single fixed resolution
//! ([`SpatialIndexer`]) and a cell's neighborhood is the grid disk around
//! it ([`NeighborExpander`]). Two points are considered "near" when one
//! point's cell is inside the other point's disk.

pub mod neighbors;

use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Serialize, Serializer};

pub use neighbors::{DEFAULT_RING_RADIUS, NeighborExpander, grid_distance};

/// Street-block scale (~25m hexagon edge).
pub const DEFAULT_RESOLUTION: u8 = 11;

/// Errors produced while mapping coordinates onto the grid.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Latitude/longitude is outside the valid range or not finite.
    #[error("invalid coordinate ({lat}, {lng}): {reason}")]
    InvalidCoordinate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
        /// Which bound was violated.
        reason: &'static str,
    },

    /// Resolution outside `0..=15`.
    #[error("invalid H3 resolution {0}: expected 0-15")]
    InvalidResolution(u8),

    /// String is not a valid H3 cell index.
    #[error("invalid cell identifier '{0}'")]
    InvalidCell(String),
}

/// A single hexagonal (or, rarely, pentagonal) cell at a fixed resolution.
///
/// Rendered as the canonical lowercase hex string (e.g. `8b29a1d7530afff`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpatialCell(CellIndex);

impl SpatialCell {
    /// Returns the underlying H3 index.
    #[must_use]
    pub const fn index(self) -> CellIndex {
        self.0
    }

    /// Returns the resolution this cell was indexed at.
    #[must_use]
    pub fn resolution(self) -> u8 {
        u8::from(self.0.resolution())
    }

    /// Returns the cell center as `(lat, lng)` in degrees.
    #[must_use]
    pub fn center(self) -> (f64, f64) {
        let center = LatLng::from(self.0);
        (center.lat(), center.lng())
    }
}

impl From<CellIndex> for SpatialCell {
    fn from(index: CellIndex) -> Self {
        Self(index)
    }
}

impl fmt::Display for SpatialCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SpatialCell {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<CellIndex>()
            .map(Self)
            .map_err(|_| SpatialError::InvalidCell(s.to_owned()))
    }
}

impl Serialize for SpatialCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Converts coordinates into cells at a resolution fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct SpatialIndexer {
    resolution: Resolution,
}

impl SpatialIndexer {
    /// Creates an indexer for the given H3 resolution.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidResolution`] if `resolution` is not in
    /// `0..=15`.
    pub fn new(resolution: u8) -> Result<Self, SpatialError> {
        let resolution = Resolution::try_from(resolution)
            .map_err(|_| SpatialError::InvalidResolution(resolution))?;
        Ok(Self { resolution })
    }

    /// Returns the configured resolution.
    #[must_use]
    pub fn resolution(&self) -> u8 {
        u8::from(self.resolution)
    }

    /// Maps a point to the cell containing it.
    ///
    /// Out-of-range coordinates are rejected rather than wrapped, since a
    /// wrapped point lands in an unrelated cell and would silently join
    /// against the wrong schools.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidCoordinate`] if either component is
    /// non-finite or outside `[-90, 90]` / `[-180, 180]`.
    pub fn index(&self, lat: f64, lng: f64) -> Result<SpatialCell, SpatialError> {
        validate_coordinate(lat, lng)?;
        let point = LatLng::new(lat, lng).map_err(|_| SpatialError::InvalidCoordinate {
            lat,
            lng,
            reason: "rejected by H3",
        })?;
        Ok(SpatialCell(point.to_cell(self.resolution)))
    }
}

impl Default for SpatialIndexer {
    fn default() -> Self {
        Self {
            resolution: Resolution::Eleven,
        }
    }
}

fn validate_coordinate(lat: f64, lng: f64) -> Result<(), SpatialError> {
    let reason = if !lat.is_finite() || !lng.is_finite() {
        "not a finite number"
    } else if !(-90.0..=90.0).contains(&lat) {
        "latitude outside [-90, 90]"
    } else if !(-180.0..=180.0).contains(&lng) {
        "longitude outside [-180, 180]"
    } else {
        return Ok(());
    };

    log::trace!("Rejecting coordinate ({lat}, {lng}): {reason}");
    Err(SpatialError::InvalidCoordinate { lat, lng, reason })
}
