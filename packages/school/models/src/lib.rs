#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! School record types.
//!
//! Public and private school datasets are structurally different; both are
//! normalized into the single [`SchoolRecord`] shape and collected in a
//! [`SchoolTable`] whose column list is the union of both sources.

use std::collections::BTreeMap;

use school_crime_spatial::SpatialCell;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which dataset a school came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SchoolType {
    Public,
    Private,
}

/// Instructional level.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SchoolLevel {
    /// End grade 5 or below
    Elementary,
    /// End grade 6 through 8
    Middle,
    /// End grade 9 or above
    High,
    /// Unknown, ungraded, or outside the three named levels
    Other,
}

impl SchoolLevel {
    /// The levels a source value may name directly. [`Self::Other`] is a
    /// fallback, never a source category.
    pub const NAMED: &[Self] = &[Self::Elementary, Self::Middle, Self::High];
}

/// Outcome of classifying a raw level value.
///
/// Classification is total: a value that can't be interpreted produces
/// [`Self::Fallback`] rather than an error, and callers decide whether to
/// count or ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelClassification {
    /// The raw value mapped onto a named level.
    Classified(SchoolLevel),
    /// The raw value was absent or not interpretable.
    Fallback,
}

impl LevelClassification {
    /// Collapses the outcome to a level, using [`SchoolLevel::Other`] for
    /// the fallback.
    #[must_use]
    pub const fn level(self) -> SchoolLevel {
        match self {
            Self::Classified(level) => level,
            Self::Fallback => SchoolLevel::Other,
        }
    }

    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback)
    }
}

/// A school after normalization, regardless of source dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolRecord {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    /// Always equal to the region filter the record passed.
    pub state: String,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `None` when the school's coordinates could not be indexed.
    pub cell: Option<SpatialCell>,
    pub school_type: SchoolType,
    pub level: SchoolLevel,
    /// Raw `LEVEL_` value (public source only).
    pub level_code: Option<String>,
    /// Raw `END_GRADE` value (private source only).
    pub end_grade: Option<String>,
    pub population: Option<i64>,
    pub enrollment: Option<i64>,
    /// `population - enrollment`; `None` if either input is missing.
    pub faculty: Option<i64>,
    /// Every other source column, keyed by header. After a union this holds
    /// every pass-through column of both sources, null where the record's
    /// own source lacked it.
    pub extra: BTreeMap<String, Option<String>>,
}

impl SchoolRecord {
    /// Looks up a pass-through column. Returns `None` both when the column
    /// is unknown and when it is null for this record.
    #[must_use]
    pub fn extra(&self, column: &str) -> Option<&str> {
        self.extra.get(column).and_then(|v| v.as_deref())
    }
}

/// Derives faculty from population and enrollment.
///
/// The difference may be negative (source data is not self-consistent);
/// a missing input, or an overflowing difference, yields `None`.
#[must_use]
pub fn derive_faculty(population: Option<i64>, enrollment: Option<i64>) -> Option<i64> {
    population?.checked_sub(enrollment?)
}

/// Normalized schools plus the column list they carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchoolTable {
    /// Column names in union order.
    pub columns: Vec<String>,
    pub records: Vec<SchoolRecord>,
}

impl SchoolTable {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}
