#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crime record types shared by the transformer and the join.
//!
//! Raw crime rows are normalized into [`CrimeRecord`]s: victim sex is
//! bucketed into [`VictimSex`] and the two-valued part code becomes an
//! optional [`CrimeSeverity`].

use chrono::NaiveDate;
use school_crime_spatial::SpatialCell;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity class derived from the source's `Part 1-2` code.
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
pub enum CrimeSeverity {
    /// Part 1 offenses (homicide, robbery, burglary, ...)
    #[serde(rename = "Serious Crime")]
    #[strum(serialize = "Serious Crime")]
    Serious,
    /// Part 2 offenses (simple assault, vandalism, ...)
    #[serde(rename = "Non-Serious Crime")]
    #[strum(serialize = "Non-Serious Crime")]
    NonSerious,
}

impl CrimeSeverity {
    /// Maps a part code to a severity class.
    ///
    /// Only `1` and `2` are defined. Anything else (the source has an
    /// undocumented third state) yields `None` rather than a default.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Serious),
            2 => Some(Self::NonSerious),
            _ => None,
        }
    }
}

/// Victim sex bucket.
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
pub enum VictimSex {
    #[strum(serialize = "M")]
    #[serde(rename = "M")]
    Male,
    #[strum(serialize = "F")]
    #[serde(rename = "F")]
    Female,
    /// Every other code (`X`, `H`, `-`, blank, missing).
    Other,
}

impl VictimSex {
    /// Buckets a raw sex code. Exact, case-sensitive match on `M`/`F`;
    /// everything else (including a missing value) is [`Self::Other`].
    #[must_use]
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("M") => Self::Male,
            Some("F") => Self::Female,
            _ => Self::Other,
        }
    }
}

/// A crime incident after normalization and indexing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrimeRecord {
    /// Occurrence date. `None` if the source timestamp was malformed.
    pub occurred_on: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `None` when coordinates were missing or out of range; such records
    /// never join.
    pub cell: Option<SpatialCell>,
    pub victim_sex: VictimSex,
    /// Passed through unvalidated (the source uses `0` and negatives).
    pub victim_age: Option<i64>,
    pub severity: Option<CrimeSeverity>,
    /// Free-text crime description (`Crm Cd Desc` in the source).
    pub crime_type: Option<String>,
}
